//! Transcription request and result types.
//!
//! [`TranscribeRequest`] carries the per-call settings the sliding-window
//! stage hands to the oracle; [`Segment`] is one time-aligned text chunk of
//! the oracle's answer.

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// A single time-aligned text chunk produced by the transcription oracle.
///
/// Timestamps are in seconds **relative to the start of the supplied
/// window** — they reset every time the window is trimmed.  Use the stage's
/// cumulative offset to recover absolute times.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Segment text (may include punctuation inserted by the model).
    pub text: String,
    /// Start time in seconds from the start of the window.
    pub start: f32,
    /// End time in seconds from the start of the window.
    pub end: f32,
}

impl Segment {
    pub fn new(text: impl Into<String>, start: f32, end: f32) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

// ---------------------------------------------------------------------------
// TranscribeRequest
// ---------------------------------------------------------------------------

/// Settings for a single oracle invocation.
#[derive(Debug, Clone, Default)]
pub struct TranscribeRequest {
    /// Concatenated prompt memory supplied as the model's initial prompt.
    pub initial_prompt: String,
    /// ISO-639-1 source language, or `None` for auto-detection.
    pub language: Option<String>,
    /// Suppress non-speech output (voice-activity filtering).
    pub vad: bool,
}

/// Returns the number of CPU threads to hand to the model, capped at 8.
pub(crate) fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
