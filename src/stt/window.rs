//! Sliding-window transcription state machine.
//!
//! [`TranscriptionWindow`] is the heart of the pipeline.  It keeps the
//! not-yet-committed audio tail, re-transcribes it on every incoming frame,
//! and partitions the oracle's segments into a *confirmed* prefix (older
//! than the patience horizon, committed for good) and a *draft* suffix
//! (still subject to revision).  Confirmed audio is trimmed from the window
//! so re-transcription cost stays bounded, and the trimmed duration is
//! tracked as a cumulative offset so downstream consumers can recover
//! absolute timestamps.

use std::collections::VecDeque;

use crate::audio::TARGET_SAMPLE_RATE;
use crate::queue::{AudioFrame, Pair};
use crate::stt::oracle::{SttError, TranscribeOracle};
use crate::stt::paragraph::ParagraphDetector;
use crate::stt::transcribe::TranscribeRequest;

// ---------------------------------------------------------------------------
// TranscriptionWindow
// ---------------------------------------------------------------------------

/// Per-session state of the transcription stage.
pub struct TranscriptionWindow {
    /// Uncommitted audio tail, mono 16 kHz i16.
    samples: Vec<i16>,
    /// Recently confirmed segment texts, concatenated into the oracle's
    /// initial prompt for continuity across trims.
    prompts: VecDeque<String>,
    /// Maximum number of entries kept in `prompts`.
    memory: usize,
    /// Seconds of trailing audio held back as draft.
    patience: f32,
    /// Total duration of audio trimmed from the window, in seconds.
    cumulative_offset: f64,
    /// Total number of samples trimmed from the window.
    trimmed_samples: usize,
    language: Option<String>,
    vad: bool,
    paragraphs: Option<ParagraphDetector>,
}

impl TranscriptionWindow {
    /// `memory` is clamped to at least 1; the initial `prompt` seeds the
    /// prompt deque.
    pub fn new(
        prompt: String,
        memory: usize,
        patience: f32,
        language: Option<String>,
        vad: bool,
        paragraphs: Option<ParagraphDetector>,
    ) -> Self {
        let memory = memory.max(1);
        let mut prompts = VecDeque::with_capacity(memory + 1);
        prompts.push_back(prompt);

        Self {
            samples: Vec::new(),
            prompts,
            memory,
            patience,
            cumulative_offset: 0.0,
            trimmed_samples: 0,
            language,
            vad,
            paragraphs,
        }
    }

    /// Extend the window with `frame`, transcribe it, and commit everything
    /// older than the patience horizon.
    ///
    /// Returns the `confirmed`/`draft` partition for this update.  The
    /// confirmed text of successive updates concatenates into a stream that
    /// only ever grows; the draft is replaced wholesale each time.
    pub fn update(
        &mut self,
        oracle: &mut dyn TranscribeOracle,
        frame: &AudioFrame,
    ) -> Result<Pair, SttError> {
        self.samples.extend_from_slice(&frame.samples);

        let req = TranscribeRequest {
            initial_prompt: self.prompts.iter().flat_map(|s| s.chars()).collect(),
            language: self.language.clone(),
            vad: self.vad,
        };
        let segments = oracle.transcribe(&self.samples, &req)?;

        // Everything ending before this boundary is committed.  Never cut
        // through a segment: if the first surviving segment started earlier,
        // pull the boundary back to its start.
        let mut boundary =
            (self.samples.len() as f64 / f64::from(TARGET_SAMPLE_RATE) - f64::from(self.patience))
                .max(0.0);
        let mut split = 0;
        for segment in &segments {
            if f64::from(segment.end) >= boundary {
                if f64::from(segment.start) < boundary {
                    boundary = f64::from(segment.start);
                }
                break;
            }
            split += 1;
        }

        let (confirmed_segments, draft_segments) = segments.split_at(split);

        let confirmed = match (&mut self.paragraphs, confirmed_segments.is_empty()) {
            (Some(detector), false) => {
                detector.process_segments(confirmed_segments, self.cumulative_offset)
            }
            _ => confirmed_segments.iter().map(|s| s.text.as_str()).collect(),
        };
        let draft: String = draft_segments.iter().map(|s| s.text.as_str()).collect();

        self.prompts
            .extend(confirmed_segments.iter().map(|s| s.text.clone()));
        while self.prompts.len() > self.memory {
            self.prompts.pop_front();
        }

        // Offset advances by the boundary *before* trimming so paragraph
        // detection above saw the pre-trim offset.
        self.cumulative_offset += boundary;

        let trim = ((boundary * f64::from(TARGET_SAMPLE_RATE)) as usize).min(self.samples.len());
        self.samples.drain(..trim);
        self.trimmed_samples += trim;

        log::debug!(
            "window update: {:.2}s retained, offset {:.2}s, confirmed {} chars, draft {} chars",
            self.window_secs(),
            self.cumulative_offset,
            confirmed.len(),
            draft.len()
        );

        Ok(Pair { confirmed, draft })
    }

    /// Duration of audio currently held, in seconds.
    pub fn window_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(TARGET_SAMPLE_RATE)
    }

    /// Total duration of audio trimmed so far, in seconds.
    pub fn cumulative_offset(&self) -> f64 {
        self.cumulative_offset
    }

    /// Total samples trimmed so far.
    pub fn trimmed_samples(&self) -> usize {
        self.trimmed_samples
    }

    /// Current prompt-memory contents, oldest first.
    pub fn prompt_memory(&self) -> impl Iterator<Item = &str> {
        self.prompts.iter().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
