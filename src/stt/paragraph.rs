//! Adaptive paragraph detection over confirmed transcript segments.
//!
//! Speakers differ wildly in pacing, so a fixed pause threshold mislabels
//! both fast and slow speakers.  [`ParagraphDetector`] keeps a bounded
//! history of the speaker's own inter-segment pauses and breaks paragraphs
//! at pauses that are long *relative to that baseline*, with hard character
//! and word caps as a backstop against run-on paragraphs.
//!
//! Timestamps handed in are window-relative (they reset at every trim of the
//! transcription window); the caller passes the cumulative trim offset so
//! pauses can be measured on absolute time across batches.

use crate::config::ParagraphConfig;
use crate::stt::transcribe::Segment;

// ---------------------------------------------------------------------------
// ParagraphDetector
// ---------------------------------------------------------------------------

/// Inserts `"\n\n"` between segments at significant pauses or hard limits.
pub struct ParagraphDetector {
    config: ParagraphConfig,

    /// Recent positive pause durations in seconds, oldest first.
    pause_history: Vec<f64>,
    /// Characters accumulated in the current paragraph.
    chars: usize,
    /// Words accumulated in the current paragraph.
    words: usize,
    /// Absolute end time of the last segment seen, across batches.
    last_abs_end: Option<f64>,
}

impl ParagraphDetector {
    pub fn new(config: ParagraphConfig) -> Self {
        Self {
            config,
            pause_history: Vec::new(),
            chars: 0,
            words: 0,
            last_abs_end: None,
        }
    }

    /// Record a pause duration for the running statistics.
    fn add_pause(&mut self, duration: f64) {
        if duration > 0.0 {
            self.pause_history.push(duration);
            if self.pause_history.len() > self.config.window_size {
                self.pause_history.remove(0);
            }
        }
    }

    /// Current break threshold in seconds.
    ///
    /// Fixed `warmup_threshold` until `warmup_count` pauses have been
    /// observed; thereafter `max(mean + threshold_std · stdev, min_pause)`.
    fn adaptive_threshold(&self) -> f64 {
        if self.pause_history.len() < self.config.warmup_count {
            return self.config.warmup_threshold;
        }

        let n = self.pause_history.len() as f64;
        let mean = self.pause_history.iter().sum::<f64>() / n;
        let variance = self
            .pause_history
            .iter()
            .map(|p| (p - mean).powi(2))
            .sum::<f64>()
            / n;
        let std = if variance > 0.0 { variance.sqrt() } else { 0.0 };

        (mean + self.config.threshold_std * std).max(self.config.min_pause)
    }

    fn reset_paragraph(&mut self) {
        self.chars = 0;
        self.words = 0;
    }

    /// Process a batch of confirmed segments and return their text with
    /// paragraph breaks inserted where appropriate.
    ///
    /// `offset` is the transcription stage's cumulative trim offset in
    /// seconds; adding it to the window-relative timestamps yields absolute
    /// times that stay comparable across batches.
    ///
    /// An empty batch returns `""` and leaves all state untouched.
    pub fn process_segments(&mut self, segments: &[Segment], offset: f64) -> String {
        if segments.is_empty() {
            return String::new();
        }

        let mut out = String::new();

        for segment in segments {
            let text = segment.text.as_str();
            let abs_start = f64::from(segment.start) + offset;
            let abs_end = f64::from(segment.end) + offset;

            let mut should_break = false;

            // Hard limits first; require at least one segment already in the
            // paragraph so a single long segment never breaks against itself.
            let new_chars = self.chars + text.chars().count();
            let new_words = self.words + text.split_whitespace().count();
            if self.chars > 0
                && (new_chars > self.config.max_chars || new_words > self.config.max_words)
            {
                should_break = true;
            }

            if !should_break {
                if let Some(last_end) = self.last_abs_end {
                    let pause = abs_start - last_end;
                    if pause > 0.0 {
                        self.add_pause(pause);
                        if pause >= self.config.min_pause && pause > self.adaptive_threshold() {
                            should_break = true;
                        }
                    }
                }
            }

            if should_break {
                out.push_str("\n\n");
                self.reset_paragraph();
                log::debug!("paragraph break at {abs_start:.2}s");
            }

            out.push_str(text);
            self.chars += text.chars().count();
            self.words += text.split_whitespace().count();
            self.last_abs_end = Some(abs_end);
        }

        out
    }

    /// Number of pauses currently in the statistics window.
    pub fn pause_count(&self) -> usize {
        self.pause_history.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
