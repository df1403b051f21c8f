//! Speech-to-text: oracle interface, whisper binding, and the
//! sliding-window confirm/draft state machine.
//!
//! # Architecture
//!
//! ```text
//! AudioFrame ──▶ TranscriptionWindow::update
//!                  ├─ extend window
//!                  ├─ TranscribeOracle::transcribe(window, prompt memory)
//!                  ├─ partition segments at the patience boundary
//!                  ├─ ParagraphDetector over the confirmed prefix
//!                  └─ trim confirmed audio, advance cumulative offset
//!                ──▶ Pair { confirmed, draft }
//! ```

pub mod oracle;
pub mod paragraph;
pub mod transcribe;
pub mod window;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use oracle::{SttError, TranscribeOracle, WhisperOracle};
pub use paragraph::ParagraphDetector;
pub use transcribe::{Segment, TranscribeRequest};
pub use window::TranscriptionWindow;

// test-only re-export so other test modules can script the oracle without
// reaching into the module path.
#[cfg(test)]
pub use oracle::ScriptedOracle;
