//! Translation stage: HTTP sentence translation and LLM batch processing.
//!
//! # Architecture
//!
//! ```text
//! Pair { confirmed, draft } ──▶ TranslationStage::update
//!   │
//!   ├─ HTTP mode:  reserve + confirmed ─▶ SentenceTranslator
//!   │              (last sentence pair held back as the new reserve)
//!   │              reserve + draft ─▶ SentenceTranslator (discardable)
//!   │
//!   └─ LLM mode:   accumulate confirmed ─▶ trigger check
//!                  (paragraph / cap / time / words / silence / manual)
//!                  ─▶ LlmProcessor (one or two sequential calls)
//!
//! ──▶ translation result queue [+ proofread result queue]
//! ```

pub mod llm;
pub mod provider;
pub mod stage;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use llm::{parse_proofread_translate, ApiProcessor, LlmError, LlmProcessor, ProcessMode};
pub use provider::{GoogleTranslator, SentencePair, SentenceTranslator, TranslateError};
pub use stage::{
    HttpTranslation, LlmBatcher, StageStatus, TranslationStage, MAX_CHARS_TO_ACCUMULATE,
    MIN_CHARS_TO_PROCESS, UNAVAILABLE_MARKER,
};
