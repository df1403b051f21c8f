//! Pipeline orchestration: worker loops and the engine supervisor.
//!
//! # Architecture
//!
//! ```text
//!               ┌────────────────────── supervisor thread ("engine")
//!               │  load model → open device → spawn workers → capture loop
//!               ▼
//! mic ─▶ FrameQueue ─▶ transcribe thread ─▶ TsResQ  (UI)
//!                            │
//!                            └──────────▶ Ts2TlQ ─▶ translate thread ─▶ TlResQ (UI)
//!                                                          └──────────▶ PrResQ (UI, optional)
//! ```
//!
//! Control flow is one shared `running` flag written by
//! [`EngineHandle::stop`]; data flow terminates stage by stage through the
//! `None` sentinel, so every result queue ends with exactly one `None`.

pub mod engine;
pub(crate) mod workers;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use engine::{Engine, EngineCallbacks, EngineError, EngineHandle, EngineQueues};
