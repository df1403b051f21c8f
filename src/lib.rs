//! livescribe — real-time streaming speech transcription and translation.
//!
//! A three-stage pipeline turns live microphone audio into two evolving
//! text streams, each split into a *confirmed* prefix that never changes
//! and a *draft* suffix still under revision:
//!
//! ```text
//! mic ─▶ capture ─▶ transcribe ─▶ translate ─▶ result queues
//! ```
//!
//! * [`audio`] — cpal capture, downmix/resample to mono 16 kHz i16.
//! * [`stt`] — whisper oracle and the sliding-window confirm/draft state
//!   machine with adaptive paragraph detection.
//! * [`translate`] — HTTP sentence translation with the reserve trick, or
//!   LLM batch proofreading/translation with trigger rules.
//! * [`queue`] — the merging queues every stage hand-off rides on.
//! * [`pipeline`] — worker loops and the [`Engine`] supervisor.
//! * [`config`] — TOML-backed settings.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use livescribe::config::EngineConfig;
//! use livescribe::pipeline::{Engine, EngineCallbacks, EngineQueues};
//!
//! let config = EngineConfig::load().unwrap();
//! let queues = EngineQueues::new();
//!
//! let handle = Engine::start(config, queues.clone(), EngineCallbacks::default());
//!
//! // Poll the result queues from the UI thread…
//! while let Some(pair) = queues.transcription.get() {
//!     println!("confirmed: {} | draft: {}", pair.confirmed, pair.draft);
//! }
//!
//! handle.stop();
//! handle.join();
//! ```

pub mod audio;
pub mod config;
pub mod pipeline;
pub mod queue;
pub mod stt;
pub mod translate;

pub use pipeline::{Engine, EngineCallbacks, EngineHandle, EngineQueues};
pub use queue::{AudioFrame, Merge, MergeQueue, Pair};
