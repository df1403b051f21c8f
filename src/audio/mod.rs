//! Audio capture and format conversion.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → FrameAssembler
//!           → downmix_to_mono → resample_to_16k → f32_to_i16 → AudioFrame
//! ```
//!
//! The capture worker (see [`crate::pipeline`]) drains chunks from the cpal
//! callback channel, regroups them into fixed-duration frames, and posts the
//! frames to the transcription stage's merging queue.

pub mod capture;
pub mod resample;

pub use capture::{AudioCapture, AudioChunk, CaptureError, FrameAssembler, StreamHandle};
pub use resample::{
    downmix_to_mono, f32_to_i16, i16_to_f32, resample_to_16k, rms_level, TARGET_SAMPLE_RATE,
};
