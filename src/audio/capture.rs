//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle.  Call
//! [`AudioCapture::start`] to begin streaming [`AudioChunk`]s over an mpsc
//! channel.  The returned [`StreamHandle`] is a RAII guard — dropping it
//! stops the underlying cpal stream.
//!
//! [`FrameAssembler`] turns the irregular chunks a device delivers into the
//! fixed-duration mono 16 kHz [`AudioFrame`]s the transcription stage
//! expects, metering the RMS level of the native signal along the way.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use thiserror::Error;

use crate::audio::resample::{downmix_to_mono, f32_to_i16, resample_to_16k, rms_level};
use crate::queue::AudioFrame;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]` at the device's
/// native rate and channel count.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
///
/// Dropping this value stops the underlying hardware stream.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("no input device matching \"{0}\"")]
    DeviceNotFound(String),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio stream stopped unexpectedly")]
    StreamClosed,
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    /// Native sample rate reported by the device (Hz).
    sample_rate: u32,
    /// Number of interleaved channels reported by the device.
    channels: u16,
}

impl AudioCapture {
    /// Open an input device.
    ///
    /// `device_name` selects the first input device whose name contains the
    /// given substring; `None` uses the system default.  The device's
    /// preferred stream configuration (rate, channels) is adopted as-is —
    /// conversion to the pipeline format happens in [`FrameAssembler`].
    ///
    /// # Errors
    ///
    /// [`CaptureError::NoDevice`] when no input device exists,
    /// [`CaptureError::DeviceNotFound`] when `device_name` matches nothing,
    /// [`CaptureError::DefaultConfig`] when the device cannot report a
    /// default configuration.
    pub fn open(device_name: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        let device = match device_name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
            Some(name) => host
                .input_devices()
                .map_err(|_| CaptureError::NoDevice)?
                .find(|d| d.name().map(|n| n.contains(name)).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?,
        };

        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
        })
    }

    /// Start recording and send [`AudioChunk`]s to `tx`.
    ///
    /// The cpal callback runs on a dedicated audio thread; send errors
    /// (receiver dropped) are ignored so that thread never panics.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<StreamHandle, CaptureError> {
        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(AudioChunk {
                    samples: data.to_vec(),
                });
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }

    /// Native sample rate of the capture stream in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels in each [`AudioChunk`].
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Accumulates native-format chunks and emits fixed-duration pipeline frames.
///
/// Input chunks arrive in whatever sizes the device driver chooses; the
/// assembler regroups them into frames of `chunk_duration` seconds of native
/// audio, then downmixes, resamples to 16 kHz and scales to `i16`.  The RMS
/// meter value is computed on the native samples before any conversion.
pub struct FrameAssembler {
    sample_rate: u32,
    channels: u16,
    /// Interleaved native samples per emitted frame.
    frame_len: usize,
    pending: Vec<f32>,
    /// Meter value (0–100) of the most recently emitted frame.
    last_level: u8,
}

impl FrameAssembler {
    /// `chunk_duration` is the target frame length in seconds (0.1 in the
    /// default configuration).
    pub fn new(sample_rate: u32, channels: u16, chunk_duration: f32) -> Self {
        let frames = (sample_rate as f32 * chunk_duration).max(1.0) as usize;
        Self {
            sample_rate,
            channels,
            frame_len: frames * channels.max(1) as usize,
            pending: Vec::new(),
            last_level: 0,
        }
    }

    /// Feed one captured chunk; returns every complete frame it produced.
    pub fn push(&mut self, chunk: &AudioChunk) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(&chunk.samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_len {
            let native: Vec<f32> = self.pending.drain(..self.frame_len).collect();

            self.last_level = rms_level(&native);

            let mono = downmix_to_mono(&native, self.channels);
            let resampled = resample_to_16k(&mono, self.sample_rate);
            frames.push(AudioFrame::new(f32_to_i16(&resampled)));
        }
        frames
    }

    /// RMS meter value (0–100) of the most recently emitted frame.
    pub fn level(&self) -> u8 {
        self.last_level
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(samples: Vec<f32>) -> AudioChunk {
        AudioChunk { samples }
    }

    #[test]
    fn assembler_waits_for_a_full_frame() {
        // 16 kHz mono, 0.1 s frames → 1600 samples per frame.
        let mut asm = FrameAssembler::new(16_000, 1, 0.1);
        assert!(asm.push(&chunk(vec![0.0; 1000])).is_empty());

        let frames = asm.push(&chunk(vec![0.0; 700]));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples.len(), 1600);
    }

    #[test]
    fn assembler_emits_multiple_frames_from_one_chunk() {
        let mut asm = FrameAssembler::new(16_000, 1, 0.1);
        let frames = asm.push(&chunk(vec![0.0; 3300]));
        assert_eq!(frames.len(), 2);
        // 100 samples remain pending.
        assert!(asm.push(&chunk(vec![0.0; 1500])).len() == 1);
    }

    #[test]
    fn assembler_downmixes_and_resamples_to_pipeline_format() {
        // 48 kHz stereo, 0.1 s frames → 4800 frames × 2 ch = 9600 samples in,
        // 1600 mono samples out.
        let mut asm = FrameAssembler::new(48_000, 2, 0.1);
        let frames = asm.push(&chunk(vec![0.5; 9_600]));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples.len(), 1_600);
        // DC signal survives downmix + resample + i16 scaling.
        assert!(frames[0].samples.iter().all(|&s| (s - 16_384).abs() <= 1));
    }

    #[test]
    fn assembler_meters_native_level_per_frame() {
        let mut asm = FrameAssembler::new(16_000, 1, 0.1);
        assert_eq!(asm.level(), 0);

        asm.push(&chunk(vec![0.5; 1600]));
        assert!(asm.level() > 0);

        asm.push(&chunk(vec![0.0; 1600]));
        assert_eq!(asm.level(), 0);
    }

    #[test]
    fn audio_chunk_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioChunk>();
    }
}
