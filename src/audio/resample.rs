//! Sample-format conversion for the transcription pipeline.
//!
//! The transcription stage consumes **16 kHz mono `i16`** PCM regardless of
//! what the capture device delivers.  This module provides the conversion
//! steps applied to every captured chunk:
//!
//! 1. [`downmix_to_mono`] — average interleaved channels down to mono.
//! 2. [`resample_to_16k`] — linear-interpolation resample to 16 000 Hz.
//! 3. [`f32_to_i16`] / [`i16_to_f32`] — scale between float and 16-bit PCM
//!    with saturation clipping.
//!
//! The resampler uses linear interpolation; `rubato` (already in Cargo.toml)
//! is the upgrade path if interpolation quality ever becomes the bottleneck.

/// Pipeline-wide target sample rate expected by the transcription oracle.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging channels.
///
/// * `channels == 1` returns the input as an owned `Vec` unchanged.
/// * `channels == 0` returns an empty vector.
///
/// Output length is `samples.len() / channels`.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample_to_16k
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` Hz to 16 000 Hz using linear
/// interpolation.
///
/// * Already at 16 kHz → cloned unchanged.
/// * Empty input → empty output.
///
/// Output length is approximately `samples.len() * 16_000 / source_rate`.
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Vec<f32> {
    if source_rate == TARGET_SAMPLE_RATE {
        return samples.to_vec();
    }

    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = f64::from(TARGET_SAMPLE_RATE) / f64::from(source_rate);
    let output_len = (samples.len() as f64 * ratio).floor() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac as f32) + samples[idx + 1] * frac as f32
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// i16 <-> f32 scaling
// ---------------------------------------------------------------------------

/// Convert float samples in `[-1.0, 1.0]` to 16-bit PCM with saturation.
///
/// Out-of-range input (possible after channel averaging or interpolation
/// overshoot) clips to `i16::MIN` / `i16::MAX` instead of wrapping.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32768.0).clamp(-32768.0, 32767.0) as i16)
        .collect()
}

/// Convert 16-bit PCM to float samples in `[-1.0, 1.0)`.
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
}

// ---------------------------------------------------------------------------
// rms_level
// ---------------------------------------------------------------------------

/// RMS level of a float chunk scaled to an integer `0..=100` meter value.
///
/// The scale matches a 16-bit meter where full deflection sits at an RMS of
/// 328 in i16 units, roughly 1% of full scale, so quiet speech already
/// registers visibly.
pub fn rms_level(samples: &[f32]) -> u8 {
    if samples.is_empty() {
        return 0;
    }
    let mean_sq =
        samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum::<f64>() / samples.len() as f64;
    let rms_i16 = mean_sq.sqrt() * 32768.0;
    (rms_i16 / 328.0 * 100.0).min(100.0) as u8
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
