//! Sample-format helpers.
//!
//! These back [`BitrateController`](super::BitrateController)'s default codec
//! utilities. Resampling goes through rubato's FFT resampler; very short
//! buffers use linear interpolation.

use rubato::{FftFixedIn, Resampler};
use tracing::warn;

/// Inputs shorter than this are interpolated linearly.
const MIN_FFT_INPUT: usize = 64;

/// Resample mono audio from `from_rate` to `to_rate`.
///
/// The whole buffer is processed as one chunk. The result always holds
/// `ceil(len * to_rate / from_rate)` samples.
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || input.is_empty() {
        return input.to_vec();
    }
    if input.len() < MIN_FFT_INPUT {
        return resample_linear(input, from_rate, to_rate);
    }

    let samples: Vec<f64> = input.iter().map(|&s| s as f64).collect();
    let mut resampler =
        match FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, input.len(), 2, 1) {
            Ok(resampler) => resampler,
            Err(e) => {
                warn!(from_rate, to_rate, error = %e, "resampler init failed");
                return resample_linear(input, from_rate, to_rate);
            }
        };

    let frames_in = vec![samples];
    match resampler.process(&frames_in, None) {
        Ok(frames) => {
            let mut output: Vec<f32> = frames
                .into_iter()
                .next()
                .unwrap_or_default()
                .into_iter()
                .map(|s| s as f32)
                .collect();
            let tail = output.last().copied().unwrap_or(0.0);
            output.resize(output_len(input.len(), from_rate, to_rate), tail);
            output
        }
        Err(e) => {
            warn!(from_rate, to_rate, error = %e, "resampling failed");
            resample_linear(input, from_rate, to_rate)
        }
    }
}

fn output_len(len: usize, from_rate: u32, to_rate: u32) -> usize {
    (len as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize
}

/// Resample mono audio using linear interpolation.
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || input.is_empty() {
        return input.to_vec();
    }

    let step = from_rate as f64 / to_rate as f64;
    let last = input.len() - 1;

    (0..output_len(input.len(), from_rate, to_rate))
        .map(|i| {
            let src_idx = i as f64 * step;
            let idx_floor = (src_idx.floor() as usize).min(last);
            let idx_ceil = (idx_floor + 1).min(last);
            let frac = (src_idx - idx_floor as f64) as f32;
            input[idx_floor] * (1.0 - frac) + input[idx_ceil] * frac
        })
        .collect()
}

/// Convert f32 samples in `[-1.0, 1.0]` into 16-bit little-endian PCM.
///
/// Out-of-range samples are clipped.
pub fn quantize_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Convert 16-bit little-endian PCM back into f32 samples.
///
/// A trailing odd byte is ignored.
pub fn dequantize_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_upsample_length() {
        let input: Vec<f32> = (0..160).map(|i| (i as f32 * 0.1).sin()).collect();
        let output = resample(&input, 16_000, 48_000);
        assert_eq!(output.len(), 480);
    }

    #[test]
    fn test_resample_frame_lengths() {
        let frame = vec![0.0f32; 480];
        assert_eq!(resample(&frame, 48_000, 16_000).len(), 160);

        let frame = vec![0.0f32; 441];
        assert_eq!(resample(&frame, 44_100, 16_000).len(), 160);

        let long = vec![0.0f32; 4800];
        assert_eq!(resample(&long, 48_000, 16_000).len(), 1600);
    }

    #[test]
    fn test_resample_keeps_signal_energy() {
        // 440 Hz at 48 kHz down to 16 kHz.
        let input: Vec<f32> = (0..960)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48_000.0).sin() * 0.5)
            .collect();
        let output = resample(&input, 48_000, 16_000);
        let peak = output.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(peak > 0.1 && peak < 0.8, "peak {peak}");
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&input, 16_000, 16_000), input);
    }

    #[test]
    fn test_short_input_is_interpolated() {
        let input = [0.0, 1.0];
        assert_eq!(resample(&input, 8_000, 16_000), resample_linear(&input, 8_000, 16_000));
    }

    #[test]
    fn test_resample_interpolates_between_samples() {
        let output = resample_linear(&[0.0, 1.0], 8_000, 16_000);
        assert_eq!(output.len(), 4);
        assert!((output[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_quantize_clips_and_scales() {
        let bytes = quantize_pcm16(&[1.5, -1.5, 0.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), 0);
    }

    #[test]
    fn test_dequantize_inverts_quantize() {
        let samples = [0.5f32, -0.25, 0.0];
        let restored = dequantize_pcm16(&quantize_pcm16(&samples));
        for (a, b) in samples.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }
}
