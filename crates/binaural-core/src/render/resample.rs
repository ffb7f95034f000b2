//! Impulse response sample rate conversion
//!
//! HRIR sets are usually measured at 44.1kHz or 48kHz and must match the
//! device rate before they are partitioned. Conversion happens once per
//! filter while a renderer is being built, so quality matters more than
//! speed here.

use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use super::error::{RenderError, RenderResult};
use crate::types::Sample;

/// Smallest chunk handed to rubato, so every flush call yields output
const MIN_CHUNK: usize = 1024;

/// Converts a complete mono signal between sample rates
pub trait Resampler: Send + Sync {
    fn resample(&self, samples: &[Sample], from_rate: u32, to_rate: u32) -> RenderResult<Vec<Sample>>;
}

/// Band-limited sinc resampler backed by rubato
#[derive(Debug, Clone, Copy, Default)]
pub struct SincResampler;

impl SincResampler {
    pub fn new() -> Self {
        Self
    }

    fn parameters() -> SincInterpolationParameters {
        SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        }
    }
}

impl Resampler for SincResampler {
    fn resample(&self, samples: &[Sample], from_rate: u32, to_rate: u32) -> RenderResult<Vec<Sample>> {
        if from_rate == 0 || to_rate == 0 {
            return Err(RenderError::Resample(format!(
                "invalid rates {}Hz -> {}Hz",
                from_rate, to_rate
            )));
        }
        if from_rate == to_rate || samples.is_empty() {
            return Ok(samples.to_vec());
        }

        let ratio = to_rate as f64 / from_rate as f64;
        let expected = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;

        // One zero-padded chunk holds the whole response
        let chunk_size = samples.len().max(MIN_CHUNK);
        let mut padded = samples.to_vec();
        padded.resize(chunk_size, 0.0);

        let mut resampler = SincFixedIn::<Sample>::new(ratio, 1.0, Self::parameters(), chunk_size, 1)
            .map_err(|e| RenderError::Resample(e.to_string()))?;
        let delay = resampler.output_delay();

        let input = [padded];
        let mut output = resampler
            .process(&input[..], None)
            .map_err(|e| RenderError::Resample(e.to_string()))?
            .swap_remove(0);

        // Flush the sinc tail until the delayed signal is fully out
        while output.len() < expected + delay {
            let tail = resampler
                .process_partial::<&[Sample]>(None, None)
                .map_err(|e| RenderError::Resample(e.to_string()))?
                .swap_remove(0);
            if tail.is_empty() {
                break;
            }
            output.extend_from_slice(&tail);
        }

        let end = (delay + expected).min(output.len());
        let start = delay.min(end);
        log::debug!(
            "[RESAMPLE] {} samples {}Hz -> {}Hz ({} out, delay {})",
            samples.len(),
            from_rate,
            to_rate,
            end - start,
            delay
        );
        Ok(output[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_identity() {
        let input = vec![1.0, 0.5, -0.25];
        let out = SincResampler::new().resample(&input, 48000, 48000).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_output_length_follows_ratio() {
        let input = vec![0.0; 441];
        let out = SincResampler::new().resample(&input, 44100, 48000).unwrap();
        assert_eq!(out.len(), 480);
    }

    #[test]
    fn test_dc_level_is_preserved() {
        let input = vec![1.0; 4096];
        let out = SincResampler::new().resample(&input, 44100, 48000).unwrap();

        // Away from the edges a constant stays constant
        let mid = &out[out.len() / 4..3 * out.len() / 4];
        for &s in mid {
            assert!((s - 1.0).abs() < 0.02, "got {}", s);
        }
    }

    #[test]
    fn test_rejects_zero_rate() {
        assert!(SincResampler::new().resample(&[1.0], 0, 48000).is_err());
    }
}
