//! Audio resampling
//!
//! Converts decoded source audio from an arbitrary sample rate to the
//! fixed 16 kHz pipeline rate using linear interpolation. Resampling the
//! same input always yields the same output.

use crate::audio::types::AudioError;

/// Sample rate converter for whole decoded buffers.
pub struct LinearResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    conversion_ratio: f64,
}

impl LinearResampler {
    pub fn new(source_sample_rate: u32, target_sample_rate: u32) -> Result<Self, AudioError> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(AudioError::Processing {
                message: "sample rates must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            conversion_ratio: f64::from(source_sample_rate) / f64::from(target_sample_rate),
        })
    }

    /// True when the conversion is the identity.
    pub fn is_passthrough(&self) -> bool {
        self.source_sample_rate == self.target_sample_rate
    }

    /// Resample a complete mono buffer.
    pub fn resample(&self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() || input.is_empty() {
            return input.to_vec();
        }

        let output_len =
            (input.len() as f64 / self.conversion_ratio).round() as usize;
        let mut output = Vec::with_capacity(output_len);

        for i in 0..output_len {
            let source_pos = i as f64 * self.conversion_ratio;
            let index = source_pos as usize;
            let frac = source_pos - index as f64;

            let current = input[index.min(input.len() - 1)];
            let next = input[(index + 1).min(input.len() - 1)];
            output.push(current + (next - current) * frac as f32);
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_preserves_samples() {
        let resampler = LinearResampler::new(16_000, 16_000).unwrap();
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resampler.resample(&input), input);
    }

    #[test]
    fn downsampling_halves_length() {
        let resampler = LinearResampler::new(32_000, 16_000).unwrap();
        let input = vec![0.0; 32_000];
        let output = resampler.resample(&input);
        assert_eq!(output.len(), 16_000);
    }

    #[test]
    fn upsampling_doubles_length() {
        let resampler = LinearResampler::new(8_000, 16_000).unwrap();
        let input = vec![0.5; 8_000];
        let output = resampler.resample(&input);
        assert_eq!(output.len(), 16_000);
        assert!(output.iter().all(|s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(LinearResampler::new(0, 16_000).is_err());
        assert!(LinearResampler::new(44_100, 0).is_err());
    }

    #[test]
    fn resampling_is_idempotent_across_calls() {
        let resampler = LinearResampler::new(44_100, 16_000).unwrap();
        let input: Vec<f32> = (0..4_410).map(|i| (i as f32 / 100.0).sin()).collect();
        assert_eq!(resampler.resample(&input), resampler.resample(&input));
    }
}
