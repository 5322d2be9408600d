//! Sample rate and sample-type conversion (C2).
//!
//! TTS engines hand back `f32` PCM at whatever rate they render natively
//! (commonly 16kHz or 48kHz); the call leg speaks G.711 at a fixed 8kHz in
//! `i16` PCM. This module bridges both gaps: [`Resampler::resample`] converts
//! sample rate on `i16` input, and [`Resampler::resample_f32`] additionally
//! converts sample type, scaling `f32` samples in `[-1.0, 1.0]` to 16-bit
//! linear PCM before the same rate-conversion path runs. [`ResampleQuality`]
//! picks the interpolation strategy; [`ResamplerCache`] amortizes resampler
//! construction across repeated calls at a fixed output rate when the input
//! rate varies call to call (e.g. per-TTS-engine configuration).

use tracing::{debug, warn};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Interpolation strategy used by [`Resampler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleQuality {
    /// Input and output rates match: copy samples through unchanged.
    /// Constructing a `Resampler` with matching rates always uses this tier
    /// regardless of what's requested, since there's nothing to interpolate.
    Passthrough,
    /// Linear interpolation between adjacent samples. Cheap, adequate for
    /// telephony-grade speech.
    Linear,
    /// Catmull-Rom cubic interpolation over four neighboring samples.
    /// Higher quality, intended for the TTS-ingest path where a 48kHz source
    /// is downsampled and artifacts are more audible.
    Sinc,
}

impl ResampleQuality {
    /// Map the legacy 0-10 quality knob onto a named tier.
    fn from_level(level: u8) -> Self {
        match level {
            0..=2 => Self::Passthrough,
            3..=6 => Self::Linear,
            _ => Self::Sinc,
        }
    }
}

/// Configuration for resampler
#[derive(Debug, Clone)]
pub struct ResamplerConfig {
    /// Input sample rate
    pub input_rate: u32,
    /// Output sample rate
    pub output_rate: u32,
    /// Interpolation tier in use.
    pub quality: ResampleQuality,
}

/// Audio resampler for sample rate (and, via [`Resampler::resample_f32`],
/// sample type) conversion.
pub struct Resampler {
    config: ResamplerConfig,
    ratio: f64,
    position: f64,
    prev_sample: i16,
    first_sample: bool,
}

impl Resampler {
    /// Create a new resampler. `quality` (0-10) is mapped onto a
    /// [`ResampleQuality`] tier; matching rates always degrade to
    /// `Passthrough` regardless of the requested quality.
    pub fn new(input_rate: u32, output_rate: u32, quality: u8) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(Error::ResamplerInit {
                from_rate: input_rate,
                to_rate: output_rate,
            });
        }

        if quality > 10 {
            warn!("Resampler quality {} clamped to 10", quality);
        }

        let ratio = output_rate as f64 / input_rate as f64;
        let tier = if input_rate == output_rate {
            ResampleQuality::Passthrough
        } else {
            ResampleQuality::from_level(quality.min(10))
        };

        debug!(
            "Creating resampler: {}Hz -> {}Hz (ratio: {:.4}, quality: {:?})",
            input_rate, output_rate, ratio, tier
        );

        Ok(Self {
            config: ResamplerConfig {
                input_rate,
                output_rate,
                quality: tier,
            },
            ratio,
            position: 0.0,
            prev_sample: 0,
            first_sample: true,
        })
    }

    /// Resample 16-bit linear PCM.
    pub fn resample(&mut self, input_samples: &[i16]) -> Result<Vec<i16>> {
        if input_samples.is_empty() {
            return Ok(Vec::new());
        }

        if self.config.quality == ResampleQuality::Passthrough && self.config.input_rate == self.config.output_rate {
            return Ok(input_samples.to_vec());
        }

        let expected_output_len = ((input_samples.len() as f64) * self.ratio).ceil() as usize;
        let mut output_samples = Vec::with_capacity(expected_output_len);

        self.position = 0.0;

        while self.position < input_samples.len() as f64 {
            let sample = self.interpolate_sample(input_samples);
            output_samples.push(sample);
            self.position += 1.0 / self.ratio;
        }

        self.prev_sample = input_samples[input_samples.len() - 1];
        self.first_sample = false;

        Ok(output_samples)
    }

    /// Resample `f32` PCM in `[-1.0, 1.0]`, scaling to 16-bit linear PCM first.
    /// This is the TTS-ingest entry point (C6): TTS engines render `f32`, the
    /// rest of the pipeline speaks `i16`.
    pub fn resample_f32(&mut self, input_samples: &[f32]) -> Result<Vec<i16>> {
        let scaled: Vec<i16> = input_samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
            .collect();
        self.resample(&scaled)
    }

    /// Reset resampler state
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.prev_sample = 0;
        self.first_sample = true;
        debug!("Resampler reset");
    }

    /// Get conversion ratio
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Get configuration
    pub fn config(&self) -> &ResamplerConfig {
        &self.config
    }

    fn interpolate_sample(&self, input_samples: &[i16]) -> i16 {
        let index = self.position as usize;
        let fraction = self.position - index as f64;

        if index >= input_samples.len() {
            return self.prev_sample;
        }

        let current_sample = input_samples[index];

        if fraction == 0.0 {
            return current_sample;
        }

        let next_sample = if index + 1 < input_samples.len() {
            input_samples[index + 1]
        } else {
            current_sample
        };

        match self.config.quality {
            ResampleQuality::Passthrough => {
                if fraction < 0.5 {
                    current_sample
                } else {
                    next_sample
                }
            }
            ResampleQuality::Linear => self.linear_interpolate(current_sample, next_sample, fraction),
            ResampleQuality::Sinc => self.smooth_interpolate(input_samples, index, fraction),
        }
    }

    fn linear_interpolate(&self, sample1: i16, sample2: i16, fraction: f64) -> i16 {
        let result = sample1 as f64 + (sample2 as f64 - sample1 as f64) * fraction;
        result.round() as i16
    }

    fn smooth_interpolate(&self, input_samples: &[i16], index: usize, fraction: f64) -> i16 {
        let prev_sample = if index > 0 {
            input_samples[index - 1]
        } else if !self.first_sample {
            self.prev_sample
        } else {
            input_samples[index]
        };

        let current_sample = input_samples[index];
        let next_sample = if index + 1 < input_samples.len() {
            input_samples[index + 1]
        } else {
            current_sample
        };

        let next_next_sample = if index + 2 < input_samples.len() {
            input_samples[index + 2]
        } else {
            next_sample
        };

        let t = fraction;
        let t2 = t * t;
        let t3 = t2 * t;

        let a0 = -0.5 * prev_sample as f64 + 1.5 * current_sample as f64 - 1.5 * next_sample as f64
            + 0.5 * next_next_sample as f64;
        let a1 =
            prev_sample as f64 - 2.5 * current_sample as f64 + 2.0 * next_sample as f64 - 0.5 * next_next_sample as f64;
        let a2 = -0.5 * prev_sample as f64 + 0.5 * next_sample as f64;
        let a3 = current_sample as f64;

        let result = a0 * t3 + a1 * t2 + a2 * t + a3;

        result.max(i16::MIN as f64).min(i16::MAX as f64).round() as i16
    }
}

/// Caches resamplers keyed by input rate for a fixed output rate and quality.
///
/// TTS engines differ in their native render rate, but a given call leg's
/// output rate (the rate fed to the G.711 encoder, normally 8000Hz) and
/// desired quality tier are fixed for the call's lifetime. Rather than
/// reconstruct a `Resampler` per utterance, C6 keeps one of these around and
/// reuses the per-rate entry, preserving each rate's interpolation state
/// across consecutive TTS chunks from the same source.
pub struct ResamplerCache {
    output_rate: u32,
    quality: u8,
    by_input_rate: HashMap<u32, Resampler>,
}

impl ResamplerCache {
    /// Create a cache targeting `output_rate` at the given legacy quality level.
    pub fn new(output_rate: u32, quality: u8) -> Self {
        Self {
            output_rate,
            quality,
            by_input_rate: HashMap::new(),
        }
    }

    /// Get (constructing if absent) the resampler for `input_rate`.
    pub fn get_or_create(&mut self, input_rate: u32) -> Result<&mut Resampler> {
        if !self.by_input_rate.contains_key(&input_rate) {
            let resampler = Resampler::new(input_rate, self.output_rate, self.quality)?;
            self.by_input_rate.insert(input_rate, resampler);
        }
        Ok(self.by_input_rate.get_mut(&input_rate).expect("just inserted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resampler_creation() {
        let resampler = Resampler::new(8000, 16000, 5);
        assert!(resampler.is_ok());

        let resampler = resampler.unwrap();
        assert_eq!(resampler.ratio(), 2.0);
        assert_eq!(resampler.config().quality, ResampleQuality::Linear);
    }

    #[test]
    fn test_matching_rates_are_passthrough() {
        let mut resampler = Resampler::new(8000, 8000, 9).unwrap();
        assert_eq!(resampler.config().quality, ResampleQuality::Passthrough);
        let input = vec![100i16, -200, 300, -400];
        let output = resampler.resample(&input).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_upsampling() {
        let mut resampler = Resampler::new(8000, 16000, 5).unwrap();
        let input = vec![100, 200, 300, 400];
        let output = resampler.resample(&input).unwrap();

        assert!(output.len() >= input.len() * 2 - 1);
        assert!(output.len() <= input.len() * 2 + 1);
    }

    #[test]
    fn test_downsampling() {
        let mut resampler = Resampler::new(16000, 8000, 5).unwrap();
        let input = vec![100, 150, 200, 250, 300, 350, 400, 450];
        let output = resampler.resample(&input).unwrap();

        assert!(output.len() >= input.len() / 2 - 1);
        assert!(output.len() <= input.len() / 2 + 1);
    }

    #[test]
    fn test_resample_f32_scales_full_scale_correctly() {
        let mut resampler = Resampler::new(16000, 16000, 9).unwrap();
        let input = vec![1.0f32, -1.0, 0.0];
        let output = resampler.resample_f32(&input).unwrap();
        assert_eq!(output[0], i16::MAX);
        assert_eq!(output[2], 0);
    }

    #[test]
    fn test_resampler_cache_reuses_entries() {
        let mut cache = ResamplerCache::new(8000, 5);
        {
            let r = cache.get_or_create(16000).unwrap();
            assert_eq!(r.ratio(), 0.5);
        }
        let before_len = cache.by_input_rate.len();
        cache.get_or_create(16000).unwrap();
        assert_eq!(cache.by_input_rate.len(), before_len);
    }
}
