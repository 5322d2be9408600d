//! Format conversion components.
//!
//! Channel mixing is out of scope — this crate fixes `channels = 1`
//! throughout. Sample-rate and sample-type conversion (C2) is what remains.

pub mod resampler;

pub use resampler::{ResampleQuality, Resampler, ResamplerCache, ResamplerConfig};
