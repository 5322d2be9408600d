//! Media processing pipeline: voice activity detection and format conversion.

pub mod audio;
pub mod format;

pub use audio::{VadConfig, VadResult, VadState, VoiceActivityDetector};
pub use format::{ResampleQuality, Resampler, ResamplerCache, ResamplerConfig};
