//! Audio processing components.
//!
//! Echo cancellation, noise suppression, and automatic gain control are
//! Non-goals of this crate's scope — voice activity detection (C3) is the
//! only stage carried here.

pub mod vad;

pub use vad::{VadConfig, VadResult, VadState, VoiceActivityDetector};
