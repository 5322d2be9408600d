//! Media buffering.
//!
//! Just the one buffer this crate needs: the single-writer/single-reader
//! jitter buffer (C4) between the TTS framer and the playout loop.

pub mod jitter;

pub use jitter::JitterBuffer;
