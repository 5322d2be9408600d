//! Shared codec trait and metadata, used by the G.711 implementation.

use crate::error::Result;
use crate::types::AudioFrame;

/// Audio codec trait shared by stateful codec implementations.
///
/// G.711 is stateless so `reset` is a no-op, but the trait is shaped to also
/// fit codecs that carry adaptive state.
pub trait AudioCodec: Send + Sync {
    /// Encode a PCM frame into the codec's wire format.
    fn encode(&mut self, audio_frame: &AudioFrame) -> Result<Vec<u8>>;

    /// Decode wire-format bytes back into a PCM frame.
    fn decode(&mut self, encoded_data: &[u8]) -> Result<AudioFrame>;

    /// Describe this codec instance's negotiated parameters.
    fn get_info(&self) -> CodecInfo;

    /// Reset any internal state (no-op for stateless codecs like G.711).
    fn reset(&mut self);
}

/// Negotiated codec parameters, surfaced for logging/diagnostics.
#[derive(Debug, Clone)]
pub struct CodecInfo {
    /// Human-readable codec name (e.g. "PCMU").
    pub name: String,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u8,
    /// Nominal bitrate in bits per second.
    pub bitrate: u32,
}
