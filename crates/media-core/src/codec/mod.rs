//! Audio codec implementations.
//!
//! This crate's Non-goals exclude transcoding between non-G.711 codecs, so
//! G.711 (μ-law/A-law) is the only codec carried here.

use crate::error::Result;
use crate::types::{payload_types, SampleRate};

pub mod audio;
pub use audio::{decode_alaw, decode_mulaw, encode_alaw, encode_mulaw, AudioCodec, CodecInfo, G711Codec, G711Config, G711Variant};

/// Construct a [`G711Codec`] for the given RTP payload type, or `None` if the
/// payload type isn't one this crate supports.
pub fn codec_for_payload_type(pt: u8, sample_rate: SampleRate, channels: u8) -> Option<Result<G711Codec>> {
    match pt {
        payload_types::PCMU => Some(G711Codec::mu_law(sample_rate, channels)),
        payload_types::PCMA => Some(G711Codec::a_law(sample_rate, channels)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_payload_type_returns_none() {
        assert!(codec_for_payload_type(111, SampleRate::Rate8000, 1).is_none());
    }

    #[test]
    fn pcmu_payload_type_resolves() {
        let codec = codec_for_payload_type(payload_types::PCMU, SampleRate::Rate8000, 1);
        assert!(codec.unwrap().is_ok());
    }
} 