//! Audio codec implementations.
//!
//! The crate's Non-goals exclude transcoding between non-G.711 codecs, so
//! this module carries only G.711 (μ-law/A-law), the telephony baseline.

mod common;
pub use common::{AudioCodec, CodecInfo};

/// G.711 µ-law/A-law codec (PCMU/PCMA)
pub mod g711;
pub use g711::{decode_alaw, decode_mulaw, encode_alaw, encode_mulaw, G711Codec, G711Config, G711Variant};

/// Payload type constants for the static audio codecs this crate supports.
pub mod payload_type {
    /// PCMU/G.711 µ-law (8kHz)
    pub const PCMU: u8 = 0;

    /// PCMA/G.711 A-law (8kHz)
    pub const PCMA: u8 = 8;

    /// Telephone-event (DTMF) RFC 4733, passed through untouched
    pub const TELEPHONE_EVENT: u8 = 101;
}
