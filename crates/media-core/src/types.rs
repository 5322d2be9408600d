//! Core types and constants shared across the voice pipeline.
//!
//! This module defines the fundamental data structures and identifiers used
//! throughout the crate: dialog/session identifiers, the wire-level
//! [`MediaPacket`]/[`Frame`] types, and [`MediaProfile`], which pins down the
//! codec/rate/ptime combination negotiated for a call's media session.

use std::fmt;
use std::time::{Duration, Instant};
use bytes::Bytes;

/// Unique identifier for a SIP dialog (the signalling stack is treated as an
/// external black box; this crate only ever stores and echoes the string it
/// is handed).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogId(String);

impl DialogId {
    /// Create a new dialog ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a media session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaSessionId(String);

impl MediaSessionId {
    /// Create a new media session ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create from dialog ID
    pub fn from_dialog(dialog_id: &DialogId) -> Self {
        Self(dialog_id.0.clone())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RTP payload type
pub type PayloadType = u8;

/// Standard payload type constants relevant to this crate's G.711-only scope.
pub mod payload_types {
    use super::PayloadType;

    /// G.711 μ-law (PCMU)
    pub const PCMU: PayloadType = 0;
    /// G.711 A-law (PCMA)
    pub const PCMA: PayloadType = 8;
    /// Telephone event (DTMF), passed through untouched
    pub const TELEPHONE_EVENT: PayloadType = 101;
}

/// Media packet containing RTP payload and metadata, as handed across the
/// boundary with the (external) RTP/SIP stack.
#[derive(Debug, Clone)]
pub struct MediaPacket {
    /// RTP payload data
    pub payload: Bytes,
    /// Payload type
    pub payload_type: PayloadType,
    /// RTP timestamp
    pub timestamp: u32,
    /// RTP sequence number
    pub sequence_number: u16,
    /// RTP SSRC
    pub ssrc: u32,
    /// Reception time
    pub received_at: Instant,
}

/// Audio frame with PCM data and format information
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// PCM audio data (interleaved samples)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u8,
    /// Frame duration
    pub duration: Duration,
    /// Timestamp
    pub timestamp: u32,
}

impl AudioFrame {
    /// Create a new audio frame
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u8, timestamp: u32) -> Self {
        let sample_count = samples.len() / channels as usize;
        let duration = Duration::from_secs_f64(sample_count as f64 / sample_rate as f64);

        Self {
            samples,
            sample_rate,
            channels,
            duration,
            timestamp,
        }
    }

    /// Get the number of samples per channel
    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Check if frame is mono
    pub fn is_mono(&self) -> bool {
        self.channels == 1
    }

    /// Check if frame is stereo
    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }
}

/// Media direction for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaDirection {
    /// Send only
    SendOnly,
    /// Receive only
    RecvOnly,
    /// Send and receive
    SendRecv,
    /// Inactive
    Inactive,
}

impl fmt::Display for MediaDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaDirection::SendOnly => write!(f, "sendonly"),
            MediaDirection::RecvOnly => write!(f, "recvonly"),
            MediaDirection::SendRecv => write!(f, "sendrecv"),
            MediaDirection::Inactive => write!(f, "inactive"),
        }
    }
}

/// Common sample rates for audio processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRate {
    /// 8 kHz (narrowband, G.711's native rate)
    Rate8000 = 8000,
    /// 16 kHz (wideband, used for TTS ingest and the recording pipeline's output)
    Rate16000 = 16000,
    /// 32 kHz (super-wideband)
    Rate32000 = 32000,
    /// 48 kHz (fullband, common TTS engine output)
    Rate48000 = 48000,
}

impl SampleRate {
    /// Get the sample rate as Hz
    pub fn as_hz(&self) -> u32 {
        *self as u32
    }

    /// Create from Hz value
    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            8000 => Some(Self::Rate8000),
            16000 => Some(Self::Rate16000),
            32000 => Some(Self::Rate32000),
            48000 => Some(Self::Rate48000),
            _ => None,
        }
    }
}

/// The codec/rate/ptime combination negotiated for a call's media session.
///
/// G.711 fixes the wire rate at 8kHz regardless of `sample_rate_hz`, which
/// instead describes the rate audio is carried at internally up to the point
/// it's handed to the codec (e.g. a resampler target). `ptime_ms` is the RTP
/// packetization interval; combined with `sample_rate_hz` it determines frame
/// sizing for the jitter buffer and playout loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaProfile {
    /// Payload type negotiated for this leg (PCMU or PCMA).
    pub payload_type: PayloadType,
    /// Sample rate in Hz that PCM is carried at before G.711 encoding.
    pub sample_rate_hz: u32,
    /// RTP packetization interval in milliseconds (spec default: 20ms).
    pub ptime_ms: u32,
    /// Channel count (always 1 for G.711 telephony).
    pub channels: u8,
}

impl MediaProfile {
    /// Build the default G.711 μ-law profile: 8kHz, 20ms ptime, mono.
    pub fn g711_mulaw() -> Self {
        Self {
            payload_type: payload_types::PCMU,
            sample_rate_hz: 8000,
            ptime_ms: 20,
            channels: 1,
        }
    }

    /// Build the default G.711 A-law profile: 8kHz, 20ms ptime, mono.
    pub fn g711_alaw() -> Self {
        Self {
            payload_type: payload_types::PCMA,
            sample_rate_hz: 8000,
            ptime_ms: 20,
            channels: 1,
        }
    }

    /// Number of PCM samples per channel in one packetization interval.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate_hz as usize * self.ptime_ms as usize) / 1000
    }

    /// Size in bytes of one frame of 16-bit PCM at this profile's rate.
    pub fn frame_bytes_pcm16(&self) -> usize {
        self.samples_per_frame() * self.channels as usize * 2
    }

    /// Size in bytes of one frame once G.711-encoded (1 byte/sample, 8-bit codewords).
    pub fn frame_bytes_encoded(&self) -> usize {
        self.samples_per_frame() * self.channels as usize
    }
}

/// One packetization interval's worth of encoded audio, as it moves through
/// the jitter buffer (C4) and playout loop (C5). Distinct from [`MediaPacket`]:
/// a `Frame` has already been decoupled from RTP sequence/SSRC bookkeeping,
/// which is the concern of the (external) RTP stack and the audio bridge (C8).
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded payload (G.711 codewords, one byte per sample).
    pub payload: Bytes,
    /// Payload type this frame was encoded with.
    pub payload_type: PayloadType,
    /// Playout timestamp in codec sample units, monotonically increasing by
    /// `samples_per_frame()` per frame.
    pub timestamp: u32,
    /// Wall-clock duration this frame represents (typically the profile's ptime).
    pub duration: Duration,
}

impl Frame {
    /// Construct a frame from an encoded payload and a profile.
    pub fn new(payload: Bytes, profile: &MediaProfile, timestamp: u32) -> Self {
        Self {
            payload,
            payload_type: profile.payload_type,
            timestamp,
            duration: Duration::from_millis(profile.ptime_ms as u64),
        }
    }
}
