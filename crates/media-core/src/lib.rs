//! Real-time audio plane for the AI voice response pipeline.
//!
//! `media-core` turns scripted text into paced G.711 RTP frames and back:
//! it streams TTS audio through a resampler and jitter buffer (C1-C6), paces
//! emission against wall-clock time while honoring a half-duplex VAD gate
//! (C7), bridges the result to/from an RTP transport (C8), and records both
//! call legs to a stereo WAV file (C11). The call-scenario dispatch and call
//! lifecycle layer that sits above this crate live in `rvoip-call-engine`.
//!
//! ## Module map
//!
//! - [`types`]: wire-level identifiers, [`types::MediaProfile`], [`types::Frame`].
//! - [`codec`]: G.711 µ-law/A-law (C1).
//! - [`processing`]: resampling (C2) and voice activity detection (C3).
//! - [`buffer`]: the jitter buffer (C4).
//! - [`tts`]: TTS ingest and framing (C6).
//! - [`playout`]: the paced playout loop (C5).
//! - [`responder`]: the half-duplex gate and the composite AI auto-responder (C7).
//! - [`bridge`]: the RTP-facing audio bridge (C8).
//! - [`recorder`]: the dual-leg WAV recording pipeline (C11).
//! - [`config`]: all tunables in one place.
//! - [`error`]: the crate's error type.

pub mod error;
pub mod types;
pub mod config;
pub mod codec;
pub mod processing;
pub mod buffer;
pub mod tts;
pub mod playout;
pub mod responder;
pub mod bridge;
pub mod recorder;

pub use error::{Error, Result};
pub use types::{AudioFrame, Frame, MediaProfile, MediaSessionId, DialogId};

/// Commonly used types, re-exported for callers that want one `use`.
pub mod prelude {
    pub use crate::{Error, Result};
    pub use crate::types::{AudioFrame, Frame, MediaProfile, MediaSessionId, DialogId, payload_types};
    pub use crate::config::PipelineConfig;
    pub use crate::codec::{decode_alaw, decode_mulaw, encode_alaw, encode_mulaw};
    pub use crate::buffer::JitterBuffer;
    pub use crate::processing::{VoiceActivityDetector, VadConfig, VadResult, VadState};
    pub use crate::processing::{Resampler, ResamplerCache};
    pub use crate::tts::{TtsChunk, TtsSource, TtsFramer};
    pub use crate::playout::{PlayoutLoop, PlayoutState, PlayoutEvent, LoopPhase};
    pub use crate::responder::{AiAutoResponder, AutoResponder, TtsEngine, TurnState, PlaybackOutcome};
    pub use crate::bridge::{AudioBridge, RtpPacket, InboundPcm};
    pub use crate::recorder::CallRecorder;
}
