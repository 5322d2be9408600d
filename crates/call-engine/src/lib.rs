//! Call-scenario dispatch and call lifecycle management.
//!
//! This crate sits above `rvoip-media-core`: it owns the 7-topology
//! call-scenario state machine (C9) and the call manager (C10) that wraps it
//! with a concurrent `call_id -> CallContext` table, answer/hangup lifecycle,
//! and an idle-context cleanup sweep. The SIP/RTP stack itself, the
//! secure-media (DTLS-SRTP) handshake, and the C7 AI auto-responder are
//! external black boxes this crate only interfaces with through the
//! [`scenario::SignallingSink`], [`manager::SecureMediaContext`], and
//! [`scenario::CallOrchestrator`] traits.

pub mod manager;
pub mod scenario;

pub use manager::{CallManager, ImmediateSecureContext, SecureMediaContext};
pub use rvoip_media_core::{Error, Result};
pub use scenario::{CallContext, CallOrchestrator, CallScenario, Party, RoutingInputs, SignallingMessage, SignallingSink};
