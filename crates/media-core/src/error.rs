use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for media operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the G.711 codec (C1).
#[derive(Debug, Error)]
pub enum CodecError {
    /// PCM input had an odd byte length; G.711 operates on 16-bit samples.
    #[error("PCM buffer length must be even, got {length}")]
    InvalidLength { length: usize },

    /// Invalid codec construction parameters.
    #[error("invalid codec parameters: {details}")]
    InvalidParameters { details: String },

    /// Frame submitted for encoding/decoding did not match the codec's configured frame size.
    #[error("invalid frame size: expected {expected} samples, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },
}

/// Error types for media operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Media processing error
    #[error("Media processing error: {0}")]
    Media(String),

    /// Codec error
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Format error
    #[error("Format error: {0}")]
    Format(String),

    /// Invalid format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid input passed at a call boundary (odd-length PCM, empty required
    /// frame, zero sample rate, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Call not found in the call manager
    #[error("Call not found: {0}")]
    CallNotFound(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// No codec selected
    #[error("No codec selected")]
    NoCodec,

    /// Unsupported codec
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Event channel full
    #[error("Event channel full")]
    EventChannelFull,

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSendError(String),

    /// Not initialized
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// A component that requires `start()` first was used too early.
    #[error("Component has not been started")]
    NotStarted,

    /// A non-idempotent start-like operation was called twice.
    #[error("Component is already started")]
    AlreadyStarted,

    /// A write was attempted on a jitter buffer whose producer side already closed.
    #[error("Write attempted on a closed jitter buffer")]
    WriteToClosedBuffer,

    /// The resampler could not be constructed for the requested rate pair.
    #[error("Resampler init failed: {from_rate}Hz -> {to_rate}Hz")]
    ResamplerInit { from_rate: u32, to_rate: u32 },

    /// The TTS source produced an error mid-stream; the current PlayScript is aborted.
    #[error("TTS stream error: {0}")]
    TtsStreamError(String),

    /// The secure media context (DTLS-SRTP handshake, treated as an external black
    /// box here) did not become ready before the configured deadline.
    #[error("Secure media context timed out after {0:?}")]
    SecureContextTimeout(Duration),

    /// Hangup signalling did not complete before the configured deadline; the
    /// caller force-terminates local state regardless.
    #[error("Hangup timed out after {0:?}")]
    HangupTimeout(Duration),

    /// A signalling message could not be delivered after exhausting retries.
    #[error("Signalling delivery failed after {attempts} attempts: {reason}")]
    SignallingDeliveryFailure { attempts: u32, reason: String },

    /// No call-scenario variant matched the given combination of endpoint kinds.
    #[error("No scenario handler for this call topology")]
    NoHandler,

    /// Not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}
