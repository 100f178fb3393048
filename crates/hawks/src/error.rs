//! Error types for Hawks.

use thiserror::Error;
use uuid::Uuid;

/// Wire-level decode failures.
///
/// Each malformed-frame condition has its own variant so callers (and tests)
/// can tell them apart without matching on message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame body is shorter than the fixed header.
    #[error("{frame} too short: {got} bytes, need at least {need}")]
    TooShort {
        frame: &'static str,
        got: usize,
        need: usize,
    },

    /// Declared lengths disagree with the bytes actually present.
    #[error("{frame} length mismatch: header declares {declared} bytes, got {actual}")]
    LengthMismatch {
        frame: &'static str,
        declared: usize,
        actual: usize,
    },

    /// Frame type byte is not one we know, or not the one expected here.
    #[error("unknown frame type {got:#04x} (expected {expected:#04x})")]
    UnknownFrameType { expected: u8, got: u8 },

    /// Outcome byte of a decision frame is neither ACKNOWLEDGE nor DO_NOT_ACKNOWLEDGE.
    #[error("unknown outcome byte {0:#04x}")]
    UnknownOutcome(u8),

    /// Frame exceeds the configured maximum size.
    #[error("frame of {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Decision answered a different command than the one in flight.
    #[error("decision command_id mismatch: expected {expected}, got {got}")]
    CommandIdMismatch { expected: Uuid, got: Uuid },
}

/// Errors surfaced by the channel consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Recoverable: log it and pull the next message.
    #[error("transient channel error: {0}")]
    Transient(String),

    /// Unrecoverable: the courier cannot run without its channel.
    #[error("fatal channel error: {0}")]
    Fatal(String),
}

impl ChannelError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChannelError::Fatal(_))
    }
}

/// Hawks error type.
#[derive(Error, Debug)]
pub enum HawksError {
    /// Malformed frame or correlation failure on the daemon link
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// IO error (socket, file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Daemon connection error (refused, reset, closed mid-exchange)
    #[error("Daemon connection error: {0}")]
    DaemonConnection(String),

    /// Channel consumer error
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// JSON encode/decode error on the pub/sub sidecar socket
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for Hawks operations.
pub type HawksResult<T> = Result<T, HawksError>;
