//! Error types for the chat room
//!
//! Defines wire decode errors, per-session send errors, and the
//! server/client/config level errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Failure to turn one frame into a `Command`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Frame has no `|` delimiter
    #[error("malformed command: {0:?}")]
    MalformedCommand(String),

    /// Prefix does not name a known command kind (case-sensitive)
    #[error("unknown command kind: {0:?}")]
    UnknownCommandKind(String),
}

/// Errors raised while reading or writing frames
///
/// Any of these ends the session's read loop.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Line framing error (frame too long, IO)
    #[error("frame error: {0}")]
    Frame(#[from] LinesCodecError),

    /// Frame was read but is not a valid command
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Frame(LinesCodecError::Io(err))
    }
}

/// Per-session send errors
///
/// Never retried: the session is closed and cleaned up instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The writer side of the session is gone
    #[error("session closed")]
    Closed,

    /// The peer stopped draining its outbound queue
    #[error("outbound queue full")]
    QueueFull,
}

/// Room server errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error while binding or accepting
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `connect` called while not stopped
    #[error("server is already {0}")]
    AlreadyRunning(crate::types::ServerState),

    /// `disconnect` called while not running
    #[error("server is not running")]
    NotRunning,

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Chat client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server unreachable or refused the connection
    #[error("connection to {addr} failed: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Could not queue a command for the server
    #[error("send error: {0}")]
    Send(#[from] SendError),

    /// Invalid settings
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration and settings errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading or writing a settings file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid JSON
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Port is not a number or outside the allowed range
    #[error("invalid port {0:?}")]
    InvalidPort(String),

    /// Server address is not an IP address
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// Required value is empty
    #[error("{0} must not be empty")]
    MissingField(&'static str),
}
