//! Session termination types.

use std::fmt;

/// Failures on the client connection. Fatal to the owning session only.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Writing a frame failed.
    #[error("write failed: {0}")]
    Write(String),

    /// Writing a frame did not complete within the write deadline.
    #[error("write deadline exceeded")]
    WriteTimeout,

    /// Receiving a frame failed.
    #[error("read failed: {0}")]
    Read(String),

    /// No pong arrived within the read deadline.
    #[error("read deadline exceeded")]
    ReadTimeout,

    /// The client sent a frame over the size limit.
    #[error("message of {size} bytes exceeds limit of {limit}")]
    MessageTooLarge { size: usize, limit: usize },

    /// The connection ended without a close frame.
    #[error("connection closed")]
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The client sent a close frame.
    ClientClosed,
    /// The server is shutting down.
    Shutdown,
    /// The connection failed.
    Transport(TransportError),
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed => write!(f, "client closed connection"),
            Self::Shutdown => write!(f, "server shutting down"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl From<TransportError> for EndReason {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}
