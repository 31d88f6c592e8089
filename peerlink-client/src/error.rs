//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] peerlink_protocol::ProtocolError),

    #[error("engine error: {0}")]
    Core(#[from] peerlink_core::CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connect timeout")]
    Timeout,

    #[error("not connected")]
    NotConnected,

    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl ClientError {
    /// Returns true when the underlying cause is the remote side
    /// going away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ClientError::Core(e) => e.is_disconnect(),
            ClientError::Protocol(e) => e.is_disconnect(),
            _ => false,
        }
    }
}
