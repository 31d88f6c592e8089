//! Engine error types.

use peerlink_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the protocol engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path '{name}' escapes the share root")]
    PathViolation { name: String },

    /// The remote side broke framing in a way that cannot be drained;
    /// the session is torn down to avoid desynchronization.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("handshake not received within {0:?}")]
    HandshakeTimeout(std::time::Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns true if this error means the peer went away: the
    /// session ends, the roster entry is dropped, nothing is retried.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, CoreError::Protocol(e) if e.is_disconnect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        let err = CoreError::Protocol(ProtocolError::PeerDisconnected);
        assert!(err.is_disconnect());

        let err = CoreError::PathViolation {
            name: "../../etc/passwd".to_string(),
        };
        assert!(!err.is_disconnect());
        assert!(err.to_string().contains("escapes"));
    }
}
