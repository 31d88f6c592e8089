//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] peerlink_protocol::ProtocolError),

    #[error("engine error: {0}")]
    Core(#[from] peerlink_core::CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Returns true when the underlying cause is the peer going away.
    /// Departures are logged at info and never counted as failures.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ServerError::Core(e) => e.is_disconnect(),
            ServerError::Protocol(e) => e.is_disconnect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerlink_protocol::ProtocolError;

    #[test]
    fn test_disconnect_classification() {
        let err = ServerError::Protocol(ProtocolError::PeerDisconnected);
        assert!(err.is_disconnect());

        let err = ServerError::ShuttingDown;
        assert!(!err.is_disconnect());
    }
}
