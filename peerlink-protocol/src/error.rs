//! Protocol error types.

use crate::command::Command;
use thiserror::Error;

/// Errors that can occur during framing or message handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The remote side closed or reset the stream. Terminal for the
    /// session; never retried.
    #[error("peer disconnected")]
    PeerDisconnected,

    #[error("control payload too large: {size} bytes (max {max})")]
    ControlPayloadTooLarge { size: u64, max: u64 },

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    /// A well-formed frame arrived where a different command was
    /// required. Carries the declared length so the caller can drain
    /// the frame and keep the stream aligned.
    #[error("expected {expected:?} frame, got command byte {got:#04x}")]
    UnexpectedCommand {
        expected: Command,
        got: u8,
        length: u64,
    },

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("malformed transfer parameters: {0}")]
    MalformedParameters(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Maps an I/O error from a framed read to the session-terminal
    /// `PeerDisconnected` condition where appropriate.
    pub fn from_read_error(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => ProtocolError::PeerDisconnected,
            _ => ProtocolError::Io(err),
        }
    }

    /// Returns true if this error means the remote side went away.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ProtocolError::PeerDisconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_maps_to_disconnect() {
        let err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(ProtocolError::from_read_error(err).is_disconnect());

        let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(ProtocolError::from_read_error(err).is_disconnect());
    }

    #[test]
    fn test_other_io_preserved() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let mapped = ProtocolError::from_read_error(err);
        assert!(!mapped.is_disconnect());
        assert!(matches!(mapped, ProtocolError::Io(_)));
    }

    #[test]
    fn test_display() {
        let err = ProtocolError::PayloadTooLarge {
            size: 1 << 40,
            max: 16 * 1024 * 1024,
        };
        assert!(err.to_string().contains("1099511627776"));

        let err = ProtocolError::UnexpectedCommand {
            expected: Command::Payload,
            got: 0x07,
            length: 12,
        };
        assert!(err.to_string().contains("Payload"));
        assert!(err.to_string().contains("0x07"));
    }
}
