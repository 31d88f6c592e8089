//! The closed command enumeration.
//!
//! Every frame begins with a single command byte that selects the
//! handler for the payload that follows. Wire identifiers are part of
//! the protocol contract: once deployed they are never reordered or
//! reused, because every running peer has them baked into its build.

use serde::{Deserialize, Serialize};

/// Commands understood by the peerlink protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Command {
    /// First frame on every connection: the sender's peer descriptor.
    Handshake = 1,
    /// Full roster snapshot (JSON array of peer descriptors).
    Roster = 2,
    /// Full catalog snapshot (JSON array of file entries).
    Catalog = 3,
    /// Transfer parameters (`KEY=value::KEY=value` text); a `Payload`
    /// frame carrying the file bytes must follow.
    FileParameters = 4,
    /// Raw file bytes; length field is the exact file size.
    Payload = 5,
    /// Ask the server to stream a catalog file back (payload is the
    /// UTF-8 file name).
    RequestFile = 6,
    /// Ask the server to delete a catalog file (payload is the UTF-8
    /// file name).
    DeleteFile = 7,
    /// Human-readable diagnostic text.
    PlainText = 8,
}

impl Command {
    /// Returns the command for a wire byte, or `None` for identifiers
    /// this build does not know (the dispatcher drains those).
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Command::Handshake),
            2 => Some(Command::Roster),
            3 => Some(Command::Catalog),
            4 => Some(Command::FileParameters),
            5 => Some(Command::Payload),
            6 => Some(Command::RequestFile),
            7 => Some(Command::DeleteFile),
            8 => Some(Command::PlainText),
            _ => None,
        }
    }

    /// Returns the wire byte for this command.
    pub fn to_wire(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_ids_stable() {
        // These values are deployed; changing any of them is a
        // protocol break.
        assert_eq!(Command::Handshake.to_wire(), 1);
        assert_eq!(Command::Roster.to_wire(), 2);
        assert_eq!(Command::Catalog.to_wire(), 3);
        assert_eq!(Command::FileParameters.to_wire(), 4);
        assert_eq!(Command::Payload.to_wire(), 5);
        assert_eq!(Command::RequestFile.to_wire(), 6);
        assert_eq!(Command::DeleteFile.to_wire(), 7);
        assert_eq!(Command::PlainText.to_wire(), 8);
    }

    #[test]
    fn test_from_wire_roundtrip() {
        for byte in 1u8..=8 {
            let cmd = Command::from_wire(byte).unwrap();
            assert_eq!(cmd.to_wire(), byte);
        }
    }

    #[test]
    fn test_unknown_wire_id() {
        assert_eq!(Command::from_wire(0), None);
        assert_eq!(Command::from_wire(99), None);
        assert_eq!(Command::from_wire(255), None);
    }
}
