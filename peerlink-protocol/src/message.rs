//! Wire record types for roster, catalog, and transfer parameters.
//!
//! Roster and catalog payloads are UTF-8 JSON arrays of their record
//! shapes. Transfer parameters are plain text of the form
//! `KEY=value::KEY=value`.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};

/// A peer as it appears on the wire.
///
/// Only the serializable identity fields travel; the live stream used
/// to reach a peer is runtime-only state carried in a side table
/// keyed by [`PeerKey`], never transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Remote address (host or IP as text).
    pub address: String,
    /// The peer's own listening port, for direct peer connections.
    pub port: u16,
    /// Display name.
    pub name: String,
}

impl PeerDescriptor {
    pub fn new(address: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            name: name.into(),
        }
    }

    /// Returns the stable identity used for roster diffing.
    ///
    /// Identity is (address, name): the port field doubles as "my own
    /// listening port" in handshakes, so it takes no part in equality.
    pub fn key(&self) -> PeerKey {
        PeerKey {
            address: self.address.clone(),
            name: self.name.clone(),
        }
    }
}

/// Stable roster identity: (address, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub address: String,
    pub name: String,
}

impl std::fmt::Display for PeerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.address)
    }
}

/// A file known to be present on the server.
///
/// Derived, not stored: recomputed from the share directory on every
/// catalog-changing operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Encodes a roster snapshot as its JSON wire payload.
pub fn encode_roster(peers: &[PeerDescriptor]) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(peers)?)
}

/// Decodes a roster snapshot payload.
pub fn decode_roster(payload: &[u8]) -> Result<Vec<PeerDescriptor>, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Encodes a catalog snapshot as its JSON wire payload.
pub fn encode_catalog(entries: &[FileEntry]) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(entries)?)
}

/// Decodes a catalog snapshot payload.
pub fn decode_catalog(payload: &[u8]) -> Result<Vec<FileEntry>, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Pair separator in a transfer-parameters payload.
const PAIR_SEPARATOR: &str = "::";

/// Parameters carried by a `FileParameters` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferParams {
    /// Destination file name (required).
    pub name: String,
    /// File size, if the sender included it. The authoritative size is
    /// the length field of the `Payload` frame that follows.
    pub size: Option<u64>,
}

impl TransferParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Encodes as `KEY=value::KEY=value` text.
    pub fn encode(&self) -> Vec<u8> {
        let mut text = format!("NAME={}", self.name);
        if let Some(size) = self.size {
            text.push_str(PAIR_SEPARATOR);
            text.push_str(&format!("SIZE={}", size));
        }
        text.into_bytes()
    }

    /// Parses a transfer-parameters payload.
    ///
    /// Unknown keys are ignored for forward compatibility; a missing
    /// `NAME` key is an error.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?;

        let mut name = None;
        let mut size = None;
        for pair in text.split(PAIR_SEPARATOR) {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ProtocolError::MalformedParameters(pair.to_string()))?;
            match key {
                "NAME" => name = Some(value.to_string()),
                "SIZE" => {
                    let parsed = value
                        .parse::<u64>()
                        .map_err(|_| ProtocolError::MalformedParameters(pair.to_string()))?;
                    size = Some(parsed);
                }
                _ => {}
            }
        }

        let name = name.ok_or(ProtocolError::MissingParameter("NAME"))?;
        Ok(Self { name, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_identity_ignores_port() {
        let a = PeerDescriptor::new("10.0.0.5", 4000, "alice");
        let b = PeerDescriptor::new("10.0.0.5", 9999, "alice");
        assert_eq!(a.key(), b.key());

        let c = PeerDescriptor::new("10.0.0.5", 4000, "bob");
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_roster_json_roundtrip() {
        let peers = vec![
            PeerDescriptor::new("10.0.0.5", 4000, "alice"),
            PeerDescriptor::new("10.0.0.6", 4001, "bob"),
        ];
        let payload = encode_roster(&peers).unwrap();
        assert!(std::str::from_utf8(&payload).unwrap().starts_with('['));

        let decoded = decode_roster(&payload).unwrap();
        assert_eq!(decoded, peers);
    }

    #[test]
    fn test_catalog_json_roundtrip() {
        let entries = vec![
            FileEntry::new("report.pdf", 1 << 20),
            FileEntry::new("notes.txt", 120),
        ];
        let payload = encode_catalog(&entries).unwrap();
        let decoded = decode_catalog(&payload).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn test_malformed_roster_rejected() {
        assert!(decode_roster(b"{not json").is_err());
        assert!(decode_roster(b"{\"address\":\"x\"}").is_err()); // not an array
    }

    #[test]
    fn test_params_encode() {
        let params = TransferParams::new("report.pdf").with_size(2048);
        assert_eq!(params.encode(), b"NAME=report.pdf::SIZE=2048");

        let params = TransferParams::new("report.pdf");
        assert_eq!(params.encode(), b"NAME=report.pdf");
    }

    #[test]
    fn test_params_parse() {
        let params = TransferParams::parse(b"NAME=report.pdf::SIZE=2048").unwrap();
        assert_eq!(params.name, "report.pdf");
        assert_eq!(params.size, Some(2048));
    }

    #[test]
    fn test_params_unknown_keys_ignored() {
        let params = TransferParams::parse(b"NAME=a.txt::COMPRESS=zstd").unwrap();
        assert_eq!(params.name, "a.txt");
        assert_eq!(params.size, None);
    }

    #[test]
    fn test_params_missing_name() {
        let err = TransferParams::parse(b"SIZE=10").unwrap_err();
        assert!(matches!(err, ProtocolError::MissingParameter("NAME")));
    }

    #[test]
    fn test_params_malformed() {
        assert!(TransferParams::parse(b"NAME").is_err());
        assert!(TransferParams::parse(b"NAME=a::SIZE=ten").is_err());
        assert!(TransferParams::parse(&[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn test_params_value_may_contain_equals() {
        let params = TransferParams::parse(b"NAME=weird=name.txt").unwrap();
        assert_eq!(params.name, "weird=name.txt");
    }
}
