//! # peerlink-protocol
//!
//! Wire protocol implementation for peerlink.
//!
//! This crate provides:
//! - Binary framing: `[command:1][length:8, little-endian][payload]`
//! - The closed [`Command`] enumeration with stable wire identifiers
//! - Wire record types (peer descriptors, catalog entries)
//! - The `KEY=value::KEY=value` transfer-parameter codec
//! - Protocol error types and size ceilings

pub mod command;
pub mod error;
pub mod frame;
pub mod message;

pub use command::Command;
pub use error::ProtocolError;
pub use frame::{
    decode_frame, drain_payload, encode_frame, read_header, read_payload, write_frame, FrameHeader,
    FRAME_HEADER_SIZE,
};
pub use message::{
    decode_catalog, decode_roster, encode_catalog, encode_roster, FileEntry, PeerDescriptor,
    PeerKey, TransferParams,
};

/// Default port for the peerlink rendezvous server.
pub const DEFAULT_PORT: u16 = 7805;

/// Maximum declared length for control payloads (handshake, parameters,
/// roster, catalog, plaintext): 1 MiB.
pub const MAX_CONTROL_PAYLOAD: u64 = 1024 * 1024;

/// Maximum declared length for any top-level frame payload: 16 MiB.
///
/// File bytes are exempt: they travel in a `Payload` frame consumed
/// inside the `FileParameters` handler, never dispatched top-level.
pub const MAX_MESSAGE_PAYLOAD: u64 = 16 * 1024 * 1024;

/// Streaming buffer size for file transfers (512 KiB).
///
/// This is a buffer size, not a framing unit: the receiver sees one
/// contiguous run of `length` raw bytes.
pub const FILE_CHUNK_SIZE: usize = 512 * 1024;
