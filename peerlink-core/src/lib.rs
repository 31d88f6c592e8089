//! # peerlink-core
//!
//! The generic protocol engine shared by every participant: the
//! server, the client's server-facing connection, and the client's
//! peer-to-peer listener all run the same dispatch table and session
//! loop over the peerlink frame format.
//!
//! This crate provides:
//! - Command dispatch table with drain-on-unknown framing alignment
//! - Connection session loop (Handshaking -> Serving -> Closed)
//! - Roster store with snapshot diffing and self-suppression
//! - Catalog store recomputed from the share directory
//! - Chunked file streaming with progress observation
//! - Path containment for upload/download destinations

pub mod catalog;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod path;
pub mod roster;
pub mod session;
pub mod transfer;

pub use catalog::{CatalogCache, CatalogStore};
pub use dispatch::{DispatchTable, FrameHandler, HandlerFuture, LogPlainText, SharedWriter};
pub use error::CoreError;
pub use events::{ChannelEvents, Event, EventSink, LogEvents};
pub use roster::{RosterDiff, RosterStore};
pub use session::{read_handshake, send_handshake, serve, SessionConfig};
pub use transfer::{absorb_missequenced_frame, discard_payload_frame, receive_file, send_file};
