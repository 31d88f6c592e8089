//! # peerlink-client
//!
//! Client library for peerlink.
//!
//! This crate provides:
//! - Server connection with proactive handshake and background read loop
//! - Roster and catalog caches kept current by server pushes
//! - Uploads, downloads, and deletions against the shared catalog
//! - A peer listener for direct client-to-client transfers

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod peer;

pub use client::Client;
pub use config::ClientConfig;
pub use connection::ServerConnection;
pub use error::ClientError;
pub use handlers::{build_dispatch, ClientReader, ClientState, ClientWriter};
pub use peer::{connect_to_peer, PeerConnections, PeerListener};
