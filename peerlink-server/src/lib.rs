//! # peerlink-server
//!
//! Rendezvous server for peerlink.
//!
//! This crate provides:
//! - TCP accept loop and per-connection session tasks
//! - Roster tracking with membership broadcasts
//! - Share-directory catalog with upload/request/delete handlers
//! - YAML + environment configuration

pub mod config;
pub mod error;
pub mod handlers;
pub mod peers;
pub mod server;

pub use config::{Config, ConfigError, NetworkConfig, StorageConfig};
pub use error::ServerError;
pub use handlers::{ServerReader, ServerState};
pub use peers::{PeerWriters, ServerWriter};
pub use server::{Server, ServerConfig, ServerStats};
