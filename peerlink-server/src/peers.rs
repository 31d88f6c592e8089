//! Connected-peer writer table.
//!
//! The serving loop owns each connection's read half; the write
//! halves land here so roster and catalog broadcasts can reach every
//! connected peer. Entries live exactly as long as their session.

use dashmap::DashMap;
use peerlink_core::SharedWriter;
use peerlink_protocol::PeerKey;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;

/// Write half of a server-accepted connection.
pub type ServerWriter = OwnedWriteHalf;

/// Writer side table, keyed by peer identity.
#[derive(Default)]
pub struct PeerWriters {
    writers: DashMap<PeerKey, SharedWriter<ServerWriter>>,
}

impl PeerWriters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: PeerKey, writer: SharedWriter<ServerWriter>) {
        self.writers.insert(key, writer);
    }

    pub fn remove(&self, key: &PeerKey) {
        self.writers.remove(key);
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Sends one encoded frame to every connected peer.
    ///
    /// A peer whose socket fails is skipped; its own serving loop
    /// notices the broken connection and removes it. A writer held by
    /// an in-flight file transfer delays its copy of the broadcast
    /// until the transfer releases the lock.
    pub async fn broadcast(&self, frame: &[u8]) {
        // Snapshot first: awaiting while iterating would hold a shard
        // lock across suspension points.
        let writers: Vec<(PeerKey, SharedWriter<ServerWriter>)> = self
            .writers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (key, writer) in writers {
            let mut writer = writer.lock().await;
            if let Err(e) = writer.write_all(frame).await {
                tracing::debug!("Broadcast to '{}' failed: {}", key.name, e);
            }
        }
    }
}
