//! The shared set of known peer connections.
//!
//! The server holds the authoritative roster and pushes the full set
//! to every socket whenever a connection is added or removed; clients
//! cache the last snapshot and synchronize by set difference. Identity
//! is the (address, name) pair: the port field carries "my own
//! listening port" in handshakes and takes no part in equality.

use parking_lot::Mutex;
use peerlink_protocol::{PeerDescriptor, PeerKey};
use std::collections::HashMap;

/// Result of applying a roster snapshot to a local cache.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RosterDiff {
    /// Entries present in the snapshot but absent locally.
    pub added: Vec<PeerDescriptor>,
    /// Entries absent in the snapshot but present locally.
    pub removed: Vec<PeerDescriptor>,
}

impl RosterDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Mutex-guarded set of known peers.
///
/// Every live entry either has an attached stream in the owner's side
/// table or is about to be removed on the next I/O error; no
/// half-open state is retained across operations.
#[derive(Debug, Default)]
pub struct RosterStore {
    peers: Mutex<HashMap<PeerKey, PeerDescriptor>>,
}

impl RosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a peer. Returns false if the identity was already
    /// present (the descriptor is updated either way, so a rebound
    /// listening port takes effect).
    pub fn insert(&self, peer: PeerDescriptor) -> bool {
        self.peers.lock().insert(peer.key(), peer).is_none()
    }

    /// Removes a peer by identity.
    pub fn remove(&self, key: &PeerKey) -> Option<PeerDescriptor> {
        self.peers.lock().remove(key)
    }

    pub fn contains(&self, key: &PeerKey) -> bool {
        self.peers.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Returns a consistent copy for broadcast or inspection.
    pub fn snapshot(&self) -> Vec<PeerDescriptor> {
        self.peers.lock().values().cloned().collect()
    }

    /// Replaces the cached roster with a received snapshot and returns
    /// the set difference.
    ///
    /// Entries whose port equals `own_port` describe the receiver
    /// itself and are excluded from the cache and from both
    /// notification lists (self-suppression).
    pub fn apply_snapshot(&self, snapshot: Vec<PeerDescriptor>, own_port: u16) -> RosterDiff {
        let incoming: HashMap<PeerKey, PeerDescriptor> = snapshot
            .into_iter()
            .filter(|peer| peer.port != own_port)
            .map(|peer| (peer.key(), peer))
            .collect();

        let mut peers = self.peers.lock();

        let added = incoming
            .iter()
            .filter(|(key, _)| !peers.contains_key(*key))
            .map(|(_, peer)| peer.clone())
            .collect();
        let removed = peers
            .iter()
            .filter(|(key, _)| !incoming.contains_key(*key))
            .map(|(_, peer)| peer.clone())
            .collect();

        *peers = incoming;
        RosterDiff { added, removed }
    }
}
