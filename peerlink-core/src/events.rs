//! Notifications consumed by the surrounding application (UI glue,
//! tests, or plain logging).

use peerlink_protocol::PeerDescriptor;
use tokio::sync::mpsc;

/// A notification raised by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DownloadStarted { name: String },
    /// Cumulative progress after a chunk, as a percentage in 0..=100.
    DownloadProgress { name: String, percent: f64 },
    DownloadFinished { name: String, success: bool },
    PeerAdded(PeerDescriptor),
    PeerRemoved(PeerDescriptor),
}

/// Sink for engine notifications.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Sink that logs every event via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

impl EventSink for LogEvents {
    fn emit(&self, event: Event) {
        match event {
            Event::DownloadStarted { name } => tracing::info!("Download started: {}", name),
            Event::DownloadProgress { name, percent } => {
                tracing::debug!("Download progress: {} ({:.1}%)", name, percent)
            }
            Event::DownloadFinished { name, success } => {
                tracing::info!("Download finished: {} (success={})", name, success)
            }
            Event::PeerAdded(peer) => tracing::info!("Peer added: {}", peer.key()),
            Event::PeerRemoved(peer) => tracing::info!("Peer removed: {}", peer.key()),
        }
    }
}

/// Sink that forwards events onto an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelEvents {
    /// Creates a sink and the receiver its events arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEvents {
    fn emit(&self, event: Event) {
        // A dropped receiver just means nobody is watching.
        let _ = self.tx.send(event);
    }
}
