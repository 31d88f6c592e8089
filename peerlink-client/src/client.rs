//! High-level client API.

use crate::config::ClientConfig;
use crate::connection::ServerConnection;
use crate::error::ClientError;
use crate::handlers::{build_dispatch, ClientReader, ClientState, ClientWriter};
use crate::peer::{connect_to_peer, PeerConnections, PeerListener};
use peerlink_core::{DispatchTable, EventSink, LogEvents};
use peerlink_protocol::{FileEntry, PeerDescriptor, PeerKey};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// High-level client: one server connection, one peer listener, and
/// the caches they keep synchronized.
pub struct Client {
    config: ClientConfig,
    state: Arc<ClientState>,
    table: Arc<DispatchTable<ClientReader, ClientWriter>>,
    peers: Arc<PeerConnections>,
    server: Mutex<Option<ServerConnection>>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Creates a new client. Events go to the log; use
    /// [`Client::with_events`] to observe them programmatically.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_events(config, Arc::new(LogEvents))
    }

    /// Creates a new client with a caller-provided event sink.
    pub fn with_events(config: ClientConfig, events: Arc<dyn EventSink>) -> Self {
        let state = Arc::new(ClientState::new(&config, events));
        let table = Arc::new(build_dispatch(&state));
        Self {
            config,
            state,
            table,
            peers: Arc::new(PeerConnections::new()),
            server: Mutex::new(None),
            listener_task: Mutex::new(None),
        }
    }

    /// Connects to the rendezvous server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let conn =
            ServerConnection::connect(&self.config, self.state.clone(), self.table.clone()).await?;
        *self.server.lock().await = Some(conn);
        Ok(())
    }

    /// Binds the peer listener and starts accepting direct
    /// connections in the background. Returns the bound address.
    pub async fn start_peer_listener(&self) -> Result<std::net::SocketAddr, ClientError> {
        let listener =
            PeerListener::bind(&self.config, self.table.clone(), self.peers.clone()).await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(listener.run());
        if let Some(previous) = self.listener_task.lock().await.replace(task) {
            previous.abort();
        }
        Ok(addr)
    }

    pub async fn is_connected(&self) -> bool {
        self.server
            .lock()
            .await
            .as_ref()
            .map(|conn| conn.is_connected())
            .unwrap_or(false)
    }

    /// Closes the server connection and stops the peer listener.
    pub async fn close(&self) {
        if let Some(conn) = self.server.lock().await.take() {
            conn.close();
        }
        if let Some(task) = self.listener_task.lock().await.take() {
            task.abort();
        }
    }

    /// Uploads a local file to the server's share directory.
    pub async fn upload(&self, path: &Path) -> Result<u64, ClientError> {
        let server = self.server.lock().await;
        let conn = server.as_ref().ok_or(ClientError::NotConnected)?;
        conn.upload(path).await
    }

    /// Asks the server to stream a shared file into the download
    /// directory.
    pub async fn request_file(&self, name: &str) -> Result<(), ClientError> {
        let server = self.server.lock().await;
        let conn = server.as_ref().ok_or(ClientError::NotConnected)?;
        conn.request_file(name).await
    }

    /// Asks the server for a fresh roster push.
    pub async fn refresh_roster(&self) -> Result<(), ClientError> {
        let server = self.server.lock().await;
        let conn = server.as_ref().ok_or(ClientError::NotConnected)?;
        conn.refresh_roster().await
    }

    /// Asks the server to delete a shared file.
    pub async fn delete_file(&self, name: &str) -> Result<(), ClientError> {
        let server = self.server.lock().await;
        let conn = server.as_ref().ok_or(ClientError::NotConnected)?;
        conn.delete_file(name).await
    }

    /// Sends a plaintext message to the server.
    pub async fn send_text(&self, text: &str) -> Result<(), ClientError> {
        let server = self.server.lock().await;
        let conn = server.as_ref().ok_or(ClientError::NotConnected)?;
        conn.send_text(text).await
    }

    /// Opens a direct connection to a peer from the roster.
    pub async fn connect_to_peer(&self, peer: &PeerDescriptor) -> Result<(), ClientError> {
        connect_to_peer(peer, &self.config, self.table.clone(), self.peers.clone()).await
    }

    /// Streams a local file directly to a connected peer.
    pub async fn send_file_to_peer(&self, key: &PeerKey, path: &Path) -> Result<u64, ClientError> {
        self.peers.send_file_to(key, path).await
    }

    /// The last roster snapshot pushed by the server.
    pub fn roster(&self) -> Vec<PeerDescriptor> {
        self.state.roster.snapshot()
    }

    /// The last catalog snapshot pushed by the server.
    pub fn catalog(&self) -> Vec<FileEntry> {
        self.state.catalog.snapshot()
    }

    /// Shared state, for callers wiring their own plumbing.
    pub fn state(&self) -> &Arc<ClientState> {
        &self.state
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(task) = self.listener_task.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn never_dialed() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let downloads = tempfile::tempdir().unwrap();
        let config = ClientConfig::new(never_dialed(), "alice")
            .with_download_dir(downloads.path());
        let client = Client::new(config);

        assert!(!client.is_connected().await);
        assert!(matches!(
            client.request_file("anything.txt").await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            client.delete_file("anything.txt").await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            client.refresh_roster().await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_direct_peer_transfer() {
        let dl_alice = tempfile::tempdir().unwrap();
        let dl_bob = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();

        // No rendezvous server involved: a direct connection carries
        // the transfer end to end.
        let alice = Client::new(
            ClientConfig::new(never_dialed(), "alice")
                .with_listen_port(0)
                .with_download_dir(dl_alice.path()),
        );
        let bob = Client::new(
            ClientConfig::new(never_dialed(), "bob")
                .with_listen_port(0)
                .with_download_dir(dl_bob.path()),
        );
        let bob_addr = bob.start_peer_listener().await.unwrap();

        let bob_descriptor = PeerDescriptor::new("127.0.0.1", bob_addr.port(), "bob");
        alice.connect_to_peer(&bob_descriptor).await.unwrap();

        let local = source.path().join("note.txt");
        std::fs::write(&local, b"straight from alice").unwrap();
        let sent = alice
            .send_file_to_peer(&bob_descriptor.key(), &local)
            .await
            .unwrap();
        assert_eq!(sent, 19);

        let landed = dl_bob.path().join("note.txt");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if std::fs::read(&landed).map(|b| b == b"straight from alice").unwrap_or(false) {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "transfer never landed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_close_stops_peer_listener() {
        let downloads = tempfile::tempdir().unwrap();
        let client = Client::new(
            ClientConfig::new(never_dialed(), "carol")
                .with_listen_port(0)
                .with_download_dir(downloads.path()),
        );
        let addr = client.start_peer_listener().await.unwrap();
        let target = ("127.0.0.1", addr.port());

        // Reachable while the listener runs.
        tokio::net::TcpStream::connect(target).await.unwrap();

        client.close().await;

        // The abort lands asynchronously; the socket must go away.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if tokio::net::TcpStream::connect(target).await.is_err() {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "listener still accepting after close"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer_fails() {
        let downloads = tempfile::tempdir().unwrap();
        let client = Client::new(
            ClientConfig::new(never_dialed(), "alice").with_download_dir(downloads.path()),
        );
        let key = peerlink_protocol::PeerKey {
            address: "10.0.0.9".into(),
            name: "ghost".into(),
        };
        let err = client
            .send_file_to_peer(&key, Path::new("/tmp/whatever.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnknownPeer(_)));
    }
}
