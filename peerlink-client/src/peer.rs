//! Direct peer-to-peer connections.
//!
//! Each client runs a listener of its own. Peer connections go
//! through the same handshake and serving loop as the server
//! connection and share its dispatch table, so a peer can push files
//! straight into the download directory without the server relaying.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::handlers::{ClientReader, ClientWriter};
use dashmap::DashMap;
use peerlink_core::{
    read_handshake, send_file, send_handshake, serve, DispatchTable, SessionConfig, SharedWriter,
};
use peerlink_protocol::{PeerDescriptor, PeerKey};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// Write halves of live peer connections, keyed by peer identity.
#[derive(Default)]
pub struct PeerConnections {
    writers: DashMap<PeerKey, SharedWriter<ClientWriter>>,
}

impl PeerConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &PeerKey) -> bool {
        self.writers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    fn get(&self, key: &PeerKey) -> Option<SharedWriter<ClientWriter>> {
        self.writers.get(key).map(|entry| entry.value().clone())
    }

    /// Streams a local file directly to a connected peer.
    pub async fn send_file_to(&self, key: &PeerKey, path: &Path) -> Result<u64, ClientError> {
        let writer = self
            .get(key)
            .ok_or_else(|| ClientError::UnknownPeer(key.to_string()))?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ClientError::InvalidPath(path.display().to_string()))?
            .to_string();

        let mut writer = writer.lock().await;
        let sent = send_file(&mut *writer, path, &name).await?;
        tracing::info!("Sent '{}' to {} ({} bytes)", name, key, sent);
        Ok(sent)
    }
}

/// Listener for inbound peer connections.
pub struct PeerListener {
    listener: TcpListener,
    session: SessionConfig,
    table: Arc<DispatchTable<ClientReader, ClientWriter>>,
    peers: Arc<PeerConnections>,
}

impl PeerListener {
    /// Binds the listening socket configured by `config.listen_port`.
    pub async fn bind(
        config: &ClientConfig,
        table: Arc<DispatchTable<ClientReader, ClientWriter>>,
        peers: Arc<PeerConnections>,
    ) -> Result<Self, ClientError> {
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
        let listener = TcpListener::bind(bind_addr).await?;
        tracing::info!("Peer listener on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            session: config.session,
            table,
            peers,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts peer connections until the task is dropped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let session = self.session;
                    let table = self.table.clone();
                    let peers = self.peers.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_peer(stream, addr, session, table, peers).await
                        {
                            if e.is_disconnect() {
                                tracing::info!("Peer at {} disconnected", addr);
                            } else {
                                tracing::warn!("Peer connection {} failed: {}", addr, e);
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Peer accept error: {}", e);
                }
            }
        }
    }

    async fn handle_peer(
        stream: TcpStream,
        addr: SocketAddr,
        session: SessionConfig,
        table: Arc<DispatchTable<ClientReader, ClientWriter>>,
        peers: Arc<PeerConnections>,
    ) -> Result<(), ClientError> {
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let writer: SharedWriter<ClientWriter> = Arc::new(Mutex::new(write_half));

        let descriptor = read_handshake(&mut reader, &session).await?;
        let key = descriptor.key();
        tracing::info!("Peer '{}' connected from {}", key, addr);

        peers.writers.insert(key.clone(), writer.clone());
        let result = serve(&mut reader, &writer, &table).await;
        peers.writers.remove(&key);

        result?;
        Ok(())
    }
}

/// Opens an outbound connection to a peer learned from the roster.
///
/// The connection handshakes with this client's descriptor and then
/// serves inbound frames with the shared dispatch table, exactly like
/// the server connection does.
pub async fn connect_to_peer(
    peer: &PeerDescriptor,
    config: &ClientConfig,
    table: Arc<DispatchTable<ClientReader, ClientWriter>>,
    peers: Arc<PeerConnections>,
) -> Result<(), ClientError> {
    let target = (peer.address.as_str(), peer.port);
    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(target))
        .await
        .map_err(|_| ClientError::Timeout)??;
    stream.set_nodelay(true).ok();

    let local_ip = stream.local_addr()?.ip().to_string();
    let descriptor = PeerDescriptor::new(local_ip, config.listen_port, config.name.clone());

    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let writer: SharedWriter<ClientWriter> = Arc::new(Mutex::new(write_half));

    {
        let mut guard = writer.lock().await;
        send_handshake(&mut *guard, &descriptor).await?;
    }

    let key = peer.key();
    peers.writers.insert(key.clone(), writer.clone());
    tracing::info!("Connected to peer '{}'", key);

    tokio::spawn(async move {
        match serve(&mut reader, &writer, &table).await {
            Err(e) if e.is_disconnect() => tracing::info!("Peer '{}' disconnected", key),
            Err(e) => tracing::warn!("Peer connection '{}' failed: {}", key, e),
            Ok(()) => {}
        }
        peers.writers.remove(&key);
    });

    Ok(())
}
