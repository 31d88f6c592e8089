//! TCP server implementation.
//!
//! One task per connection. The accept loop hands each socket to a
//! session that handshakes, registers the peer, and runs the serving
//! loop until the peer leaves or breaks the protocol. Membership
//! changes are broadcast to everyone still connected.

use crate::config::Config;
use crate::error::ServerError;
use crate::handlers::{
    DeleteFileHandler, RequestFileHandler, RosterRequestHandler, ServerReader, ServerState,
    UploadHandler,
};
use crate::peers::ServerWriter;
use peerlink_core::{
    read_handshake, serve, DispatchTable, LogPlainText, SessionConfig, SharedWriter,
};
use peerlink_protocol::Command;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};

/// Runtime server configuration, distilled from [`Config`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Per-session settings.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let network = crate::config::NetworkConfig::default();
        Self {
            bind_addr: network.bind_addr,
            max_connections: network.max_connections,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builds runtime settings from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            max_connections: config.network.max_connections,
            session: SessionConfig {
                handshake_timeout: config.network.handshake_timeout(),
            },
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub errors_total: AtomicU64,
}

/// Rendezvous server: accepts peers, tracks membership, relays files.
pub struct Server {
    config: ServerConfig,
    state: Arc<ServerState>,
    table: Arc<DispatchTable<ServerReader, ServerWriter>>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
    local_addr: OnceLock<SocketAddr>,
}

impl Server {
    /// Creates a new server sharing files from `share_dir`.
    pub fn new(
        config: ServerConfig,
        share_dir: impl Into<std::path::PathBuf>,
    ) -> Result<Self, ServerError> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(ServerState::new(share_dir)?);
        let table = Arc::new(Self::build_dispatch(&state));
        Ok(Self {
            config,
            state,
            table,
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
            local_addr: OnceLock::new(),
        })
    }

    fn build_dispatch(state: &Arc<ServerState>) -> DispatchTable<ServerReader, ServerWriter> {
        let mut table = DispatchTable::new();
        table.register(
            Command::FileParameters,
            Arc::new(UploadHandler {
                state: state.clone(),
            }),
        );
        table.register(
            Command::RequestFile,
            Arc::new(RequestFileHandler {
                state: state.clone(),
            }),
        );
        table.register(
            Command::DeleteFile,
            Arc::new(DeleteFileHandler {
                state: state.clone(),
            }),
        );
        table.register(
            Command::Roster,
            Arc::new(RosterRequestHandler {
                state: state.clone(),
            }),
        );
        table.register(Command::PlainText, Arc::new(LogPlainText));
        table
    }

    /// Runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let _ = self.local_addr.set(listener.local_addr()?);
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(
            "Server listening on {}, sharing {}",
            listener.local_addr()?,
            self.state.catalog.root().display()
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let state = self.state.clone();
                            let table = self.table.clone();
                            let stats = self.stats.clone();
                            let session = self.config.session.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let result = Self::handle_connection(
                                    stream,
                                    addr,
                                    state,
                                    table,
                                    session,
                                    &mut conn_shutdown,
                                )
                                .await;

                                match result {
                                    Ok(()) => {}
                                    Err(e) if e.is_disconnect() => {
                                        tracing::info!("Peer at {} disconnected", addr);
                                    }
                                    Err(e) => {
                                        tracing::warn!("Connection {} error: {}", addr, e);
                                        stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                    }
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Handles a single connection from handshake to departure.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        state: Arc<ServerState>,
        table: Arc<DispatchTable<ServerReader, ServerWriter>>,
        session: SessionConfig,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let writer: SharedWriter<ServerWriter> = Arc::new(Mutex::new(write_half));

        let descriptor = read_handshake(&mut reader, &session).await?;
        let key = descriptor.key();
        tracing::info!("Peer '{}' joined from {}", key, addr);

        state.roster.insert(descriptor);
        state.writers.insert(key.clone(), writer.clone());

        // The newcomer learns the current state before anyone is told
        // about them.
        let pushed = state.push_state(&writer).await;
        if pushed.is_ok() {
            state.broadcast_roster().await;
        }

        let result = match pushed {
            Ok(()) => {
                tokio::select! {
                    res = serve(&mut reader, &writer, &table) => res.map_err(ServerError::from),
                    _ = shutdown.recv() => Err(ServerError::ShuttingDown),
                }
            }
            Err(e) => Err(ServerError::from(e)),
        };

        state.writers.remove(&key);
        state.roster.remove(&key);
        state.broadcast_roster().await;
        tracing::info!("Peer '{}' left", key);

        result
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the bound address once [`Server::run`] has started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Returns the shared state (roster, catalog, writer table).
    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }
}
