//! Server connection management.
//!
//! A connection opens with a proactive handshake carrying this
//! client's descriptor, then splits: a background task runs the
//! serving loop over the read half, while callers issue commands
//! through the shared write half.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::handlers::{ClientReader, ClientState, ClientWriter};
use peerlink_core::{send_file, send_handshake, serve, DispatchTable, SharedWriter};
use peerlink_protocol::{write_frame, Command, PeerDescriptor};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// An established connection to the rendezvous server.
pub struct ServerConnection {
    writer: SharedWriter<ClientWriter>,
    descriptor: PeerDescriptor,
    connected: Arc<AtomicBool>,
    read_task: JoinHandle<()>,
}

impl ServerConnection {
    /// Connects, handshakes, and starts the background read loop.
    pub async fn connect(
        config: &ClientConfig,
        state: Arc<ClientState>,
        table: Arc<DispatchTable<ClientReader, ClientWriter>>,
    ) -> Result<Self, ClientError> {
        tracing::debug!("Connecting to {}...", config.server_addr);

        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect(config.server_addr),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;

        stream.set_nodelay(true).ok();

        // The descriptor announces the address the server will see
        // paired with the port this client listens on.
        let local_ip = stream.local_addr()?.ip().to_string();
        let descriptor = PeerDescriptor::new(local_ip, config.listen_port, config.name.clone());

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let writer: SharedWriter<ClientWriter> = Arc::new(Mutex::new(write_half));

        {
            let mut guard = writer.lock().await;
            send_handshake(&mut *guard, &descriptor).await?;
        }

        let connected = Arc::new(AtomicBool::new(true));
        let read_task = {
            let writer = writer.clone();
            let connected = connected.clone();
            let addr = config.server_addr;
            tokio::spawn(async move {
                match serve(&mut reader, &writer, &table).await {
                    Err(e) if e.is_disconnect() => {
                        tracing::info!("Server {} closed the connection", addr);
                    }
                    Err(e) => {
                        tracing::warn!("Server connection {} failed: {}", addr, e);
                    }
                    Ok(()) => {}
                }
                connected.store(false, Ordering::SeqCst);
            })
        };

        tracing::info!("Connected to server {} as '{}'", config.server_addr, config.name);

        Ok(Self {
            writer,
            descriptor,
            connected,
            read_task,
        })
    }

    /// The descriptor announced in this connection's handshake.
    pub fn descriptor(&self) -> &PeerDescriptor {
        &self.descriptor
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<(), ClientError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    /// Uploads a local file to the server's share directory. The
    /// remote name is the file's own name; the writer is held for the
    /// whole transfer.
    pub async fn upload(&self, path: &Path) -> Result<u64, ClientError> {
        self.ensure_connected()?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ClientError::InvalidPath(path.display().to_string()))?
            .to_string();

        let mut writer = self.writer.lock().await;
        let sent = send_file(&mut *writer, path, &name).await?;
        tracing::info!("Uploaded '{}' ({} bytes)", name, sent);
        Ok(sent)
    }

    /// Asks the server to stream a shared file back. The file arrives
    /// as a pushed transfer on the read loop.
    pub async fn request_file(&self, name: &str) -> Result<(), ClientError> {
        self.ensure_connected()?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, Command::RequestFile, name.as_bytes()).await?;
        Ok(())
    }

    /// Asks the server for a fresh roster push. The reply arrives as
    /// a `Roster` frame on the read loop and replaces the cache.
    pub async fn refresh_roster(&self) -> Result<(), ClientError> {
        self.ensure_connected()?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, Command::Roster, &[]).await?;
        Ok(())
    }

    /// Asks the server to delete a shared file.
    pub async fn delete_file(&self, name: &str) -> Result<(), ClientError> {
        self.ensure_connected()?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, Command::DeleteFile, name.as_bytes()).await?;
        Ok(())
    }

    /// Sends a plaintext message to the server.
    pub async fn send_text(&self, text: &str) -> Result<(), ClientError> {
        self.ensure_connected()?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, Command::PlainText, text.as_bytes()).await?;
        Ok(())
    }

    /// Tears the connection down.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.read_task.abort();
    }
}

impl Drop for ServerConnection {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}
