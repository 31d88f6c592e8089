//! Server-side frame handlers.
//!
//! Three commands do real work here: `FileParameters` receives an
//! upload into the share directory, `RequestFile` streams a shared
//! file back on the requesting connection, and `DeleteFile` removes
//! one. Each mutation ends with a catalog broadcast so every peer's
//! view converges.

use crate::peers::{PeerWriters, ServerWriter};
use peerlink_core::path::resolve_under_root;
use peerlink_core::{
    absorb_missequenced_frame, discard_payload_frame, receive_file, send_file, CatalogStore,
    CoreError, FrameHandler, HandlerFuture, LogEvents, RosterStore, SharedWriter,
};
use peerlink_protocol::{
    encode_catalog, encode_frame, encode_roster, read_payload, write_frame, Command, FrameHeader,
    ProtocolError, TransferParams,
};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;

/// Read half of a server-accepted connection.
pub type ServerReader = BufReader<OwnedReadHalf>;

/// State shared by every connection: who is here and what they can get.
pub struct ServerState {
    pub roster: RosterStore,
    pub catalog: CatalogStore,
    pub writers: PeerWriters,
    events: LogEvents,
}

impl ServerState {
    /// Opens the share directory and scans it into the catalog.
    pub fn new(share_dir: impl Into<std::path::PathBuf>) -> Result<Self, CoreError> {
        Ok(Self {
            roster: RosterStore::new(),
            catalog: CatalogStore::open(share_dir)?,
            writers: PeerWriters::new(),
            events: LogEvents,
        })
    }

    /// Sends the current roster and catalog to one connection. New
    /// peers get this push right after their handshake.
    pub async fn push_state(&self, writer: &SharedWriter<ServerWriter>) -> Result<(), CoreError> {
        let roster = encode_roster(&self.roster.snapshot())?;
        let catalog = encode_catalog(&self.catalog.snapshot())?;
        let mut writer = writer.lock().await;
        write_frame(&mut *writer, Command::Roster, &roster).await?;
        write_frame(&mut *writer, Command::Catalog, &catalog).await?;
        Ok(())
    }

    /// Broadcasts the current roster to every connected peer.
    pub async fn broadcast_roster(&self) {
        match encode_roster(&self.roster.snapshot()) {
            Ok(payload) => {
                let frame = encode_frame(Command::Roster, &payload);
                self.writers.broadcast(&frame).await;
            }
            Err(e) => tracing::error!("Failed to encode roster: {}", e),
        }
    }

    /// Broadcasts the current catalog to every connected peer.
    pub async fn broadcast_catalog(&self) {
        match encode_catalog(&self.catalog.snapshot()) {
            Ok(payload) => {
                let frame = encode_frame(Command::Catalog, &payload);
                self.writers.broadcast(&frame).await;
            }
            Err(e) => tracing::error!("Failed to encode catalog: {}", e),
        }
    }
}

/// Sends a plaintext diagnostic to the connection that misbehaved.
async fn send_diagnostic(
    writer: &SharedWriter<ServerWriter>,
    text: &str,
) -> Result<(), CoreError> {
    let mut writer = writer.lock().await;
    write_frame(&mut *writer, Command::PlainText, text.as_bytes()).await?;
    Ok(())
}

/// Consumes the frame occupying the payload slot of a rejected
/// transfer, realigning the stream even when the sender mis-sequenced
/// that frame too.
async fn consume_rejected_payload(
    reader: &mut ServerReader,
    writer: &SharedWriter<ServerWriter>,
) -> Result<(), CoreError> {
    match discard_payload_frame(reader).await {
        Ok(discarded) => {
            tracing::debug!("Discarded {} rejected payload bytes", discarded);
            Ok(())
        }
        Err(CoreError::Protocol(ProtocolError::UnexpectedCommand { got, length, .. })) => {
            absorb_missequenced_frame(reader, writer, got, length).await
        }
        Err(e) => Err(e),
    }
}

/// Answers a client-sent `Roster` frame with a fresh roster push.
/// The payload, if any, is drained and ignored.
pub struct RosterRequestHandler {
    pub state: Arc<ServerState>,
}

impl FrameHandler<ServerReader, ServerWriter> for RosterRequestHandler {
    fn handle<'a>(
        &'a self,
        header: FrameHeader,
        reader: &'a mut ServerReader,
        writer: &'a SharedWriter<ServerWriter>,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            peerlink_protocol::drain_payload(reader, header.length).await?;
            let roster = encode_roster(&self.state.roster.snapshot())?;
            let mut writer = writer.lock().await;
            write_frame(&mut *writer, Command::Roster, &roster).await?;
            Ok(())
        })
    }
}

/// Receives an upload announced by a `FileParameters` frame.
pub struct UploadHandler {
    pub state: Arc<ServerState>,
}

impl FrameHandler<ServerReader, ServerWriter> for UploadHandler {
    fn handle<'a>(
        &'a self,
        header: FrameHeader,
        reader: &'a mut ServerReader,
        writer: &'a SharedWriter<ServerWriter>,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let payload = read_payload(reader, header.length).await?;

            // A sender that announced a transfer has already committed
            // the payload frame, so rejections must still consume it.
            let params = match TransferParams::parse(&payload) {
                Ok(params) => params,
                Err(e) => {
                    let diagnostic = format!("upload rejected: {}", e);
                    tracing::warn!("{}", diagnostic);
                    send_diagnostic(writer, &diagnostic).await?;
                    return consume_rejected_payload(reader, writer).await;
                }
            };

            if let Err(e) = resolve_under_root(self.state.catalog.root(), &params.name) {
                let diagnostic = format!("upload rejected: {}", e);
                tracing::warn!("{}", diagnostic);
                send_diagnostic(writer, &diagnostic).await?;
                return consume_rejected_payload(reader, writer).await;
            }

            // A wrong command in the payload slot aborts this upload,
            // not the connection: the offending frame is drained and
            // the sender told what went wrong.
            match receive_file(reader, &params, self.state.catalog.root(), &self.state.events)
                .await
            {
                Ok(_) => {
                    self.state.catalog.rescan()?;
                    self.state.broadcast_catalog().await;
                    Ok(())
                }
                Err(CoreError::Protocol(ProtocolError::UnexpectedCommand {
                    got, length, ..
                })) => absorb_missequenced_frame(reader, writer, got, length).await,
                Err(e) => Err(e),
            }
        })
    }
}

/// Streams a shared file back to the requesting peer.
pub struct RequestFileHandler {
    pub state: Arc<ServerState>,
}

impl FrameHandler<ServerReader, ServerWriter> for RequestFileHandler {
    fn handle<'a>(
        &'a self,
        header: FrameHeader,
        reader: &'a mut ServerReader,
        writer: &'a SharedWriter<ServerWriter>,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let payload = read_payload(reader, header.length).await?;
            let name = std::str::from_utf8(&payload)
                .map_err(|_| ProtocolError::InvalidUtf8)?
                .to_string();

            if !self.state.catalog.contains(&name) {
                let diagnostic = format!("no such file: '{}'", name);
                tracing::warn!("{}", diagnostic);
                send_diagnostic(writer, &diagnostic).await?;
                return Ok(());
            }

            let path = match self.state.catalog.resolve(&name) {
                Ok(path) => path,
                Err(e) => {
                    let diagnostic = format!("request rejected: {}", e);
                    tracing::warn!("{}", diagnostic);
                    send_diagnostic(writer, &diagnostic).await?;
                    return Ok(());
                }
            };

            // The transfer holds the writer for its whole duration;
            // broadcasts for this peer queue up behind it.
            let mut writer = writer.lock().await;
            let sent = send_file(&mut *writer, &path, &name).await?;
            tracing::info!("Served '{}' ({} bytes)", name, sent);
            Ok(())
        })
    }
}

/// Deletes a shared file and re-announces the catalog.
pub struct DeleteFileHandler {
    pub state: Arc<ServerState>,
}

impl FrameHandler<ServerReader, ServerWriter> for DeleteFileHandler {
    fn handle<'a>(
        &'a self,
        header: FrameHeader,
        reader: &'a mut ServerReader,
        writer: &'a SharedWriter<ServerWriter>,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let payload = read_payload(reader, header.length).await?;
            let name = std::str::from_utf8(&payload)
                .map_err(|_| ProtocolError::InvalidUtf8)?
                .to_string();

            match self.state.catalog.delete(&name) {
                Ok(_) => {
                    tracing::info!("Deleted '{}'", name);
                    self.state.broadcast_catalog().await;
                }
                Err(e) => {
                    let diagnostic = format!("delete of '{}' rejected: {}", name, e);
                    tracing::warn!("{}", diagnostic);
                    send_diagnostic(writer, &diagnostic).await?;
                }
            }
            Ok(())
        })
    }
}
