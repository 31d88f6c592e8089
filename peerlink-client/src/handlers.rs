//! Client-side frame handlers.
//!
//! The server pushes three kinds of frames at a client: roster
//! snapshots, catalog snapshots, and file transfers. Snapshots
//! replace local caches wholesale; a snapshot that fails to decode is
//! logged and dropped, keeping the previous cache intact. The same
//! handlers serve frames arriving over direct peer connections.

use crate::config::ClientConfig;
use peerlink_core::path::resolve_under_root;
use peerlink_core::{
    absorb_missequenced_frame, discard_payload_frame, receive_file, CatalogCache, CoreError,
    DispatchTable, Event, EventSink, FrameHandler, HandlerFuture, LogPlainText, RosterStore,
    SharedWriter,
};
use peerlink_protocol::{
    decode_catalog, decode_roster, read_payload, write_frame, Command, FrameHeader,
    PeerDescriptor, ProtocolError, TransferParams,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Read half of a client connection.
pub type ClientReader = BufReader<OwnedReadHalf>;

/// Write half of a client connection.
pub type ClientWriter = OwnedWriteHalf;

/// State shared by the server connection and every peer connection.
pub struct ClientState {
    /// Cached view of the server's roster.
    pub roster: RosterStore,
    /// Cached view of the server's catalog.
    pub catalog: CatalogCache,
    /// Where incoming files land.
    pub download_dir: PathBuf,
    /// This client's own listening port, for roster self-suppression.
    pub own_port: u16,
    events: Arc<dyn EventSink>,
}

impl ClientState {
    pub fn new(config: &ClientConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            roster: RosterStore::new(),
            catalog: CatalogCache::new(),
            download_dir: config.download_dir.clone(),
            own_port: config.listen_port,
            events,
        }
    }

    pub fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }
}

/// Wires the client's handler set. The same table serves the server
/// connection and every direct peer connection.
pub fn build_dispatch(state: &Arc<ClientState>) -> DispatchTable<ClientReader, ClientWriter> {
    let mut table = DispatchTable::new();
    table.register(
        Command::Roster,
        Arc::new(RosterHandler {
            state: state.clone(),
        }),
    );
    table.register(
        Command::Catalog,
        Arc::new(CatalogHandler {
            state: state.clone(),
        }),
    );
    table.register(
        Command::FileParameters,
        Arc::new(IncomingFileHandler {
            state: state.clone(),
        }),
    );
    table.register(Command::PlainText, Arc::new(LogPlainText));
    table
}

/// Applies pushed roster snapshots to the local cache.
pub struct RosterHandler {
    pub state: Arc<ClientState>,
}

impl FrameHandler<ClientReader, ClientWriter> for RosterHandler {
    fn handle<'a>(
        &'a self,
        header: FrameHeader,
        reader: &'a mut ClientReader,
        _writer: &'a SharedWriter<ClientWriter>,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let payload = read_payload(reader, header.length).await?;
            let snapshot: Vec<PeerDescriptor> = match decode_roster(&payload) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!("Discarding malformed roster snapshot: {}", e);
                    return Ok(());
                }
            };

            let diff = self.state.roster.apply_snapshot(snapshot, self.state.own_port);
            for peer in diff.added {
                self.state.events().emit(Event::PeerAdded(peer));
            }
            for peer in diff.removed {
                self.state.events().emit(Event::PeerRemoved(peer));
            }
            Ok(())
        })
    }
}

/// Applies pushed catalog snapshots to the local cache.
pub struct CatalogHandler {
    pub state: Arc<ClientState>,
}

impl FrameHandler<ClientReader, ClientWriter> for CatalogHandler {
    fn handle<'a>(
        &'a self,
        header: FrameHeader,
        reader: &'a mut ClientReader,
        _writer: &'a SharedWriter<ClientWriter>,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let payload = read_payload(reader, header.length).await?;
            match decode_catalog(&payload) {
                Ok(entries) => self.state.catalog.replace(entries),
                Err(e) => tracing::warn!("Discarding malformed catalog snapshot: {}", e),
            }
            Ok(())
        })
    }
}

/// Receives a pushed file into the download directory.
pub struct IncomingFileHandler {
    pub state: Arc<ClientState>,
}

impl FrameHandler<ClientReader, ClientWriter> for IncomingFileHandler {
    fn handle<'a>(
        &'a self,
        header: FrameHeader,
        reader: &'a mut ClientReader,
        writer: &'a SharedWriter<ClientWriter>,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let payload = read_payload(reader, header.length).await?;

            let params = match TransferParams::parse(&payload) {
                Ok(params) => params,
                Err(e) => {
                    let diagnostic = format!("transfer rejected: {}", e);
                    tracing::warn!("{}", diagnostic);
                    reject_transfer(reader, writer, &diagnostic).await?;
                    return Ok(());
                }
            };

            if resolve_under_root(&self.state.download_dir, &params.name).is_err() {
                let diagnostic = format!(
                    "transfer rejected: '{}' escapes the download directory",
                    params.name
                );
                tracing::warn!("{}", diagnostic);
                reject_transfer(reader, writer, &diagnostic).await?;
                return Ok(());
            }

            // A wrong command in the payload slot aborts this transfer
            // only; the offending frame is drained and the sender told.
            match receive_file(
                reader,
                &params,
                &self.state.download_dir,
                self.state.events(),
            )
            .await
            {
                Ok(_) => Ok(()),
                Err(CoreError::Protocol(ProtocolError::UnexpectedCommand {
                    got, length, ..
                })) => absorb_missequenced_frame(reader, writer, got, length).await,
                Err(e) => Err(e),
            }
        })
    }
}

/// Replies with a diagnostic and consumes the committed payload frame,
/// realigning the stream even when the sender mis-sequenced that
/// frame too.
async fn reject_transfer(
    reader: &mut ClientReader,
    writer: &SharedWriter<ClientWriter>,
    diagnostic: &str,
) -> Result<(), CoreError> {
    {
        let mut writer = writer.lock().await;
        write_frame(&mut *writer, Command::PlainText, diagnostic.as_bytes()).await?;
    }
    match discard_payload_frame(reader).await {
        Ok(_) => Ok(()),
        Err(CoreError::Protocol(ProtocolError::UnexpectedCommand { got, length, .. })) => {
            absorb_missequenced_frame(reader, writer, got, length).await
        }
        Err(e) => Err(e),
    }
}
