//! Command dispatch.
//!
//! Each participant owns one table wired at startup: the server
//! registers upload/request/delete handlers, clients register
//! roster/catalog/download handlers. A handler owns the stream
//! exclusively until it returns and must consume exactly the declared
//! payload length, including any nested frames it expects.

use crate::error::CoreError;
use peerlink_protocol::{drain_payload, Command, FrameHeader};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

/// Write half of a connection, shared between the session's handlers
/// and broadcast senders. A file transfer holds the lock for its whole
/// duration, monopolizing the socket until it finishes.
pub type SharedWriter<W> = Arc<Mutex<W>>;

/// Future returned by a frame handler.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send + 'a>>;

/// Handler for one command's frames.
pub trait FrameHandler<R, W>: Send + Sync
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Handles one frame. `header.length` payload bytes must leave
    /// `reader` before this returns, or the stream desynchronizes.
    fn handle<'a>(
        &'a self,
        header: FrameHeader,
        reader: &'a mut R,
        writer: &'a SharedWriter<W>,
    ) -> HandlerFuture<'a>;
}

/// Mapping from command to handler.
pub struct DispatchTable<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    handlers: HashMap<Command, Arc<dyn FrameHandler<R, W>>>,
}

impl<R, W> DispatchTable<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for a command. Wiring happens once at
    /// startup; later registrations for the same command replace the
    /// earlier one.
    pub fn register(&mut self, command: Command, handler: Arc<dyn FrameHandler<R, W>>) {
        self.handlers.insert(command, handler);
    }

    pub fn is_registered(&self, command: Command) -> bool {
        self.handlers.contains_key(&command)
    }

    /// Dispatches one decoded header to its handler.
    ///
    /// Frames without a registered handler (including command bytes
    /// this build does not know) are drained so the next frame on the
    /// stream stays aligned.
    pub async fn dispatch(
        &self,
        header: FrameHeader,
        reader: &mut R,
        writer: &SharedWriter<W>,
    ) -> Result<(), CoreError> {
        let handler = header.command().and_then(|cmd| self.handlers.get(&cmd));
        match handler {
            Some(handler) => handler.handle(header, reader, writer).await,
            None => {
                tracing::debug!(
                    "No handler for command {:#04x}, draining {} bytes",
                    header.command,
                    header.length
                );
                drain_payload(reader, header.length).await?;
                Ok(())
            }
        }
    }
}

/// Handler that logs `PlainText` diagnostic frames from the remote
/// side. Registered by both roles.
pub struct LogPlainText;

impl<R, W> FrameHandler<R, W> for LogPlainText
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn handle<'a>(
        &'a self,
        header: FrameHeader,
        reader: &'a mut R,
        _writer: &'a SharedWriter<W>,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let payload = peerlink_protocol::read_payload(reader, header.length).await?;
            match std::str::from_utf8(&payload) {
                Ok(text) => tracing::warn!("Remote diagnostic: {}", text),
                Err(_) => tracing::warn!(
                    "Remote diagnostic with non-UTF-8 body ({} bytes)",
                    payload.len()
                ),
            }
            Ok(())
        })
    }
}

impl<R, W> Default for DispatchTable<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use peerlink_protocol::{encode_frame, read_header, read_payload};
    use tokio::io::{AsyncWriteExt, DuplexStream};

    struct CollectText {
        seen: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl FrameHandler<DuplexStream, DuplexStream> for CollectText {
        fn handle<'a>(
            &'a self,
            header: FrameHeader,
            reader: &'a mut DuplexStream,
            _writer: &'a SharedWriter<DuplexStream>,
        ) -> HandlerFuture<'a> {
            Box::pin(async move {
                let payload = read_payload(reader, header.length).await?;
                self.seen
                    .lock()
                    .unwrap()
                    .push(String::from_utf8(payload.to_vec()).unwrap());
                Ok(())
            })
        }
    }

    fn table_with_collector() -> (
        DispatchTable<DuplexStream, DuplexStream>,
        Arc<std::sync::Mutex<Vec<String>>>,
    ) {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut table = DispatchTable::new();
        table.register(Command::PlainText, Arc::new(CollectText { seen: seen.clone() }));
        (table, seen)
    }

    #[tokio::test]
    async fn test_dispatch_invokes_handler() {
        let (table, seen) = table_with_collector();
        let (mut tx, mut rx) = tokio::io::duplex(4096);
        let (writer_side, _keep) = tokio::io::duplex(4096);
        let writer: SharedWriter<DuplexStream> = Arc::new(Mutex::new(writer_side));

        tx.write_all(&encode_frame(Command::PlainText, b"hello"))
            .await
            .unwrap();

        let header = read_header(&mut rx).await.unwrap();
        table.dispatch(header, &mut rx, &writer).await.unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_unregistered_command_drained_keeps_alignment() {
        let (table, seen) = table_with_collector();
        let (mut tx, mut rx) = tokio::io::duplex(4096);
        let (writer_side, _keep) = tokio::io::duplex(4096);
        let writer: SharedWriter<DuplexStream> = Arc::new(Mutex::new(writer_side));

        // Command 99 has no handler; its payload must still leave the
        // stream so the PlainText frame after it dispatches correctly.
        let mut wire = BytesMut::new();
        wire.put_u8(99);
        wire.put_u64_le(5);
        wire.put_slice(b"hello");
        wire.extend_from_slice(&encode_frame(Command::PlainText, b"hi"));
        tx.write_all(&wire).await.unwrap();

        let header = read_header(&mut rx).await.unwrap();
        assert_eq!(header.command(), None);
        table.dispatch(header, &mut rx, &writer).await.unwrap();

        let header = read_header(&mut rx).await.unwrap();
        table.dispatch(header, &mut rx, &writer).await.unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["hi".to_string()]);
    }

    #[tokio::test]
    async fn test_known_but_unregistered_command_drained() {
        let (table, seen) = table_with_collector();
        let (mut tx, mut rx) = tokio::io::duplex(4096);
        let (writer_side, _keep) = tokio::io::duplex(4096);
        let writer: SharedWriter<DuplexStream> = Arc::new(Mutex::new(writer_side));

        assert!(!table.is_registered(Command::Roster));
        let mut wire = BytesMut::from(&encode_frame(Command::Roster, b"[]")[..]);
        wire.extend_from_slice(&encode_frame(Command::PlainText, b"after"));
        tx.write_all(&wire).await.unwrap();

        for _ in 0..2 {
            let header = read_header(&mut rx).await.unwrap();
            table.dispatch(header, &mut rx, &writer).await.unwrap();
        }
        assert_eq!(seen.lock().unwrap().as_slice(), ["after".to_string()]);
    }
}
