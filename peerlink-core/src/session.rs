//! Connection session loop.
//!
//! Every socket, however it was established, runs the same state
//! machine: Handshaking -> Serving -> Closed. The first frame on a
//! server-accepted socket must be a Handshake carrying the remote
//! party's descriptor; a client-initiated socket sends that same frame
//! proactively and then serves. Serving is a loop of decode-header /
//! dispatch until a read fails, at which point the caller removes the
//! peer from its roster and broadcasts a fresh snapshot.

use crate::dispatch::{DispatchTable, SharedWriter};
use crate::error::CoreError;
use peerlink_protocol::{
    read_header, read_payload, write_frame, Command, FrameHeader, PeerDescriptor,
    MAX_CONTROL_PAYLOAD, MAX_MESSAGE_PAYLOAD,
};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Session tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Bound on the wait for the first frame, so a hostile or buggy
    /// peer cannot hold a session task forever.
    pub handshake_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Declared-length ceiling for a frame.
///
/// Control frames, roster and catalog snapshots included, are capped
/// at 1 MiB; everything else at 16 MiB. File bytes never hit this
/// check: their `Payload` frame is consumed inside the
/// `FileParameters` handler, not dispatched top-level.
fn ceiling_for(header: &FrameHeader) -> u64 {
    match header.command() {
        Some(
            Command::Handshake
            | Command::Roster
            | Command::Catalog
            | Command::FileParameters
            | Command::RequestFile
            | Command::DeleteFile
            | Command::PlainText,
        ) => MAX_CONTROL_PAYLOAD,
        _ => MAX_MESSAGE_PAYLOAD,
    }
}

/// Reads the handshake frame that opens a server-accepted session.
///
/// A malformed or oversized handshake aborts the session before it
/// ever enters serving; there is nothing to recover.
pub async fn read_handshake<R>(
    reader: &mut R,
    config: &SessionConfig,
) -> Result<PeerDescriptor, CoreError>
where
    R: AsyncRead + Unpin,
{
    let timeout = config.handshake_timeout;
    tokio::time::timeout(timeout, async {
        let header = read_header(reader).await?;
        if header.command() != Some(Command::Handshake) {
            return Err(CoreError::ProtocolViolation(format!(
                "expected handshake, got command {:#04x}",
                header.command
            )));
        }
        if header.length > MAX_CONTROL_PAYLOAD {
            return Err(CoreError::ProtocolViolation(format!(
                "handshake payload of {} bytes exceeds {} byte ceiling",
                header.length, MAX_CONTROL_PAYLOAD
            )));
        }
        let payload = read_payload(reader, header.length).await?;
        let descriptor: PeerDescriptor = serde_json::from_slice(&payload)?;
        Ok(descriptor)
    })
    .await
    .map_err(|_| CoreError::HandshakeTimeout(timeout))?
}

/// Sends this participant's descriptor as the opening frame of a
/// client-initiated connection.
pub async fn send_handshake<W>(
    writer: &mut W,
    descriptor: &PeerDescriptor,
) -> Result<(), CoreError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(descriptor)?;
    write_frame(writer, Command::Handshake, &payload).await?;
    Ok(())
}

/// Runs the serving loop until a read fails.
///
/// Returns `Err` on exit: a clean peer departure surfaces as a
/// disconnect error (check [`CoreError::is_disconnect`]); anything
/// else is a genuine failure. An oversized declared length gets a
/// plaintext diagnostic and tears the session down rather than
/// reading or draining a length the sender was required to cap.
pub async fn serve<R, W>(
    reader: &mut R,
    writer: &SharedWriter<W>,
    table: &DispatchTable<R, W>,
) -> Result<(), CoreError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let header = read_header(reader).await?;

        let ceiling = ceiling_for(&header);
        if header.length > ceiling {
            let diagnostic = format!(
                "protocol violation: declared length {} exceeds {} byte ceiling for command {:#04x}",
                header.length, ceiling, header.command
            );
            tracing::warn!("{}", diagnostic);
            {
                let mut writer = writer.lock().await;
                write_frame(&mut *writer, Command::PlainText, diagnostic.as_bytes()).await?;
            }
            return Err(CoreError::ProtocolViolation(diagnostic));
        }

        table.dispatch(header, reader, writer).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{FrameHandler, HandlerFuture};
    use bytes::{BufMut, BytesMut};
    use peerlink_protocol::encode_frame;
    use std::sync::Arc;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn test_handshake_roundtrip() {
        let (mut tx, mut rx) = tokio::io::duplex(4096);
        let descriptor = PeerDescriptor::new("10.0.0.5", 4000, "alice");

        send_handshake(&mut tx, &descriptor).await.unwrap();
        let received = read_handshake(&mut rx, &SessionConfig::default())
            .await
            .unwrap();
        assert_eq!(received, descriptor);
    }

    #[tokio::test]
    async fn test_handshake_wrong_first_command() {
        let (mut tx, mut rx) = tokio::io::duplex(4096);
        tx.write_all(&encode_frame(Command::PlainText, b"hi"))
            .await
            .unwrap();

        let err = read_handshake(&mut rx, &SessionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_handshake_oversized() {
        let (mut tx, mut rx) = tokio::io::duplex(4096);
        let mut wire = BytesMut::new();
        wire.put_u8(Command::Handshake.to_wire());
        wire.put_u64_le(MAX_CONTROL_PAYLOAD + 1);
        tx.write_all(&wire).await.unwrap();

        let err = read_handshake(&mut rx, &SessionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (_tx, mut rx) = tokio::io::duplex(64);
        let config = SessionConfig {
            handshake_timeout: Duration::from_millis(20),
        };

        let err = read_handshake(&mut rx, &config).await.unwrap_err();
        assert!(matches!(err, CoreError::HandshakeTimeout(_)));
    }

    struct CountFrames {
        count: Arc<std::sync::Mutex<usize>>,
    }

    impl FrameHandler<DuplexStream, DuplexStream> for CountFrames {
        fn handle<'a>(
            &'a self,
            header: FrameHeader,
            reader: &'a mut DuplexStream,
            _writer: &'a SharedWriter<DuplexStream>,
        ) -> HandlerFuture<'a> {
            Box::pin(async move {
                read_payload(reader, header.length).await?;
                *self.count.lock().unwrap() += 1;
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_serve_until_disconnect() {
        let (mut tx, mut rx) = tokio::io::duplex(4096);
        let (writer_side, _keep) = tokio::io::duplex(4096);
        let writer: SharedWriter<DuplexStream> = Arc::new(Mutex::new(writer_side));

        let count = Arc::new(std::sync::Mutex::new(0));
        let mut table = DispatchTable::new();
        table.register(
            Command::PlainText,
            Arc::new(CountFrames {
                count: count.clone(),
            }),
        );

        tx.write_all(&encode_frame(Command::PlainText, b"one"))
            .await
            .unwrap();
        tx.write_all(&encode_frame(Command::PlainText, b"two"))
            .await
            .unwrap();
        drop(tx);

        let err = serve(&mut rx, &writer, &table).await.unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_oversized_length_diagnostic_and_teardown() {
        let (mut tx, mut rx) = tokio::io::duplex(4096);
        let (writer_side, mut diag_rx) = tokio::io::duplex(4096);
        let writer: SharedWriter<DuplexStream> = Arc::new(Mutex::new(writer_side));
        let table: DispatchTable<DuplexStream, DuplexStream> = DispatchTable::new();

        // Declared length of 2^40 on a control command: no allocation,
        // no read, diagnostic reply, session over.
        let mut wire = BytesMut::new();
        wire.put_u8(Command::RequestFile.to_wire());
        wire.put_u64_le(1 << 40);
        tx.write_all(&wire).await.unwrap();

        let err = serve(&mut rx, &writer, &table).await.unwrap_err();
        assert!(matches!(err, CoreError::ProtocolViolation(_)));

        let header = read_header(&mut diag_rx).await.unwrap();
        assert_eq!(header.command(), Some(Command::PlainText));
        let payload = read_payload(&mut diag_rx, header.length).await.unwrap();
        assert!(std::str::from_utf8(&payload)
            .unwrap()
            .contains("protocol violation"));
    }

    #[tokio::test]
    async fn test_roster_and_catalog_use_control_ceiling() {
        // A length between the control and generic ceilings must be
        // rejected for snapshot frames, not quietly consumed.
        for command in [Command::Roster, Command::Catalog] {
            let (mut tx, mut rx) = tokio::io::duplex(4096);
            let (writer_side, mut diag_rx) = tokio::io::duplex(4096);
            let writer: SharedWriter<DuplexStream> = Arc::new(Mutex::new(writer_side));
            let table: DispatchTable<DuplexStream, DuplexStream> = DispatchTable::new();

            let mut wire = BytesMut::new();
            wire.put_u8(command.to_wire());
            wire.put_u64_le(2 * 1024 * 1024);
            tx.write_all(&wire).await.unwrap();

            let err = serve(&mut rx, &writer, &table).await.unwrap_err();
            assert!(matches!(err, CoreError::ProtocolViolation(_)));

            let header = read_header(&mut diag_rx).await.unwrap();
            assert_eq!(header.command(), Some(Command::PlainText));
        }
    }
}
