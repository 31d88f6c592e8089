//! Chunked file streaming.
//!
//! A transfer is a parameters/payload frame pair: a `FileParameters`
//! frame carrying the destination name, then a `Payload` frame whose
//! length field is the exact file size, followed by that many raw
//! bytes. The 512 KiB chunking is a buffer size only; the receiver
//! sees one contiguous byte run, not per-chunk frames. There is no
//! checksum and no resumption: an interruption leaves a partial file
//! and the transfer is abandoned.

use crate::dispatch::SharedWriter;
use crate::error::CoreError;
use crate::events::{Event, EventSink};
use crate::path::resolve_under_root;
use peerlink_protocol::{
    read_header, write_frame, Command, FrameHeader, ProtocolError, TransferParams,
    FILE_CHUNK_SIZE, MAX_MESSAGE_PAYLOAD,
};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Streams a local file onto the wire as a parameters/payload pair.
///
/// The caller holds the connection's writer for the whole call, so no
/// other frame can interleave with the file bytes.
pub async fn send_file<W>(writer: &mut W, path: &Path, remote_name: &str) -> Result<u64, CoreError>
where
    W: AsyncWrite + Unpin,
{
    let size = tokio::fs::metadata(path).await?.len();
    let params = TransferParams::new(remote_name).with_size(size);
    write_frame(writer, Command::FileParameters, &params.encode()).await?;

    // Payload header, then the raw bytes.
    writer
        .write_all(&FrameHeader::new(Command::Payload, size).encode())
        .await?;

    let mut file = File::open(path).await?;
    copy_file_bytes(&mut file, writer, size, path).await?;
    writer.flush().await?;

    tracing::debug!("Sent {} ({} bytes) as '{}'", path.display(), size, remote_name);
    Ok(size)
}

/// Pushes exactly `size` bytes of `file` onto the wire.
///
/// Reads are capped to the declared remainder, so a file that grows
/// after its size was measured cannot push extra bytes and desync
/// every later frame. A file that shrinks is unrecoverable: the
/// declared length is already committed.
async fn copy_file_bytes<W>(
    file: &mut File,
    writer: &mut W,
    size: u64,
    path: &Path,
) -> Result<(), CoreError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; FILE_CHUNK_SIZE];
    let mut sent = 0u64;
    while sent < size {
        let take = (size - sent).min(FILE_CHUNK_SIZE as u64) as usize;
        let n = file.read(&mut buf[..take]).await?;
        if n == 0 {
            return Err(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{} truncated during send", path.display()),
            )));
        }
        writer.write_all(&buf[..n]).await?;
        sent += n as u64;
    }
    Ok(())
}

/// Receives the payload announced by a `FileParameters` frame.
///
/// The destination is validated against `root` before anything touches
/// the filesystem. The next frame on the stream must be `Payload`;
/// its bytes are written chunk-by-chunk with a progress observation
/// after every chunk. On error the partial file is left in place and
/// a failed completion notification fires.
pub async fn receive_file<R>(
    reader: &mut R,
    params: &TransferParams,
    root: &Path,
    events: &dyn EventSink,
) -> Result<PathBuf, CoreError>
where
    R: AsyncRead + Unpin,
{
    let dest = resolve_under_root(root, &params.name)?;

    let header = read_header(reader).await?;
    if header.command() != Some(Command::Payload) {
        return Err(ProtocolError::UnexpectedCommand {
            expected: Command::Payload,
            got: header.command,
            length: header.length,
        }
        .into());
    }

    events.emit(Event::DownloadStarted {
        name: params.name.clone(),
    });
    match copy_payload(reader, &dest, header.length, &params.name, events).await {
        Ok(()) => {
            tracing::info!("Received '{}' ({} bytes)", params.name, header.length);
            events.emit(Event::DownloadFinished {
                name: params.name.clone(),
                success: true,
            });
            Ok(dest)
        }
        Err(err) => {
            events.emit(Event::DownloadFinished {
                name: params.name.clone(),
                success: false,
            });
            Err(err)
        }
    }
}

/// Consumes the `Payload` frame that follows a rejected
/// `FileParameters` frame.
///
/// The sender has already committed the frame pair to the wire, so the
/// rejected bytes must still leave the stream or every later frame on
/// this connection is misread. Returns the number of bytes discarded.
pub async fn discard_payload_frame<R>(reader: &mut R) -> Result<u64, CoreError>
where
    R: AsyncRead + Unpin,
{
    let header = read_header(reader).await?;
    if header.command() != Some(Command::Payload) {
        return Err(ProtocolError::UnexpectedCommand {
            expected: Command::Payload,
            got: header.command,
            length: header.length,
        }
        .into());
    }
    peerlink_protocol::drain_payload(reader, header.length).await?;
    Ok(header.length)
}

/// Recovers the session after a well-formed frame arrived where
/// `Payload` was required.
///
/// The sender gets a plaintext diagnostic and the mis-sequenced
/// frame's declared payload is drained, leaving the stream aligned
/// for the next frame. A declared length past the generic ceiling
/// cannot be trusted enough to drain; that connection is torn down.
pub async fn absorb_missequenced_frame<R, W>(
    reader: &mut R,
    writer: &SharedWriter<W>,
    got: u8,
    length: u64,
) -> Result<(), CoreError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let diagnostic = format!(
        "transfer aborted: expected payload frame, got command {:#04x}",
        got
    );
    tracing::warn!("{}", diagnostic);
    if length > MAX_MESSAGE_PAYLOAD {
        return Err(CoreError::ProtocolViolation(diagnostic));
    }
    {
        let mut writer = writer.lock().await;
        write_frame(&mut *writer, Command::PlainText, diagnostic.as_bytes()).await?;
    }
    peerlink_protocol::drain_payload(reader, length).await?;
    Ok(())
}

async fn copy_payload<R>(
    reader: &mut R,
    dest: &Path,
    total: u64,
    name: &str,
    events: &dyn EventSink,
) -> Result<(), CoreError>
where
    R: AsyncRead + Unpin,
{
    let mut file = File::create(dest).await?;
    let mut buf = vec![0u8; FILE_CHUNK_SIZE];
    let mut received = 0u64;

    if total == 0 {
        events.emit(Event::DownloadProgress {
            name: name.to_string(),
            percent: 100.0,
        });
    }
    while received < total {
        let take = (total - received).min(FILE_CHUNK_SIZE as u64) as usize;
        reader
            .read_exact(&mut buf[..take])
            .await
            .map_err(ProtocolError::from_read_error)?;
        file.write_all(&buf[..take]).await?;
        received += take as u64;
        events.emit(Event::DownloadProgress {
            name: name.to_string(),
            percent: (received as f64 / total as f64) * 100.0,
        });
    }
    file.flush().await?;
    Ok(())
}
