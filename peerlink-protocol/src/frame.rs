//! Binary frame format.
//!
//! Frame layout (9 byte header + payload):
//!
//! ```text
//! +---------+----------------------+------------------+
//! | command | length               | payload          |
//! | 1 byte  | 8 bytes, little-end. | length bytes     |
//! +---------+----------------------+------------------+
//! ```
//!
//! The length is always known before any payload byte is consumed. A
//! handler that needs fewer structured fields than the length
//! advertises must still consume exactly `length` bytes, otherwise
//! every subsequent frame on the stream is misread.

use crate::command::Command;
use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the frame header in bytes (1 command + 8 length).
pub const FRAME_HEADER_SIZE: usize = 9;

/// A decoded frame header.
///
/// The command is kept as the raw wire byte so that frames carrying
/// identifiers this build does not know can still be drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw command byte.
    pub command: u8,
    /// Declared payload length.
    pub length: u64,
}

impl FrameHeader {
    pub fn new(command: Command, length: u64) -> Self {
        Self {
            command: command.to_wire(),
            length,
        }
    }

    /// Returns the decoded command, or `None` for unknown identifiers.
    pub fn command(&self) -> Option<Command> {
        Command::from_wire(self.command)
    }

    /// Encodes the header into its 9-byte wire form.
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0] = self.command;
        buf[1..9].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// Decodes a header from a 9-byte wire buffer.
    pub fn decode(buf: &[u8; FRAME_HEADER_SIZE]) -> Self {
        let length = u64::from_le_bytes(buf[1..9].try_into().expect("slice is 8 bytes"));
        Self {
            command: buf[0],
            length,
        }
    }
}

/// Encodes a complete frame into a contiguous buffer.
pub fn encode_frame(command: Command, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u8(command.to_wire());
    buf.put_u64_le(payload.len() as u64);
    buf.put_slice(payload);
    buf
}

/// Decodes one complete frame from a buffer.
///
/// Returns `None` if the buffer does not yet hold the full frame; the
/// buffer is only consumed when a complete frame is available.
pub fn decode_frame(buf: &mut BytesMut) -> Option<(FrameHeader, Bytes)> {
    if buf.len() < FRAME_HEADER_SIZE {
        return None;
    }
    let header = FrameHeader {
        command: buf[0],
        length: u64::from_le_bytes(buf[1..9].try_into().expect("slice is 8 bytes")),
    };
    let total = FRAME_HEADER_SIZE as u64 + header.length;
    if (buf.len() as u64) < total {
        return None;
    }
    buf.advance(FRAME_HEADER_SIZE);
    let payload = buf.split_to(header.length as usize).freeze();
    Some((header, payload))
}

/// Reads a frame header, blocking until 9 bytes are available.
///
/// A closed or reset stream surfaces as
/// [`ProtocolError::PeerDisconnected`], which callers treat as
/// terminal for the session.
pub async fn read_header<R>(reader: &mut R) -> Result<FrameHeader, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; FRAME_HEADER_SIZE];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(ProtocolError::from_read_error)?;
    Ok(FrameHeader::decode(&buf))
}

/// Reads exactly `length` payload bytes.
///
/// Callers are responsible for checking the declared length against
/// the appropriate ceiling before allocating.
pub async fn read_payload<R>(reader: &mut R, length: u64) -> Result<Bytes, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; length as usize];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(ProtocolError::from_read_error)?;
    Ok(Bytes::from(buf))
}

/// Reads and discards exactly `length` payload bytes.
///
/// Used for frames without a registered handler: the bytes must still
/// leave the stream or every subsequent frame is misaligned.
pub async fn drain_payload<R>(reader: &mut R, length: u64) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut remaining = length;
    let mut scratch = [0u8; 8192];
    while remaining > 0 {
        let take = remaining.min(scratch.len() as u64) as usize;
        reader
            .read_exact(&mut scratch[..take])
            .await
            .map_err(ProtocolError::from_read_error)?;
        remaining -= take as u64;
    }
    Ok(())
}

/// Writes a complete frame.
pub async fn write_frame<W>(
    writer: &mut W,
    command: Command,
    payload: &[u8],
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(command, payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_header_roundtrip() {
        let header = FrameHeader::new(Command::Roster, 42);
        let decoded = FrameHeader::decode(&header.encode());
        assert_eq!(decoded, header);
        assert_eq!(decoded.command(), Some(Command::Roster));
    }

    #[test]
    fn test_frame_roundtrip() {
        let payload = b"[{\"name\":\"alpha\",\"size\":10}]";
        let mut buf = encode_frame(Command::Catalog, payload);
        let (header, decoded) = decode_frame(&mut buf).unwrap();

        assert_eq!(header.command(), Some(Command::Catalog));
        assert_eq!(header.length, payload.len() as u64);
        assert_eq!(decoded.as_ref(), payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_length_is_little_endian_on_wire() {
        let buf = encode_frame(Command::PlainText, &[0u8; 3]);
        // Length 3 encoded little-endian directly after the command
        // byte, independent of host order.
        assert_eq!(&buf[1..9], &[3, 0, 0, 0, 0, 0, 0, 0]);
        let decoded = FrameHeader::decode(buf[..9].try_into().unwrap());
        assert_eq!(decoded.length, 3);
    }

    #[test]
    fn test_incomplete_frame() {
        let full = encode_frame(Command::Handshake, b"descriptor");

        // Partial header
        let mut buf = BytesMut::from(&full[..5]);
        assert!(decode_frame(&mut buf).is_none());
        assert_eq!(buf.len(), 5); // untouched

        // Header but short payload
        let mut buf = BytesMut::from(&full[..FRAME_HEADER_SIZE + 4]);
        assert!(decode_frame(&mut buf).is_none());
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let mut buf = encode_frame(Command::PlainText, b"hello");
        buf.extend_from_slice(&encode_frame(Command::PlainText, b"hi"));

        let (_, first) = decode_frame(&mut buf).unwrap();
        assert_eq!(first.as_ref(), b"hello");
        let (_, second) = decode_frame(&mut buf).unwrap();
        assert_eq!(second.as_ref(), b"hi");
        assert!(decode_frame(&mut buf).is_none());
    }

    #[test]
    fn test_unknown_command_still_decodes() {
        let mut buf = BytesMut::new();
        buf.put_u8(99);
        buf.put_u64_le(5);
        buf.put_slice(b"hello");

        let (header, payload) = decode_frame(&mut buf).unwrap();
        assert_eq!(header.command, 99);
        assert_eq!(header.command(), None);
        assert_eq!(payload.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_async_read_write() {
        let (mut a, mut b) = tokio::io::duplex(4096);

        write_frame(&mut a, Command::RequestFile, b"report.pdf")
            .await
            .unwrap();

        let header = read_header(&mut b).await.unwrap();
        assert_eq!(header.command(), Some(Command::RequestFile));
        let payload = read_payload(&mut b, header.length).await.unwrap();
        assert_eq!(payload.as_ref(), b"report.pdf");
    }

    #[tokio::test]
    async fn test_read_header_on_closed_stream() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);

        let err = read_header(&mut b).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_drain_keeps_stream_aligned() {
        let (mut a, mut b) = tokio::io::duplex(4096);

        // Unknown command frame followed by a known one.
        let mut wire = BytesMut::new();
        wire.put_u8(99);
        wire.put_u64_le(5);
        wire.put_slice(b"hello");
        wire.extend_from_slice(&encode_frame(Command::PlainText, b"hi"));
        tokio::io::AsyncWriteExt::write_all(&mut a, &wire)
            .await
            .unwrap();

        let header = read_header(&mut b).await.unwrap();
        assert_eq!(header.command(), None);
        drain_payload(&mut b, header.length).await.unwrap();

        let next = read_header(&mut b).await.unwrap();
        assert_eq!(next.command(), Some(Command::PlainText));
        let payload = read_payload(&mut b, next.length).await.unwrap();
        assert_eq!(payload.as_ref(), b"hi");
    }

    proptest! {
        #[test]
        fn prop_frame_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let mut buf = encode_frame(Command::Payload, &payload);
            let (header, decoded) = decode_frame(&mut buf).unwrap();
            prop_assert_eq!(header.command(), Some(Command::Payload));
            prop_assert_eq!(header.length, payload.len() as u64);
            prop_assert_eq!(decoded.as_ref(), &payload[..]);
        }

        #[test]
        fn prop_length_roundtrip(length in any::<u64>()) {
            let header = FrameHeader::new(Command::Payload, length);
            let decoded = FrameHeader::decode(&header.encode());
            prop_assert_eq!(decoded.length, length);
        }
    }
}
