//! simlink frame codec (encode/decode)
//!
//! Bodies are MessagePack with named fields. Every message type goes through
//! the same serde path; only the header's type byte differs.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Error, Frame, FrameHeader, HEADER_SIZE, MAX_MESSAGE_SIZE, MessageType, Result};

/// Encode a frame carrying `payload`
///
/// # Format
///
/// ```text
/// [HEADER (8 bytes)] [BODY (0..=1 MiB, MessagePack)]
/// ```
///
/// # Errors
///
/// Returns [`Error::PayloadTooLarge`] if the serialized body exceeds
/// [`MAX_MESSAGE_SIZE`]. Nothing is returned to write in that case.
pub fn encode<T>(msg_type: MessageType, payload: &T) -> Result<Bytes>
where
    T: Serialize + ?Sized,
{
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + 256);
    buf.put_bytes(0, HEADER_SIZE);

    let mut writer = buf.writer();
    rmp_serde::encode::write_named(&mut writer, payload)?;
    let mut buf = writer.into_inner();

    let body_len = buf.len() - HEADER_SIZE;
    if body_len > MAX_MESSAGE_SIZE {
        return Err(Error::PayloadTooLarge {
            size: body_len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    // body_len <= MAX_MESSAGE_SIZE, which fits in u32
    let header = FrameHeader::new(msg_type, body_len as u32);
    buf[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

    Ok(buf.freeze())
}

/// Encode a header-only frame with a zero-length body
#[must_use]
pub fn encode_empty(msg_type: MessageType) -> Bytes {
    Bytes::copy_from_slice(&FrameHeader::new(msg_type, 0).to_bytes())
}

/// Decode one frame from the front of `bytes`
///
/// # Errors
///
/// Returns an error if:
/// - Buffer is shorter than the header or the announced body
/// - Protocol version differs from [`super::PROTOCOL_VERSION`]
/// - Announced body length exceeds [`MAX_MESSAGE_SIZE`]
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    let header = FrameHeader::from_bytes(bytes)?;

    let total_size = HEADER_SIZE + header.body_len() as usize;
    if bytes.len() < total_size {
        return Err(Error::BufferTooSmall {
            needed: total_size,
            got: bytes.len(),
        });
    }

    let body = Bytes::copy_from_slice(&bytes[HEADER_SIZE..total_size]);
    Ok(Frame::from_parts(header, body))
}

/// Read one frame from a stream.
///
/// The header is validated before the body buffer is allocated, so a corrupt
/// length never causes a large allocation or read.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut raw = [0u8; HEADER_SIZE];
    reader.read_exact(&mut raw).await?;
    let header = FrameHeader::from_bytes(&raw)?;

    let mut body = BytesMut::zeroed(header.body_len() as usize);
    reader.read_exact(&mut body).await?;

    Ok(Frame::from_parts(header, body.freeze()))
}

/// Write a pre-encoded frame and flush it.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}
