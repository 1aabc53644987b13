//! The length-prefixed wire protocol a signal worker speaks.
//!
//! ```text
//! client→server:  [4 bytes length, big-endian unsigned][length bytes UTF-8 JSON payload]
//! server→client:  [1 byte ACK=0x01][4 bytes length, big-endian unsigned][length bytes JSON]
//! ```
//!
//! Pure codec functions over any `AsyncRead + AsyncWrite`, independent
//! of how the connection was established (abstract socket, path
//! socket, or an in-memory duplex pipe in tests).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{SignalError, SignalResult};

pub const ACK: u8 = 0x01;
const CHUNK_SIZE: usize = 4096;

/// Write one length-prefixed JSON frame, in `CHUNK_SIZE` writes.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> SignalResult<()> {
    write_length_prefix(writer, payload.len() as u32).await?;
    write_body(writer, payload).await
}

/// Write just the 4-byte big-endian length prefix, with no body. The
/// evaluate handshake (§4.3) waits for an ACK after this write before
/// sending the body — a plain `write_frame` would send both in one
/// shot and never give the signal a chance to ack the length alone.
pub async fn write_length_prefix<W: AsyncWrite + Unpin>(writer: &mut W, len: u32) -> SignalResult<()> {
    writer.write_all(&len.to_be_bytes()).await.map_err(|e| SignalError::Connection(e.to_string()))
}

/// Write a payload body in `CHUNK_SIZE` writes, with no length prefix.
pub async fn write_body<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> SignalResult<()> {
    for chunk in payload.chunks(CHUNK_SIZE) {
        writer.write_all(chunk).await.map_err(|e| SignalError::Connection(e.to_string()))?;
    }
    Ok(())
}

/// Read one length-prefixed JSON frame (no leading ACK byte).
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> SignalResult<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await.map_err(|e| SignalError::Connection(e.to_string()))?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.map_err(|e| SignalError::Connection(e.to_string()))?;
    Ok(buf)
}

/// Read a single ACK byte, failing if it doesn't match [`ACK`].
pub async fn read_ack<R: AsyncRead + Unpin>(reader: &mut R) -> SignalResult<()> {
    let mut ack = [0u8; 1];
    reader.read_exact(&mut ack).await.map_err(|e| SignalError::Connection(e.to_string()))?;
    if ack[0] != ACK {
        return Err(SignalError::Connection(format!("expected ACK byte 0x{ACK:02x}, got 0x{:02x}", ack[0])));
    }
    Ok(())
}

/// Read a server response that begins with an ACK byte immediately
/// followed by a length-prefixed JSON frame, handling the case where
/// the underlying stream coalesces the ACK and the start of the frame
/// into a single read. A naive reader that expects the ACK alone in
/// its own read would deadlock on a coalesced response.
pub async fn read_ack_and_frame<R: AsyncRead + Unpin>(reader: &mut R) -> SignalResult<Vec<u8>> {
    let mut first = vec![0u8; CHUNK_SIZE];
    let n = reader.read(&mut first).await.map_err(|e| SignalError::Connection(e.to_string()))?;
    if n == 0 {
        return Err(SignalError::Connection("connection closed while waiting for ACK".into()));
    }
    first.truncate(n);

    if first[0] != ACK {
        return Err(SignalError::Connection(format!("expected ACK byte 0x{ACK:02x}, got 0x{:02x}", first[0])));
    }

    let rest = if n > 1 { first[1..].to_vec() } else { Vec::new() };
    read_framed_body(reader, rest).await
}

/// Parse a length-prefixed frame where `prefetched` bytes have
/// already been read off the stream (possibly none, possibly the
/// whole frame).
async fn read_framed_body<R: AsyncRead + Unpin>(reader: &mut R, mut prefetched: Vec<u8>) -> SignalResult<Vec<u8>> {
    while prefetched.len() < 4 {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).await.map_err(|e| SignalError::Connection(e.to_string()))?;
        prefetched.push(byte[0]);
    }
    let len = u32::from_be_bytes(prefetched[0..4].try_into().unwrap()) as usize;
    let mut body = prefetched[4..].to_vec();
    while body.len() < len {
        let mut buf = vec![0u8; (len - body.len()).min(CHUNK_SIZE)];
        let n = reader.read(&mut buf).await.map_err(|e| SignalError::Connection(e.to_string()))?;
        if n == 0 {
            return Err(SignalError::Connection("connection closed mid-frame".into()));
        }
        body.extend_from_slice(&buf[..n]);
    }
    Ok(body)
}
