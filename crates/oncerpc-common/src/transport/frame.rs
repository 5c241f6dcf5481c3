//! Length-prefixed framing over an async byte stream.
//!
//! Wire format: `[4-byte length as u32 big-endian] + [payload]`. The payload
//! size is capped at [`MAX_FRAME_SIZE`] to bound allocations driven by remote
//! input. The protocol itself is payload-size-agnostic; a large frame only
//! widens the window in which a partial transport failure can occur, which
//! the resend protocol absorbs.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, RpcError};

/// Maximum frame payload (100 MB).
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Writes one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<()> {
    let len = data.len() as u32;

    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| map_io_error(e, "writing length prefix"))?;
    writer
        .write_all(data)
        .await
        .map_err(|e| map_io_error(e, "writing frame payload"))?;
    writer
        .flush()
        .await
        .map_err(|e| map_io_error(e, "flushing frame"))?;

    Ok(())
}

/// Reads one length-prefixed frame.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly before a
/// length prefix; EOF in the middle of a frame is a transport failure.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(map_io_error(e, "reading length prefix")),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(RpcError::Decode(format!(
            "frame too large: {} bytes (max {} bytes)",
            len, MAX_FRAME_SIZE
        )));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| map_io_error(e, "reading frame payload"))?;

    Ok(Some(buf))
}

/// Folds I/O errors into the transport taxonomy.
///
/// Connection-level failures become `Transport` so the resend loop treats
/// them as retryable; anything else stays an `Io`.
fn map_io_error(err: std::io::Error, context: &str) -> RpcError {
    match err.kind() {
        std::io::ErrorKind::UnexpectedEof
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected => {
            RpcError::Transport(format!("{context}: connection lost ({err})"))
        }
        _ => RpcError::Io(err),
    }
}
