//! Transport layer for supervisor ↔ worker communication.
//!
//! Provides the `Transport` trait, length-prefixed JSON framing functions,
//! and the parent-side `StdioPipeTransport` used to drive worker processes.

pub mod protocol;
pub mod stdio_pipe;

pub use protocol::{generate_request_id, RequestEnvelope, WorkerResponse};
pub use stdio_pipe::StdioPipeTransport;

use anyhow::Result;
use async_trait::async_trait;

/// Maximum message size (64 MB). Safety valve against malformed frames.
const MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024;

/// Abstraction over supervisor ↔ worker communication channels.
///
/// The supervisor itself lives outside this crate; it works against this
/// interface, and the integration tests use it to drive real workers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the response.
    ///
    /// Access is mutex-guarded internally — concurrent callers serialize.
    async fn request(&self, req: &RequestEnvelope) -> Result<WorkerResponse>;

    /// Shut down the transport and the underlying worker process.
    async fn shutdown(&self) -> Result<()>;

    /// Check whether the underlying worker process is still alive.
    fn is_alive(&self) -> bool;
}

/// Write a length-prefixed message to a writer.
///
/// Format: [4-byte big-endian length][payload bytes]
pub async fn send_message<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| anyhow::anyhow!("Message too large: {} bytes", payload.len()))?;
    anyhow::ensure!(
        len <= MAX_MESSAGE_SIZE,
        "Message exceeds max size: {len} > {MAX_MESSAGE_SIZE}"
    );

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a length-prefixed message from a reader.
///
/// Returns the raw payload bytes. Enforces `MAX_MESSAGE_SIZE`.
pub async fn recv_message<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);

    anyhow::ensure!(
        len <= MAX_MESSAGE_SIZE,
        "Message exceeds max size: {len} > {MAX_MESSAGE_SIZE}"
    );

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}
