//! Bidirectional TCP relay
//!
//! Pumps bytes between the client connection and the target connection
//! after a successful CONNECT. Each direction reads into its own 8 KiB
//! buffer with an idle timeout applied per read and per write; when either
//! direction stops, both streams are dropped so the peer direction
//! terminates as well. EOF, timeout, and reset all count as normal
//! completion.

use crate::socks::consts::RELAY_BUFFER_SIZE;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

/// Relay data between `a` and `b` until either direction finishes.
pub async fn relay<A, B>(a: A, b: B, idle_timeout: Duration)
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);

    tokio::select! {
        bytes = pump(a_read, b_write, idle_timeout) => {
            debug!("client to target direction finished after {} bytes", bytes);
        }
        bytes = pump(b_read, a_write, idle_timeout) => {
            debug!("target to client direction finished after {} bytes", bytes);
        }
    }
    // Dropping the split halves closes both streams; the unfinished
    // direction is cancelled with them.
}

/// Copy one direction until EOF, error, or idle timeout. Returns the byte
/// count for logging.
async fn pump<R, W>(mut from: R, mut to: W, idle_timeout: Duration) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match timeout(idle_timeout, from.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(_)) | Err(_) => break,
        };

        match timeout(idle_timeout, to.write_all(&buf[..n])).await {
            Ok(Ok(())) => total += n as u64,
            Ok(Err(_)) | Err(_) => break,
        }
    }

    total
}
