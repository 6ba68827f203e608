//! Bidirectional byte forwarding between a client and the primary.
//!
//! Each direction runs on its own task and copies until its source reports
//! EOF or an error, then shuts down the write side of its destination. The
//! other direction keeps draining until it finishes the same way. Both
//! streams are dropped, and therefore closed, once both tasks are done.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, Instrument};

/// Relay buffer size.
const RELAY_BUFFER_SIZE: usize = 8192;

/// Direction of a relay task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to primary.
    Upstream,
    /// Primary to client.
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("downstream->upstream"),
            Direction::Downstream => f.write_str("upstream->downstream"),
        }
    }
}

/// Bytes moved by a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub bytes_to_upstream: u64,
    pub bytes_from_upstream: u64,
}

/// Forward bytes between `downstream` and `upstream` until both directions end.
pub async fn forward<D, U>(downstream: D, upstream: U) -> SessionSummary
where
    D: AsyncRead + AsyncWrite + Send + 'static,
    U: AsyncRead + AsyncWrite + Send + 'static,
{
    let (down_read, down_write) = tokio::io::split(downstream);
    let (up_read, up_write) = tokio::io::split(upstream);

    let to_upstream =
        tokio::spawn(relay(down_read, up_write, Direction::Upstream).in_current_span());
    let to_downstream =
        tokio::spawn(relay(up_read, down_write, Direction::Downstream).in_current_span());

    let (to_upstream, to_downstream) = tokio::join!(to_upstream, to_downstream);

    let summary = SessionSummary {
        bytes_to_upstream: to_upstream.unwrap_or_default(),
        bytes_from_upstream: to_downstream.unwrap_or_default(),
    };

    debug!(
        bytes_to_upstream = summary.bytes_to_upstream,
        bytes_from_upstream = summary.bytes_from_upstream,
        "Session closed"
    );

    summary
}

/// Copy `src` into `dst` until EOF or error, then half-close `dst`.
///
/// Returns the number of bytes written to `dst`.
async fn relay<R, W>(mut src: R, mut dst: W, direction: Direction) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    let result = copy_until_eof(&mut src, &mut dst, &mut total).await;

    match &result {
        Ok(()) => debug!(direction = %direction, bytes = total, "EOF, half-closing"),
        Err(e) => debug!(
            direction = %direction,
            bytes = total,
            error = %e,
            "Relay error, half-closing"
        ),
    }

    if let Err(e) = dst.shutdown().await {
        debug!(direction = %direction, error = %e, "Shutdown failed");
    }

    total
}

async fn copy_until_eof<R, W>(src: &mut R, dst: &mut W, total: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        match src.read(&mut buf).await? {
            0 => return Ok(()),
            n => {
                dst.write_all(&buf[..n]).await?;
                *total += n as u64;
            }
        }
    }
}
