//! Client-visible responses.
//!
//! Success is the raw image bytes. Everything else is exactly one sentinel
//! line, after which the connection closes.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{RelayError, RelayResult};
use crate::resilience::timeouts::deadline;

/// Fixed replies for every non-image outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    NotFound,
    BadRequest,
    ReadTimeout,
    RequestTooLarge,
    RateLimited,
    UpstreamError,
    PayloadTooLarge,
    ServerBusy,
    InternalError,
}

impl Sentinel {
    pub const ALL: [Sentinel; 9] = [
        Sentinel::NotFound,
        Sentinel::BadRequest,
        Sentinel::ReadTimeout,
        Sentinel::RequestTooLarge,
        Sentinel::RateLimited,
        Sentinel::UpstreamError,
        Sentinel::PayloadTooLarge,
        Sentinel::ServerBusy,
        Sentinel::InternalError,
    ];

    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Sentinel::NotFound => b"NOT_FOUND\n",
            Sentinel::BadRequest => b"BAD_REQUEST\n",
            Sentinel::ReadTimeout => b"READ_TIMEOUT\n",
            Sentinel::RequestTooLarge => b"REQUEST_TOO_LARGE\n",
            Sentinel::RateLimited => b"RATE_LIMITED\n",
            Sentinel::UpstreamError => b"UPSTREAM_ERROR\n",
            Sentinel::PayloadTooLarge => b"PAYLOAD_TOO_LARGE\n",
            Sentinel::ServerBusy => b"SERVER_BUSY\n",
            Sentinel::InternalError => b"INTERNAL_ERROR\n",
        }
    }

    /// Recognise a complete reply that is exactly one sentinel.
    pub fn from_reply(reply: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_bytes() == reply)
    }
}

impl std::fmt::Display for Sentinel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.as_bytes();
        f.write_str(std::str::from_utf8(&bytes[..bytes.len() - 1]).unwrap_or("?"))
    }
}

/// Write `bytes` and flush, bounded by `timeout`.
pub async fn write_bounded<W>(writer: &mut W, bytes: &[u8], timeout: Duration) -> RelayResult<()>
where
    W: AsyncWrite + Unpin,
{
    deadline(
        timeout,
        async {
            writer
                .write_all(bytes)
                .await
                .map_err(RelayError::ClientDisconnected)?;
            writer.flush().await.map_err(RelayError::ClientDisconnected)
        },
        || RelayError::ClientDisconnected(std::io::ErrorKind::TimedOut.into()),
    )
    .await
}

/// Write one sentinel line.
pub async fn write_sentinel<W>(writer: &mut W, sentinel: Sentinel, timeout: Duration) -> RelayResult<()>
where
    W: AsyncWrite + Unpin,
{
    write_bounded(writer, sentinel.as_bytes(), timeout).await
}
