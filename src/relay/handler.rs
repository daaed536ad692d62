//! Per-connection protocol.
//!
//! # Flow
//! ```text
//! Reading   read one request line (size cap, idle timeout)
//! Querying  search upstream; no results → NOT_FOUND, Closed
//! Fetching  open the first result's image
//! Streaming copy chunks to the client as they arrive
//! Closed    everything sent
//! Failed    sentinel written (if no image bytes went out yet), then close
//! ```
//!
//! The handler borrows the stream; the caller owns it and drops it exactly
//! once. The upstream image stream is owned by this function's frame, so every
//! exit path releases it.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::lifecycle::ShutdownSignal;
use crate::net::{ConnectionId, RelaySession, SessionState};
use crate::relay::request::read_request;
use crate::relay::response::{write_bounded, write_sentinel, Sentinel};
use crate::upstream::UpstreamClient;

/// How a session ended, for the caller's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub id: ConnectionId,
    pub state: SessionState,
    pub bytes_sent: u64,
    /// `delivered`, `not_found`, `cancelled`, or the error kind.
    pub label: &'static str,
}

enum Completion {
    Delivered,
    NotFound,
    Cancelled,
}

/// Limits applied to each connection.
#[derive(Debug, Clone)]
struct HandlerLimits {
    max_line_bytes: usize,
    read_idle: Duration,
    write_timeout: Duration,
    search_limit: u32,
}

/// Runs the relay protocol on one connection at a time; shared by all tasks.
pub struct ConnectionHandler {
    upstream: Arc<UpstreamClient>,
    limits: HandlerLimits,
    shutdown: ShutdownSignal,
}

impl ConnectionHandler {
    pub fn new(upstream: Arc<UpstreamClient>, config: &RelayConfig, shutdown: ShutdownSignal) -> Self {
        Self {
            upstream,
            limits: HandlerLimits {
                max_line_bytes: config.request.max_line_bytes,
                read_idle: config.timeouts.read_idle(),
                write_timeout: config.timeouts.write(),
                search_limit: config.upstream.search_limit,
            },
            shutdown,
        }
    }

    pub fn write_timeout(&self) -> Duration {
        self.limits.write_timeout
    }

    /// Serve one connection to completion.
    pub async fn handle<S>(&self, stream: &mut S, id: ConnectionId) -> SessionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = RelaySession::new(id);

        let label = match self.relay(&mut session, stream).await {
            Ok(completion) => {
                settle(&mut session, SessionState::Closed);
                match completion {
                    Completion::Delivered => "delivered",
                    Completion::NotFound => "not_found",
                    Completion::Cancelled => "cancelled",
                }
            }
            Err(e) => {
                let failed_in = session.state();
                settle(&mut session, SessionState::Failed);

                if matches!(e, RelayError::Internal(_)) {
                    tracing::error!(connection_id = %id, state = %failed_in, error = %e, "Session failed");
                } else {
                    tracing::warn!(connection_id = %id, state = %failed_in, error = %e, "Session failed");
                }

                // Once image bytes are out, a trailing sentinel would corrupt them.
                if session.bytes_sent() == 0 {
                    if let Some(sentinel) = e.sentinel() {
                        if let Err(write_err) =
                            write_sentinel(stream, sentinel, self.limits.write_timeout).await
                        {
                            tracing::debug!(connection_id = %id, error = %write_err, "Could not deliver sentinel");
                        }
                    }
                }
                e.kind()
            }
        };

        let _ = tokio::time::timeout(self.limits.write_timeout, stream.shutdown()).await;

        tracing::info!(
            connection_id = %id,
            outcome = label,
            bytes_sent = session.bytes_sent(),
            duration_ms = session.started_at().elapsed().as_millis() as u64,
            "Session finished"
        );

        SessionOutcome {
            id,
            state: session.state(),
            bytes_sent: session.bytes_sent(),
            label,
        }
    }

    async fn relay<S>(&self, session: &mut RelaySession, stream: &mut S) -> RelayResult<Completion>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let id = session.id();
        let mut shutdown = self.shutdown.clone();

        let request = tokio::select! {
            request = read_request(stream, self.limits.max_line_bytes, self.limits.read_idle) => request?,
            _ = shutdown.recv() => {
                tracing::debug!(connection_id = %id, "Shutdown while waiting for request");
                return Ok(Completion::Cancelled);
            }
        };

        session.advance(SessionState::Querying)?;
        tracing::info!(connection_id = %id, term = %request.term(), "Search requested");

        let records = self
            .upstream
            .search(request.term(), self.limits.search_limit)
            .await?;

        let Some(first) = records.into_iter().next() else {
            tracing::info!(connection_id = %id, term = %request.term(), "No images found");
            write_sentinel(stream, Sentinel::NotFound, self.limits.write_timeout).await?;
            return Ok(Completion::NotFound);
        };

        session.advance(SessionState::Fetching)?;
        tracing::debug!(connection_id = %id, image_id = %first.id, url = %first.url, "Fetching first result");
        let mut image = self.upstream.fetch_image(&first.url).await?;

        session.advance(SessionState::Streaming)?;
        tracing::debug!(connection_id = %id, content_length = ?image.content_length(), "Streaming image");
        while let Some(chunk) = image.next_chunk().await? {
            write_bounded(stream, &chunk, self.limits.write_timeout).await?;
            session.add_bytes_sent(chunk.len());
        }
        tracing::debug!(connection_id = %id, bytes_read = image.bytes_read(), "Image stream complete");

        Ok(Completion::Delivered)
    }
}

/// Move a session into its terminal state. Every live state may end, so a
/// refusal here is a bug in the state machine.
fn settle(session: &mut RelaySession, end: SessionState) {
    if let Err(e) = session.advance(end) {
        tracing::error!(connection_id = %session.id(), error = %e, "Invalid session transition");
        debug_assert!(false, "cannot end session: {}", e);
    }
}
