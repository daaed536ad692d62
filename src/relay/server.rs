//! Relay server: accept loop, admission control, graceful shutdown.
//!
//! # Responsibilities
//! - Accept TCP connections without ever waiting on the slot budget
//! - Run each admitted connection on its own task
//! - Reject connections that find no slot within the admission timeout
//! - Contain handler panics to their own connection
//! - On shutdown: stop accepting, drain in-flight work, abort stragglers

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use crate::config::RelayConfig;
use crate::lifecycle::ShutdownSignal;
use crate::net::{Admission, ConnectionId, ConnectionPermit, Listener};
use crate::observability::metrics;
use crate::relay::handler::{ConnectionHandler, SessionOutcome};
use crate::relay::response::{write_sentinel, Sentinel};
use crate::upstream::UpstreamClient;

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// The relay server.
pub struct RelayServer {
    config: RelayConfig,
    upstream: Arc<UpstreamClient>,
}

impl RelayServer {
    pub fn new(config: RelayConfig, upstream: Arc<UpstreamClient>) -> Self {
        Self { config, upstream }
    }

    /// Serve `listener` until `shutdown` fires, then drain.
    pub async fn run(self, listener: Listener, mut shutdown: ShutdownSignal) {
        let handler = Arc::new(ConnectionHandler::new(
            self.upstream.clone(),
            &self.config,
            shutdown.clone(),
        ));
        let admission = listener.admission();
        let admission_timeout = self.config.timeouts.admission();
        let mut tasks: JoinSet<()> = JoinSet::new();

        match listener.local_addr() {
            Ok(addr) => tracing::info!(
                address = %addr,
                max_connections = listener.max_connections(),
                "Relay server accepting connections"
            ),
            Err(e) => tracing::warn!(error = %e, "Relay server started without a local address"),
        }

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Connection task ended abnormally");
                    }
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let id = ConnectionId::new();
                        let permit = admission.try_admit();
                        tasks.spawn(serve_connection(
                            handler.clone(),
                            stream,
                            peer,
                            id,
                            permit,
                            admission.clone(),
                            admission_timeout,
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        drain(tasks, self.config.timeouts.drain()).await;
        tracing::info!("Relay server stopped");
    }
}

/// Admit (or reject) one connection and run its handler.
async fn serve_connection(
    handler: Arc<ConnectionHandler>,
    mut stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    permit: Option<ConnectionPermit>,
    admission: Admission,
    admission_timeout: Duration,
) {
    let permit = match permit {
        Some(permit) => permit,
        None => match admission.admit(admission_timeout).await {
            Some(permit) => permit,
            None => {
                reject_busy(&mut stream, peer, id, handler.write_timeout()).await;
                return;
            }
        },
    };

    metrics::record_admission(true);
    let mut active = ActiveSession::start();
    tracing::debug!(connection_id = %id, peer = %peer, "Connection admitted");

    let write_timeout = handler.write_timeout();
    let outcome = run_contained(&mut stream, id, write_timeout, move |stream| {
        Box::pin(async move { handler.handle(stream, id).await })
    })
    .await;

    match outcome {
        Some(outcome) => {
            metrics::record_bytes_sent(outcome.bytes_sent);
            active.finish(outcome.label);
        }
        None => active.finish("panic"),
    }
    drop(active);
    drop(permit);
}

/// Counts a session as active until dropped.
///
/// Aborted tasks drop it too, so the gauge stays balanced after a forced
/// shutdown; such sessions are recorded as `aborted`.
struct ActiveSession {
    started: Instant,
    outcome: &'static str,
}

impl ActiveSession {
    fn start() -> Self {
        metrics::session_started();
        Self {
            started: Instant::now(),
            outcome: "aborted",
        }
    }

    fn finish(&mut self, outcome: &'static str) {
        self.outcome = outcome;
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        metrics::session_finished(self.outcome, self.started);
    }
}

/// Run one session on `stream` behind a panic boundary.
///
/// A panic is logged and answered with `INTERNAL_ERROR` while the socket is
/// still writable; the caller gets `None`.
async fn run_contained<S, F>(
    stream: &mut S,
    id: ConnectionId,
    write_timeout: Duration,
    session: F,
) -> Option<SessionOutcome>
where
    S: AsyncWrite + Unpin,
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, SessionOutcome>,
{
    match AssertUnwindSafe(session(stream)).catch_unwind().await {
        Ok(outcome) => Some(outcome),
        Err(panic) => {
            tracing::error!(
                connection_id = %id,
                panic = %panic_message(panic.as_ref()),
                "Connection handler panicked"
            );
            if let Err(e) = write_sentinel(stream, Sentinel::InternalError, write_timeout).await {
                tracing::debug!(connection_id = %id, error = %e, "Could not deliver internal error sentinel");
            }
            let _ = stream.shutdown().await;
            None
        }
    }
}

async fn reject_busy(stream: &mut TcpStream, peer: SocketAddr, id: ConnectionId, write_timeout: Duration) {
    metrics::record_admission(false);
    tracing::warn!(connection_id = %id, peer = %peer, "No free connection slot, rejecting");
    if let Err(e) = write_sentinel(stream, Sentinel::ServerBusy, write_timeout).await {
        tracing::debug!(connection_id = %id, error = %e, "Could not deliver busy sentinel");
    }
    let _ = stream.shutdown().await;
}

/// Wait up to `limit` for every task, then abort the rest.
async fn drain(mut tasks: JoinSet<()>, limit: Duration) {
    if tasks.is_empty() {
        return;
    }

    tracing::info!(in_flight = tasks.len(), drain = ?limit, "Draining connections");
    if tokio::time::timeout(limit, join_all(&mut tasks)).await.is_ok() {
        tracing::info!("All connections drained");
        return;
    }

    tracing::warn!(remaining = tasks.len(), "Drain timeout elapsed, force-closing connections");
    tasks.abort_all();
    join_all(&mut tasks).await;
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while tasks.join_next().await.is_some() {}
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
