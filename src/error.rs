//! Error taxonomy for the relay.
//!
//! Every failure a connection can hit is one of these variants. Each variant
//! maps to exactly one client-visible [`Sentinel`], except
//! [`RelayError::ClientDisconnected`], where nobody is left to tell.

use thiserror::Error;

use crate::relay::response::Sentinel;

/// Errors produced while relaying a single request.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The request line was empty, whitespace-only or not UTF-8.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The client stopped sending before a full request line arrived.
    #[error("Read timed out after {0} ms")]
    ReadTimeout(u64),

    /// The request line exceeded the configured maximum.
    #[error("Request exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },

    /// No upstream token became available within the wait timeout.
    #[error("Upstream rate limit exceeded")]
    RateLimitExceeded,

    /// Network failure, timeout or 5xx from the upstream. Retryable.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream answered with a 4xx status.
    #[error("Upstream rejected request with status {status}")]
    UpstreamRejected { status: u16 },

    /// The upstream answered with something we could not interpret.
    #[error("Upstream response malformed: {0}")]
    UpstreamMalformed(String),

    /// The image exceeded the configured byte cap.
    #[error("Image exceeds {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// No connection slot was free within the admission timeout.
    #[error("Server busy")]
    ServerBusy,

    /// Unexpected failure, including a panic caught at the handler boundary.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The client went away mid-conversation.
    #[error("Client disconnected: {0}")]
    ClientDisconnected(#[source] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// Only transient upstream failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::UpstreamUnavailable(_))
    }

    /// The sentinel written to the client for this error, if one can be written.
    pub fn sentinel(&self) -> Option<Sentinel> {
        let sentinel = match self {
            RelayError::BadRequest(_) => Sentinel::BadRequest,
            RelayError::ReadTimeout(_) => Sentinel::ReadTimeout,
            RelayError::RequestTooLarge { .. } => Sentinel::RequestTooLarge,
            RelayError::RateLimitExceeded => Sentinel::RateLimited,
            RelayError::UpstreamUnavailable(_)
            | RelayError::UpstreamRejected { .. }
            | RelayError::UpstreamMalformed(_) => Sentinel::UpstreamError,
            RelayError::PayloadTooLarge { .. } => Sentinel::PayloadTooLarge,
            RelayError::ServerBusy => Sentinel::ServerBusy,
            RelayError::Internal(_) => Sentinel::InternalError,
            RelayError::ClientDisconnected(_) => return None,
        };
        Some(sentinel)
    }

    /// Short label for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::BadRequest(_) => "bad_request",
            RelayError::ReadTimeout(_) => "read_timeout",
            RelayError::RequestTooLarge { .. } => "request_too_large",
            RelayError::RateLimitExceeded => "rate_limited",
            RelayError::UpstreamUnavailable(_) => "upstream_unavailable",
            RelayError::UpstreamRejected { .. } => "upstream_rejected",
            RelayError::UpstreamMalformed(_) => "upstream_malformed",
            RelayError::PayloadTooLarge { .. } => "payload_too_large",
            RelayError::ServerBusy => "server_busy",
            RelayError::Internal(_) => "internal",
            RelayError::ClientDisconnected(_) => "client_disconnected",
        }
    }
}
