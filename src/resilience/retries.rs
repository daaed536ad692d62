//! Retry logic.
//!
//! # Responsibilities
//! - Re-run an upstream operation while it fails with a retryable error
//! - Sleep with exponential backoff + jitter between attempts
//!
//! # Design Decisions
//! - Only `UpstreamUnavailable` is retried; rejections and malformed
//!   responses surface immediately
//! - The operation is a closure so each attempt builds a fresh request

use std::future::Future;

use crate::config::RetryConfig;
use crate::error::RelayResult;
use crate::resilience::backoff::backoff_for;

/// Run `operation` up to `1 + max_retries` times.
///
/// `label` names the call in logs. The attempt number (1-based) is passed to
/// the closure.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    label: &'static str,
    mut operation: F,
) -> RelayResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = RelayResult<T>>,
{
    let max_attempts = config.max_retries.saturating_add(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff_for(config, attempt);
                tracing::info!(
                    call = label,
                    attempt,
                    delay = ?delay,
                    error = %e,
                    "Retrying upstream call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(call = label, attempts = attempt, error = %e, "Upstream retries exhausted");
                }
                return Err(e);
            }
        }
    }
}
