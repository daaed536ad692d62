//! Outbound rate limiting for the upstream provider.
//!
//! One token bucket is shared by every connection handler. Refill and
//! consumption happen under a single mutex, so concurrent callers can neither
//! double-spend a token nor lose a refill.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::{RelayError, RelayResult};
use crate::observability::metrics;

/// A continuously refilling token bucket.
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Take one token, or report how long until one will exist.
    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        if refill_rate <= 0.0 {
            return Err(Duration::MAX);
        }
        let missing = 1.0 - self.tokens;
        Err(Duration::try_from_secs_f64(missing / refill_rate).unwrap_or(Duration::MAX))
    }
}

/// Shared limiter gating every upstream HTTP attempt.
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    capacity: f64,
    refill_per_sec: f64,
    acquire_timeout: Duration,
}

impl RateLimiter {
    /// Create a full bucket holding `capacity` tokens.
    pub fn new(capacity: u32, refill_per_sec: f64, acquire_timeout: Duration) -> Self {
        let capacity = capacity as f64;
        Self {
            bucket: Mutex::new(TokenBucket::new(capacity)),
            capacity,
            refill_per_sec,
            acquire_timeout,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.burst, config.refill_per_sec(), config.acquire_timeout())
    }

    /// Take a token without waiting. On failure, returns the wait until the
    /// next token.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.try_acquire(self.capacity, self.refill_per_sec)
    }

    /// Wait for a token, failing with `RateLimitExceeded` once the acquire
    /// timeout would be overrun.
    ///
    /// If the time until the next token already exceeds what is left of the
    /// timeout, this fails immediately instead of sleeping first.
    pub async fn acquire(&self) -> RelayResult<()> {
        let deadline = Instant::now() + self.acquire_timeout;

        loop {
            let wait = match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if wait > remaining {
                tracing::warn!(
                    wait = ?wait,
                    timeout = ?self.acquire_timeout,
                    "Upstream rate limit exceeded"
                );
                metrics::record_rate_limited();
                return Err(RelayError::RateLimitExceeded);
            }

            tracing::debug!(wait = ?wait, "Waiting for upstream token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently in the bucket, refill included.
    pub fn available(&self) -> f64 {
        let bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = Instant::now().duration_since(bucket.last_refill).as_secs_f64();
        (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }
}
