//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the upstream provider:
//!     → timeouts.rs (every wait has a deadline)
//!     → On transient failure: retries.rs (retry with backoff)
//!     → backoff.rs (exponential delay + jitter)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only transient failures are retried; retry count is small and fixed

pub mod backoff;
pub mod retries;
pub mod timeouts;
