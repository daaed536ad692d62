//! Resource protection subsystem.
//!
//! # Data Flow
//! ```text
//! Connection handler
//!     → limits.rs (request line cap, image byte cap)
//!     → rate_limit.rs (one token per upstream HTTP attempt)
//!     → upstream client
//! ```
//!
//! # Design Decisions
//! - One bucket for the whole process: the provider quota is per credential,
//!   not per client
//! - Byte caps are checked incrementally, never after buffering

pub mod limits;
pub mod rate_limit;

pub use limits::ByteBudget;
pub use rate_limit::RateLimiter;
