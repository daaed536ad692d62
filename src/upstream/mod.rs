//! Image-search provider integration.
//!
//! # Data Flow
//! ```text
//! search term
//!     → client.rs (rate-limit token, GET search endpoint, retry)
//!     → types.rs (decode either response shape into ImageRecords)
//!     → client.rs (GET first image, capped chunk stream)
//! ```

pub mod client;
pub mod types;

pub use client::{ImageStream, UpstreamClient};
pub use types::ImageRecord;
