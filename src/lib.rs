//! Image relay library.
//!
//! A TCP service that reads one search term per connection, looks it up at
//! an image-search provider and streams the first matching image back.

// Core subsystems
pub mod config;
pub mod error;
pub mod net;
pub mod relay;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use lifecycle::Shutdown;
pub use relay::RelayServer;
