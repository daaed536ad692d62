//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + command-line/env overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → handed by value / Arc to each subsystem
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the credential never lives in a global
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{read_config, ConfigError};
pub use schema::{
    ListenerConfig, LogFormat, ObservabilityConfig, RateLimitConfig, RelayConfig, RequestConfig,
    RetryConfig, TimeoutConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
