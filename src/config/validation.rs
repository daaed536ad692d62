//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and references.
//! Validation is a pure function that reports every problem, not just the
//! first, and runs before anything binds.

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::RelayConfig;

/// Largest page size the search endpoint accepts.
pub const MAX_SEARCH_LIMIT: u32 = 30;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, returning all violations found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be at least 1"));
    }
    if config.request.max_line_bytes == 0 {
        errors.push(ValidationError::new("request.max_line_bytes", "must be at least 1"));
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.read_idle_ms", timeouts.read_idle_ms),
        ("timeouts.write_ms", timeouts.write_ms),
        ("timeouts.drain_ms", timeouts.drain_ms),
        ("timeouts.upstream_request_ms", timeouts.upstream_request_ms),
        ("timeouts.upstream_connect_ms", timeouts.upstream_connect_ms),
        ("timeouts.upstream_chunk_ms", timeouts.upstream_chunk_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    let upstream = &config.upstream;
    if let Err(e) = Url::parse(&upstream.base_url) {
        errors.push(ValidationError::new(
            "upstream.base_url",
            format!("'{}' is not a URL: {}", upstream.base_url, e),
        ));
    }
    if upstream.access_key.trim().is_empty() {
        errors.push(ValidationError::new("upstream.access_key", "is required"));
    }
    if upstream.image_variant.trim().is_empty() {
        errors.push(ValidationError::new("upstream.image_variant", "must not be empty"));
    }
    if !(1..=MAX_SEARCH_LIMIT).contains(&upstream.search_limit) {
        errors.push(ValidationError::new(
            "upstream.search_limit",
            format!("must be between 1 and {}", MAX_SEARCH_LIMIT),
        ));
    }
    if upstream.max_image_bytes == 0 {
        errors.push(ValidationError::new("upstream.max_image_bytes", "must be at least 1"));
    }

    let limits = &config.rate_limit;
    if limits.quota_requests == 0 {
        errors.push(ValidationError::new("rate_limit.quota_requests", "must be at least 1"));
    }
    if limits.quota_window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.quota_window_secs", "must be at least 1"));
    }
    if limits.burst == 0 {
        errors.push(ValidationError::new("rate_limit.burst", "must be at least 1"));
    }

    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::new(
            "retries.max_delay_ms",
            "must not be smaller than base_delay_ms",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
