//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the image relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, connection budget).
    pub listener: ListenerConfig,

    /// Request framing limits.
    pub request: RequestConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Upstream image-search provider.
    pub upstream: UpstreamConfig,

    /// Outbound rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:1249").
    pub bind_address: String,

    /// Maximum concurrent sessions (admission control).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:1249".to_string(),
            max_connections: 64,
        }
    }
}

/// Request framing limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Longest accepted request line, terminator included.
    pub max_line_bytes: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: 10 * 1024,
        }
    }
}

/// Timeout configuration for every suspension point, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Longest wait for a single read from the client.
    pub read_idle_ms: u64,

    /// Longest wait for a single write to the client.
    pub write_ms: u64,

    /// How long an over-budget connection may wait for a slot.
    pub admission_ms: u64,

    /// How long shutdown waits for in-flight handlers.
    pub drain_ms: u64,

    /// Search request and image response-header deadline.
    pub upstream_request_ms: u64,

    /// TCP/TLS connect deadline towards the upstream.
    pub upstream_connect_ms: u64,

    /// Longest wait for the next chunk of an image body.
    pub upstream_chunk_ms: u64,
}

impl TimeoutConfig {
    pub fn read_idle(&self) -> Duration {
        Duration::from_millis(self.read_idle_ms)
    }

    pub fn write(&self) -> Duration {
        Duration::from_millis(self.write_ms)
    }

    pub fn admission(&self) -> Duration {
        Duration::from_millis(self.admission_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    pub fn upstream_request(&self) -> Duration {
        Duration::from_millis(self.upstream_request_ms)
    }

    pub fn upstream_connect(&self) -> Duration {
        Duration::from_millis(self.upstream_connect_ms)
    }

    pub fn upstream_chunk(&self) -> Duration {
        Duration::from_millis(self.upstream_chunk_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_idle_ms: 10_000,
            write_ms: 10_000,
            admission_ms: 50,
            drain_ms: 15_000,
            upstream_request_ms: 5_000,
            upstream_connect_ms: 3_000,
            upstream_chunk_ms: 10_000,
        }
    }
}

/// Upstream image-search provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Provider API root (e.g., "https://api.unsplash.com").
    pub base_url: String,

    /// Search endpoint path, joined onto `base_url`.
    pub search_path: String,

    /// Client credential sent with every search request.
    pub access_key: String,

    /// Authorization scheme placed before the credential.
    pub auth_scheme: String,

    /// Which entry of a record's `urls` object to fetch.
    pub image_variant: String,

    /// Page size requested from the search endpoint (1..=30).
    pub search_limit: u32,

    /// Byte cap for a single image.
    pub max_image_bytes: u64,

    /// User-Agent header for outbound requests.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.unsplash.com".to_string(),
            search_path: "/search/photos".to_string(),
            access_key: String::new(),
            auth_scheme: "Client-ID".to_string(),
            image_variant: "regular".to_string(),
            search_limit: 10,
            max_image_bytes: 25 * 1024 * 1024,
            user_agent: concat!("image-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Outbound rate limiting configuration.
///
/// The refill rate is `quota_requests / quota_window_secs` tokens per second.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests the provider allows per window.
    pub quota_requests: u32,

    /// Length of the provider's quota window.
    pub quota_window_secs: u64,

    /// Bucket capacity (burst allowance).
    pub burst: u32,

    /// Longest a caller waits for a token.
    pub acquire_timeout_ms: u64,
}

impl RateLimitConfig {
    /// Tokens added per second.
    pub fn refill_per_sec(&self) -> f64 {
        self.quota_requests as f64 / self.quota_window_secs.max(1) as f64
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            quota_requests: 50,
            quota_window_secs: 3600,
            burst: 10,
            acquire_timeout_ms: 5_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_fills_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [upstream]
            access_key = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.access_key, "abc");
        assert_eq!(config.upstream.auth_scheme, "Client-ID");
        assert_eq!(config.listener.max_connections, 64);
        assert_eq!(config.retries.max_retries, 2);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn refill_rate_follows_quota() {
        let limits = RateLimitConfig::default();
        let rate = limits.refill_per_sec();
        assert!((rate - 50.0 / 3600.0).abs() < 1e-9);
    }

    #[test]
    fn log_format_parses_lowercase() {
        let config: ObservabilityConfig = toml::from_str(r#"log_format = "json""#).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
