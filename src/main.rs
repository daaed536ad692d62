//! Image relay (v1)
//!
//! A TCP service that turns a search term into an image.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                     IMAGE RELAY                       │
//!                      │                                                       │
//!   "cats\n"           │  ┌─────────┐    ┌─────────┐    ┌──────────────┐      │
//!   ───────────────────┼─▶│   net   │───▶│  relay  │───▶│   upstream   │──────┼──▶ Search API
//!                      │  │listener │    │ handler │    │    client    │      │
//!                      │  └─────────┘    └────┬────┘    └──────┬───────┘      │
//!                      │                      │                │              │
//!   image bytes        │                      │                ▼              │
//!   or SENTINEL\n      │                      │        ┌──────────────┐       │
//!   ◀──────────────────┼──────────────────────┘◀───────│ image stream │◀──────┼─── Image host
//!                      │                               └──────────────┘       │
//!                      │  ┌────────────────────────────────────────────────┐  │
//!                      │  │            Cross-Cutting Concerns               │  │
//!                      │  │  config · security (rate limit, byte caps)      │  │
//!                      │  │  resilience (timeouts, retry) · observability   │  │
//!                      │  │  lifecycle (signals, drain)                     │  │
//!                      │  └────────────────────────────────────────────────┘  │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use image_relay::config::{read_config, validate_config, ConfigError, RelayConfig};
use image_relay::lifecycle::{signals, Shutdown};
use image_relay::net::Listener;
use image_relay::observability::{logging, metrics};
use image_relay::security::RateLimiter;
use image_relay::upstream::UpstreamClient;
use image_relay::RelayServer;

#[derive(Parser)]
#[command(name = "image-relay", version)]
#[command(about = "Relay a search term to an image-search API and stream back the first image", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults are used without one
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(short, long, env = "IMAGE_RELAY_BIND")]
    bind: Option<String>,

    /// Provider access key, overriding the config file
    #[arg(long, env = "IMAGE_RELAY_ACCESS_KEY", hide_env_values = true)]
    access_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(key) = cli.access_key {
        config.upstream.access_key = key;
    }

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("config error: {}", error);
        }
        return Err(ConfigError::Validation(errors).into());
    }

    logging::init_logging(&config.observability);
    tracing::info!("image-relay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        upstream = %config.upstream.base_url,
        quota_requests = config.rate_limit.quota_requests,
        quota_window_secs = config.rate_limit.quota_window_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    tracing::info!(
        burst = limiter.capacity(),
        refill_per_sec = config.rate_limit.refill_per_sec(),
        "Upstream rate limiter ready"
    );
    let upstream = Arc::new(UpstreamClient::new(&config, limiter)?);

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    let server = RelayServer::new(config, upstream);
    server.run(listener, server_shutdown).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
