//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_connections_total` (counter): accepted connections by admission outcome
//! - `relay_active_sessions` (gauge): sessions currently holding a slot
//! - `relay_requests_total` (counter): finished sessions by outcome
//! - `relay_request_duration_seconds` (histogram): session duration
//! - `relay_bytes_sent_total` (counter): image bytes written to clients
//! - `relay_upstream_calls_total` (counter): upstream HTTP attempts by call and result
//! - `relay_rate_limited_total` (counter): token acquisitions that timed out
//!
//! Recording is a no-op until [`init_metrics`] installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_admission(admitted: bool) {
    let outcome = if admitted { "admitted" } else { "rejected" };
    counter!("relay_connections_total", "outcome" => outcome).increment(1);
}

pub fn session_started() {
    gauge!("relay_active_sessions").increment(1.0);
}

pub fn session_finished(outcome: &'static str, started: Instant) {
    gauge!("relay_active_sessions").decrement(1.0);
    counter!("relay_requests_total", "outcome" => outcome).increment(1);
    histogram!("relay_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_bytes_sent(bytes: u64) {
    counter!("relay_bytes_sent_total").increment(bytes);
}

pub fn record_upstream_call(call: &'static str, result: &'static str) {
    counter!("relay_upstream_calls_total", "call" => call, "result" => result).increment(1);
}

pub fn record_rate_limited() {
    counter!("relay_rate_limited_total").increment(1);
}
