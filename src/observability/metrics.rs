//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): time to response head
//! - `gateway_active_streams` (gauge): backend streams in flight
//! - `gateway_commands_total` (counter): commands applied
//! - `gateway_stream_failures_total` (counter): failed streams by kind

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one answered inbound request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn stream_started() {
    gauge!("gateway_active_streams").increment(1.0);
}

pub fn stream_ended() {
    gauge!("gateway_active_streams").decrement(1.0);
}

pub fn record_commands(count: usize) {
    counter!("gateway_commands_total").increment(count as u64);
}

pub fn record_stream_failure(kind: &'static str) {
    counter!("gateway_stream_failures_total", "kind" => kind).increment(1);
}
