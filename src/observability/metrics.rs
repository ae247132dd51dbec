//! Metrics collection and exposition.
//!
//! # Metrics
//! - `splitter_requests_total` (counter): inbound requests by method, status
//! - `splitter_request_duration_seconds` (histogram): time until the response head
//! - `splitter_upstream_calls_total` (counter): upstream calls by role, outcome
//! - `splitter_upstream_duration_seconds` (histogram): full call time by role
//! - `splitter_capture_truncated_total` (counter): captures cut at the cap
//! - `splitter_events_retained` (gauge): snapshots held by the event bus
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Role label for an upstream index.
pub fn role(index: usize) -> &'static str {
    if index == 0 {
        "primary"
    } else {
        "shadow"
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "splitter_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("splitter_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_call(index: usize, ok: bool, elapsed: Duration) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(
        "splitter_upstream_calls_total",
        "role" => role(index),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("splitter_upstream_duration_seconds", "role" => role(index))
        .record(elapsed.as_secs_f64());
}

pub fn record_truncated(index: usize) {
    counter!("splitter_capture_truncated_total", "role" => role(index)).increment(1);
}

pub fn record_events_retained(count: usize) {
    gauge!("splitter_events_retained").set(count as f64);
}
