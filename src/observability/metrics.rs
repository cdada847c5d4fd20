//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_requests_total` (counter): requests evaluated, by method and outcome
//! - `guard_request_duration_seconds` (histogram): latency through the guard
//! - `guard_denials_total` (counter): denials by stage
//! - `guard_rate_limited_total` (counter): rate-limit denials
//! - `guard_store_errors_total` (counter): counter-store failures (failed open)
//! - `guard_events_queued_total` / `guard_events_delivered_total` /
//!   `guard_events_dropped_total` (counters): notification pipeline
//! - `guard_audit_records_total` (counter): audit records emitted, by level
//! - `guard_tor_exit_nodes` (gauge): size of the cached Tor exit set

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    if let Err(e) = builder.install() {
        tracing::error!(error = %e, "Failed to install metrics exporter");
    } else {
        tracing::info!(address = %addr, "Metrics endpoint started");
    }
}

/// Record one evaluated request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "guard_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
    metrics::histogram!("guard_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record a denial by stage name.
pub fn record_denial(stage: &str) {
    metrics::counter!("guard_denials_total", "stage" => stage.to_string()).increment(1);
}

/// Record a rate-limit denial.
pub fn record_rate_limited() {
    metrics::counter!("guard_rate_limited_total").increment(1);
}

/// Record a counter-store failure that was converted to an allow.
pub fn record_store_error() {
    metrics::counter!("guard_store_errors_total").increment(1);
}

/// Record an event accepted onto the dispatch queue.
pub fn record_event_queued() {
    metrics::counter!("guard_events_queued_total").increment(1);
}

/// Record a successful webhook delivery.
pub fn record_event_delivered(url: &str) {
    metrics::counter!("guard_events_delivered_total", "url" => url.to_string()).increment(1);
}

/// Record an event lost to a full queue or exhausted retries.
pub fn record_event_dropped(reason: &'static str) {
    metrics::counter!("guard_events_dropped_total", "reason" => reason).increment(1);
}

/// Record an emitted audit record by level.
pub fn record_audit_record(level: &str) {
    metrics::counter!("guard_audit_records_total", "level" => level.to_string()).increment(1);
}

/// Record the size of the cached Tor exit-node set after a refresh.
pub fn record_tor_exit_nodes(count: usize) {
    metrics::gauge!("guard_tor_exit_nodes").set(count as f64);
}
