//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define engine metrics (requests, latency, pool pressure, health probes)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `switchyard_requests_total` (counter): requests by method, status
//! - `switchyard_request_duration_seconds` (histogram): end-to-end latency
//! - `switchyard_pool_rejections_total` (counter): backpressure rejections
//! - `switchyard_pool_active` / `switchyard_pool_queued` (gauge): pool occupancy
//! - `switchyard_health_probes_total` (counter): probes by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed, so tests and
//!   embedded use need no setup
//! - Labels stay low-cardinality: never the raw path

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::execution::PoolState;

/// Install the Prometheus exporter and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    metrics::counter!(
        "switchyard_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("switchyard_request_duration_seconds", "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_pool_state(state: &PoolState) {
    metrics::gauge!("switchyard_pool_active").set(state.active_count as f64);
    metrics::gauge!("switchyard_pool_queued").set(state.queued_count as f64);
}

pub fn record_pool_rejection(state: &PoolState) {
    metrics::counter!("switchyard_pool_rejections_total").increment(1);
    record_pool_state(state);
}

pub fn record_health_probe(healthy: bool) {
    let outcome = if healthy { "healthy" } else { "unhealthy" };
    metrics::counter!("switchyard_health_probes_total", "outcome" => outcome).increment(1);
}
