//! Metrics collection and exposition.
//!
//! # Metrics
//! - `drover_control_requests_total` (counter): control plane calls by
//!   method and outcome
//! - `drover_engine_starts_total` (counter): engine starts by outcome
//! - `drover_selector_batches_total` (counter): dispatched batches

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_control_request(method: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "failed" };
    ::metrics::counter!("drover_control_requests_total", "method" => method, "outcome" => outcome)
        .increment(1);
}

pub fn record_engine_start(outcome: &'static str) {
    ::metrics::counter!("drover_engine_starts_total", "outcome" => outcome).increment(1);
}

pub fn record_selector_batch() {
    ::metrics::counter!("drover_selector_batches_total").increment(1);
}
