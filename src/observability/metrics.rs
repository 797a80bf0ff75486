//! Metrics collection and exposition.
//!
//! # Metrics
//! - `flaky_requests_total` (counter): requests seen by the counting stage
//! - `flaky_injected_failures_total` (counter): synthetic 500s returned
//! - `flaky_request_number` (gauge): number assigned to the latest request
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const REQUESTS_TOTAL: &str = "flaky_requests_total";
pub const INJECTED_FAILURES_TOTAL: &str = "flaky_injected_failures_total";
pub const REQUEST_NUMBER: &str = "flaky_request_number";

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(number: u64) {
    metrics::counter!(REQUESTS_TOTAL).increment(1);
    metrics::gauge!(REQUEST_NUMBER).set(number as f64);
}

pub fn record_injected_failure() {
    metrics::counter!(INJECTED_FAILURES_TOTAL).increment(1);
}
