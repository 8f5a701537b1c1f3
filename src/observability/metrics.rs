//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, backend
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_response_bytes_total` (counter): body bytes delivered to clients
//!
//! # Design Decisions
//! - Updates are no-ops until a recorder is installed
//! - Backend label is the base URL, or "none" on a route miss

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::observability::access_log::CompletionRecord;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one finished request.
pub fn record_request(record: &CompletionRecord) {
    let backend = if record.backend.is_empty() {
        "none".to_string()
    } else {
        record.backend.clone()
    };
    let labels = [
        ("method", record.method.clone()),
        ("status", record.status.to_string()),
        ("backend", backend),
    ];

    metrics::counter!("proxy_requests_total", &labels).increment(1);
    metrics::histogram!("proxy_request_duration_seconds", &labels)
        .record(record.latency.as_secs_f64());
    metrics::counter!("proxy_response_bytes_total", &labels).increment(record.response_size);
}
