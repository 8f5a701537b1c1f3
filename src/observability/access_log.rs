//! Per-request completion records and the sink they are handed to.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::observability::metrics;

/// One finished proxied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    pub request_id: Uuid,
    pub received_at: SystemTime,
    pub method: String,
    /// Path as the client sent it.
    pub path: String,
    /// Backend base URL, empty when no route matched.
    pub backend: String,
    /// Status sent to the client.
    pub status: u16,
    pub latency: Duration,
    pub client_ip: String,
    /// Declared `Content-Length` of the request. Chunked bodies and bodies
    /// without the header are recorded as 0; streamed bytes are not counted.
    pub request_size: u64,
    /// Response body bytes delivered to the client.
    pub response_size: u64,
}

/// Destination for completion records.
pub trait AccessLog: Send + Sync {
    fn record(&self, record: CompletionRecord);
}

/// Emits each record as a structured `tracing` event and feeds metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAccessLog;

impl AccessLog for TracingAccessLog {
    fn record(&self, record: CompletionRecord) {
        let received_ms = record
            .received_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        tracing::info!(
            request_id = %record.request_id,
            received_at_ms = received_ms as u64,
            method = %record.method,
            path = %record.path,
            backend = %record.backend,
            status = record.status,
            latency_ms = record.latency.as_millis() as u64,
            client_ip = %record.client_ip,
            request_size = record.request_size,
            response_size = record.response_size,
            "proxy request"
        );

        metrics::record_request(&record);
    }
}
