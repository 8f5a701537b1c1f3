//! Inbound request capture.
//!
//! # Responsibilities
//! - Generate a request ID (UUID v4) for correlation
//! - Capture the facts later needed for the completion record
//! - Keep the body as a stream; nothing is buffered here

use std::net::SocketAddr;
use std::time::SystemTime;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request};
use uuid::Uuid;

use crate::observability::CompletionRecord;
use crate::routing::path;
use crate::security::headers::client_ip;
use crate::security::limits::declared_length;

/// Status recorded when the client goes away before a response exists.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// A request owned by the forwarding engine for its lifetime.
#[derive(Debug)]
pub struct ProxyRequest {
    pub request_id: Uuid,
    pub method: Method,
    /// Percent-decoded request path, used for routing and the record.
    pub path: String,
    pub query: Option<String>,
    /// Host the client addressed (Host header, or the URI authority on HTTP/2).
    pub host: Option<HeaderValue>,
    pub headers: HeaderMap,
    pub body: Body,
    pub remote_addr: String,
    pub client_ip: String,
    pub content_length: Option<u64>,
    pub received_at: SystemTime,
}

impl ProxyRequest {
    pub fn new(request: Request<Body>, remote_addr: SocketAddr) -> Self {
        let (parts, body) = request.into_parts();

        let host = parts.headers.get(header::HOST).cloned().or_else(|| {
            parts
                .uri
                .authority()
                .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
        });
        let remote_addr = remote_addr.to_string();

        Self {
            request_id: Uuid::new_v4(),
            path: path::decode(parts.uri.path()).into_owned(),
            query: parts.uri.query().map(str::to_string),
            content_length: declared_length(&parts.headers),
            client_ip: client_ip(&remote_addr),
            method: parts.method,
            host,
            headers: parts.headers,
            body,
            remote_addr,
            received_at: SystemTime::now(),
        }
    }

    /// Record skeleton; backend, status and sizes are filled in as the request progresses.
    pub fn completion_record(&self) -> CompletionRecord {
        CompletionRecord {
            request_id: self.request_id,
            received_at: self.received_at,
            method: self.method.to_string(),
            path: self.path.clone(),
            backend: String::new(),
            status: CLIENT_CLOSED_REQUEST,
            latency: Default::default(),
            client_ip: self.client_ip.clone(),
            request_size: self.content_length.unwrap_or(0),
            response_size: 0,
        }
    }
}
