//! Request forwarding engine.
//!
//! # Data Flow
//! ```text
//! ProxyRequest
//!     → route lookup ──miss──────────────────────────┐
//!     → prepare (limits, target URI, proxy headers)  │
//!     → dispatch (bounded by the dispatch deadline)  │
//!         ├─ response → relay                        │
//!         └─ failure ─────────────────────────────── ┴→ classified error response
//!     → completion record (exactly once, on body drop)
//! ```
//!
//! # Design Decisions
//! - No retries, no backoff: the first failure is final
//! - The deadline covers send until complete response headers; the body
//!   then streams without a deadline
//! - Dropping the handler future drops the in-flight backend call

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, Uri, Version};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tracing::Instrument;

use crate::config::{ProxyConfig, UpstreamConfig};
use crate::http::error::ForwardError;
use crate::http::request::ProxyRequest;
use crate::http::response::{observe, relay, Completion};
use crate::observability::AccessLog;
use crate::routing::{path, RouteSource};
use crate::security::headers::outbound_headers;
use crate::security::limits::CappedBody;

/// Pooled outbound client shared by all requests.
pub type BackendClient = Client<HttpConnector, Body>;

/// Result of one dispatch: the backend response, or why there is none.
pub type ForwardOutcome = Result<Response<Incoming>, ForwardError>;

/// Limits applied to every forwarded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardLimits {
    pub max_body_bytes: u64,
    pub dispatch_timeout: Duration,
}

impl Default for ForwardLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
            dispatch_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&ProxyConfig> for ForwardLimits {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            max_body_bytes: config.limits.max_body_bytes,
            dispatch_timeout: config.timeouts.dispatch(),
        }
    }
}

/// Build the outbound connection pool.
pub fn build_client(upstream: &UpstreamConfig) -> BackendClient {
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(upstream.pool_idle_timeout_secs))
        .pool_max_idle_per_host(upstream.pool_max_idle_per_host)
        .build(HttpConnector::new())
}

/// Forwards requests to the backend their path resolves to.
pub struct ForwardingEngine {
    routes: Arc<dyn RouteSource>,
    client: BackendClient,
    limits: ForwardLimits,
    access_log: Arc<dyn AccessLog>,
}

impl ForwardingEngine {
    pub fn new(
        routes: Arc<dyn RouteSource>,
        limits: ForwardLimits,
        access_log: Arc<dyn AccessLog>,
    ) -> Self {
        Self::with_client(
            routes,
            build_client(&UpstreamConfig::default()),
            limits,
            access_log,
        )
    }

    pub fn with_client(
        routes: Arc<dyn RouteSource>,
        client: BackendClient,
        limits: ForwardLimits,
        access_log: Arc<dyn AccessLog>,
    ) -> Self {
        Self {
            routes,
            client,
            limits,
            access_log,
        }
    }

    /// Handle one inbound request end to end. Never fails: every failure
    /// becomes a classified error response.
    pub async fn handle(&self, request: Request<Body>, remote_addr: SocketAddr) -> Response<Body> {
        let request = ProxyRequest::new(request, remote_addr);
        let span = tracing::debug_span!(
            "forward",
            request_id = %request.request_id,
            method = %request.method,
            path = %request.path,
        );

        async move {
            // Created before dispatch so a dropped handler still yields a record.
            let mut completion =
                Completion::begin(request.completion_record(), self.access_log.clone());

            let response = match self.forward(request, &mut completion).await {
                Ok(response) => relay(response),
                Err(err) => {
                    match &err {
                        ForwardError::RouteMiss { path } => {
                            tracing::warn!(path = %path, "No route matched");
                        }
                        ForwardError::Unreachable(_) | ForwardError::Prepare { .. } => {
                            tracing::error!(error = %err, "Upstream error");
                        }
                        ForwardError::BodyTooLarge | ForwardError::Timeout => {
                            tracing::warn!(error = %err, "Request not forwarded");
                        }
                    }
                    err.into_response()
                }
            };

            observe(response, completion)
        }
        .instrument(span)
        .await
    }

    /// Resolve, prepare and dispatch. The returned outcome is the only
    /// channel through which failures leave this function.
    pub async fn forward(&self, request: ProxyRequest, completion: &mut Completion) -> ForwardOutcome {
        let route = self
            .routes
            .resolve(&request.path)
            .ok_or_else(|| ForwardError::RouteMiss {
                path: request.path.clone(),
            })?;
        completion.set_backend(&route.backend);

        let max = self.limits.max_body_bytes;
        if request.content_length.is_some_and(|len| len > max) {
            return Err(ForwardError::BodyTooLarge);
        }

        let remainder = path::encode(&route.remainder);
        let uri = target_uri(&route.backend, &remainder, request.query.as_deref())?;
        let headers = outbound_headers(&request.headers, &request.remote_addr, request.host.as_ref())
            .map_err(|e| ForwardError::Prepare {
                target: uri.to_string(),
                reason: e.to_string(),
            })?;
        let (body, trip) = CappedBody::new(request.body, max);

        let mut outbound = Request::new(Body::new(body));
        *outbound.method_mut() = request.method;
        *outbound.uri_mut() = uri;
        *outbound.version_mut() = Version::HTTP_11;
        *outbound.headers_mut() = headers;

        tracing::debug!(
            prefix = %route.prefix,
            target = %outbound.uri(),
            "Dispatching to backend"
        );

        let deadline = self.limits.dispatch_timeout;
        match tokio::time::timeout(deadline, self.client.request(outbound)).await {
            Ok(Ok(response)) => {
                tracing::debug!(status = %response.status(), "Backend responded");
                Ok(response)
            }
            Ok(Err(e)) => Err(ForwardError::from_dispatch(e, &trip)),
            Err(_) if trip.is_tripped() => Err(ForwardError::BodyTooLarge),
            Err(_) => {
                tracing::debug!(deadline_ms = deadline.as_millis() as u64, "Dispatch deadline elapsed");
                Err(ForwardError::Timeout)
            }
        }
    }
}

/// `backend + remainder`, with the original query appended. An empty path
/// becomes `/`.
pub fn target_uri(backend: &str, remainder: &str, query: Option<&str>) -> Result<Uri, ForwardError> {
    let mut target = String::with_capacity(backend.len() + remainder.len() + 1);
    target.push_str(backend);
    target.push_str(remainder);

    let has_path = target
        .split_once("://")
        .is_some_and(|(_, rest)| rest.contains('/'));
    if !has_path {
        target.push('/');
    }
    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }

    let prepare = |reason: String| ForwardError::Prepare {
        target: target.clone(),
        reason,
    };
    let uri: Uri = target.parse().map_err(|e: axum::http::uri::InvalidUri| prepare(e.to_string()))?;
    if uri.scheme_str() != Some("http") {
        return Err(prepare("backend scheme must be http".to_string()));
    }
    if uri.authority().is_none() {
        return Err(prepare("backend has no host".to_string()));
    }
    Ok(uri)
}
