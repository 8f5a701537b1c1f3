//! HTTP server setup and connection lifecycle.
//!
//! # Responsibilities
//! - Create Axum Router: `/health` answered locally, everything else proxied
//! - Serve HTTP/1.1 and HTTP/2 connections with a header read timeout
//! - Swap the route table when a reloaded config arrives
//! - Drain connections on shutdown, aborting whatever outlives the grace period

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::http::forward::{build_client, ForwardLimits, ForwardingEngine};
use crate::observability::{AccessLog, TracingAccessLog};
use crate::routing::{RouteTable, RouteTableError, SharedRouteTable};

/// Pause after a failed accept so a full fd table does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    config: ProxyConfig,
    routes: Arc<SharedRouteTable>,
    access_log: Arc<dyn AccessLog>,
}

impl HttpServer {
    /// Create a server from a validated configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, RouteTableError> {
        let table = RouteTable::from_config(&config.routes)?;
        Ok(Self {
            config,
            routes: Arc::new(SharedRouteTable::new(table)),
            access_log: Arc::new(TracingAccessLog),
        })
    }

    /// Replace the completion record sink.
    pub fn with_access_log(mut self, access_log: Arc<dyn AccessLog>) -> Self {
        self.access_log = access_log;
        self
    }

    /// The live route table.
    pub fn routes(&self) -> Arc<SharedRouteTable> {
        self.routes.clone()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Build the forwarding engine for this server's configuration.
    pub fn engine(&self) -> ForwardingEngine {
        ForwardingEngine::with_client(
            self.routes.clone(),
            build_client(&self.config.upstream),
            ForwardLimits::from(&self.config),
            self.access_log.clone(),
        )
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(engine: Arc<ForwardingEngine>) -> Router {
        Router::new()
            .route("/health", any(health_handler))
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(engine)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, then drain.
    ///
    /// Configs arriving on `config_updates` replace the route table; other
    /// settings only take effect on restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.routes.snapshot().len(),
            "HTTP server starting"
        );

        let app = Self::build_router(Arc::new(self.engine()));
        let header_read_timeout = self.config.listener.header_read_timeout();
        let drain = CancellationToken::new();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            app.clone(),
                            header_read_timeout,
                            drain.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(config) = config_updates.recv() => self.apply_config(config),
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);
        self.drain_and_stop(connections, drain).await;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Install the routes of a reloaded config.
    fn apply_config(&self, config: ProxyConfig) {
        let table = match RouteTable::from_config(&config.routes) {
            Ok(table) => table,
            Err(e) => {
                tracing::error!(error = %e, "Rejected reloaded routes, keeping current table");
                return;
            }
        };

        let restart_only = ProxyConfig {
            routes: self.config.routes.clone(),
            ..config
        };
        if restart_only != self.config {
            tracing::warn!("Config changes outside [[routes]] take effect on restart only");
        }

        tracing::info!(routes = table.len(), "Route table replaced");
        self.routes.replace(table);
    }

    /// Let in-flight requests finish within the grace period, then abort the rest.
    async fn drain_and_stop(&self, mut connections: JoinSet<()>, drain: CancellationToken) {
        let grace = self.config.timeouts.shutdown_grace();
        tracing::info!(
            connections = connections.len(),
            grace_secs = grace.as_secs(),
            "Draining connections"
        );
        drain.cancel();

        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = connections.len(),
                "Grace period elapsed, aborting remaining connections"
            );
            connections.shutdown().await;
        }
    }
}

/// Serve one accepted connection until it closes or the drain completes.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    header_read_timeout: Duration,
    drain: CancellationToken,
) {
    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        app.clone().oneshot(request)
    });

    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(header_read_timeout);

    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = drain.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
    }
}

/// Liveness endpoint. Not routed, not recorded.
async fn health_handler() -> &'static str {
    "OK"
}

/// Main proxy handler.
async fn proxy_handler(
    State(engine): State<Arc<ForwardingEngine>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    engine.handle(request, addr).await
}
