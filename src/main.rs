//! Prefix-routing reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request      ┌──────────────────────────────────────────────┐
//!     ────────────────────┼─▶ http server ──▶ routing ──▶ forward ───────┼──▶ Backend
//!                         │   (/health)      (longest     (headers,      │
//!                         │                   prefix)      limits,       │
//!     Client Response     │                               deadline)      │
//!     ◀───────────────────┼── response relay ◀──────────────────────────┼─── Backend
//!                         │   (hop-by-hop strip, byte count, record)     │
//!                         │                                              │
//!                         │   config + watcher │ observability │ lifecycle│
//!                         └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use prefix_proxy::config::{load_config, watcher::ConfigWatcher, ProxyConfig};
use prefix_proxy::lifecycle::Shutdown;
use prefix_proxy::observability::{logging::init_logging, metrics::init_metrics};
use prefix_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "prefix-proxy")]
#[command(about = "HTTP reverse proxy routing by longest path prefix", long_about = None)]
struct Cli {
    /// Path to the TOML config file. Routes are reloaded when it changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "prefix-proxy starting");

    if cli.config.is_none() {
        tracing::warn!("No --config given, running with defaults and no routes");
    }
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        max_body_bytes = config.limits.max_body_bytes,
        dispatch_secs = config.timeouts.dispatch_secs,
        shutdown_grace_secs = config.timeouts.shutdown_grace_secs,
        "Configuration loaded"
    );
    for route in &config.routes {
        tracing::info!(prefix = %route.prefix, backend = %route.backend, "Route registered");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // The watcher handle must outlive the server for reloads to keep flowing.
    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (updates, Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, routes will not reload");
                    (updates, None)
                }
            }
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    shutdown.spawn_signal_listener();

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
