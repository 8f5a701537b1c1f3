//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use prefix_proxy::config::{ProxyConfig, RouteConfig};
use prefix_proxy::http::HttpServer;
use prefix_proxy::lifecycle::Shutdown;
use prefix_proxy::observability::{AccessLog, CompletionRecord};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Serve an axum app on an ephemeral port.
pub async fn spawn_backend(app: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start a raw TCP backend that answers every request with `response` verbatim.
pub async fn start_raw_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Start a backend that accepts connections and never answers.
pub async fn start_hanging_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Connection events seen by [`start_watching_backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    RequestReceived,
    ConnectionClosed,
}

/// Start a backend that never answers and reports when a request arrives
/// and when the proxy closes the connection.
pub async fn start_watching_backend() -> (SocketAddr, mpsc::UnboundedReceiver<BackendEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                match socket.read(&mut buf).await {
                    Ok(n) if n > 0 => {
                        let _ = tx.send(BackendEvent::RequestReceived);
                    }
                    _ => return,
                }
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                let _ = tx.send(BackendEvent::ConnectionClosed);
            });
        }
    });
    (addr, rx)
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Completion record sink that keeps everything it is given.
#[derive(Default)]
pub struct Recorder(Mutex<Vec<CompletionRecord>>);

impl AccessLog for Recorder {
    fn record(&self, record: CompletionRecord) {
        self.0.lock().unwrap().push(record);
    }
}

impl Recorder {
    pub fn records(&self) -> Vec<CompletionRecord> {
        self.0.lock().unwrap().clone()
    }

    /// Records are emitted when the response body is released, which can
    /// trail the client seeing the last byte.
    pub async fn wait_for(&self, count: usize) -> Vec<CompletionRecord> {
        for _ in 0..500 {
            let records = self.records();
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} records, got {:?}", self.records());
    }
}

/// A proxy running on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub recorder: Arc<Recorder>,
    pub shutdown: Shutdown,
    pub config_updates: mpsc::UnboundedSender<ProxyConfig>,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub fn config_with_routes(routes: &[(&str, SocketAddr)]) -> ProxyConfig {
    ProxyConfig {
        routes: routes
            .iter()
            .map(|(prefix, addr)| RouteConfig::new(*prefix, format!("http://{addr}")))
            .collect(),
        ..ProxyConfig::default()
    }
}

pub async fn spawn_proxy(config: ProxyConfig) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let recorder = Arc::new(Recorder::default());
    let server = HttpServer::new(config)
        .unwrap()
        .with_access_log(recorder.clone());

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(server.run(listener, updates_rx, server_shutdown));

    TestProxy {
        addr,
        recorder,
        shutdown,
        config_updates,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
