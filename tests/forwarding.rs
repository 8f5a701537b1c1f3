//! End-to-end forwarding tests against real backends.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::routing::get;
use axum::Router;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use prefix_proxy::config::RouteConfig;
use prefix_proxy::http::{ForwardLimits, ForwardingEngine};
use prefix_proxy::routing::RouteTable;
use tokio::sync::Notify;

mod common;

use common::{client, config_with_routes, spawn_backend, spawn_proxy, Recorder};

async fn echo_headers(request: Request) -> String {
    let headers = request.headers();
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    format!(
        "uri={}\nhost={}\nx-forwarded-for={}\nx-real-ip={}\nx-forwarded-proto={}\nx-secret={}\nproxy-authorization={}\n",
        request.uri(),
        get("host"),
        get("x-forwarded-for"),
        get("x-real-ip"),
        get("x-forwarded-proto"),
        get("x-secret"),
        get("proxy-authorization"),
    )
}

async fn body_length(body: Bytes) -> String {
    body.len().to_string()
}

#[tokio::test]
async fn relays_status_body_and_strips_hop_by_hop() {
    let backend = common::start_raw_backend(
        "HTTP/1.1 201 Created\r\n\
         Content-Length: 7\r\n\
         Connection: close, X-Drop\r\n\
         Keep-Alive: timeout=5\r\n\
         Proxy-Authenticate: Basic\r\n\
         X-Drop: 1\r\n\
         X-Custom: yes\r\n\
         \r\n\
         created",
    )
    .await;
    let proxy = spawn_proxy(config_with_routes(&[("/service1", backend)])).await;

    let res = client()
        .get(proxy.url("/service1/items"))
        .send()
        .await
        .expect("Proxy unreachable");

    assert_eq!(res.status(), 201);
    let headers = res.headers().clone();
    assert_eq!(headers["x-custom"], "yes");
    assert!(headers.get("keep-alive").is_none());
    assert!(headers.get("proxy-authenticate").is_none());
    assert!(headers.get("x-drop").is_none());
    assert_eq!(res.text().await.unwrap(), "created");

    let records = proxy.recorder.wait_for(1).await;
    assert_eq!(records[0].status, 201);
    assert_eq!(records[0].response_size, 7);
    assert_eq!(records[0].backend, format!("http://{backend}"));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn rewrites_proxy_headers_and_path() {
    let backend = spawn_backend(Router::new().fallback(echo_headers)).await;
    let proxy = spawn_proxy(config_with_routes(&[("/service1", backend)])).await;

    let body = client()
        .get(proxy.url("/service1/api/users?x=1&y=2"))
        .header("x-forwarded-for", "10.0.0.1")
        .header("connection", "x-secret")
        .header("x-secret", "s3cr3t")
        .header("proxy-authorization", "Basic Zm9vOmJhcg==")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("uri=/api/users?x=1&y=2\n"), "{body}");
    assert!(body.contains(&format!("host={}\n", proxy.addr)), "{body}");
    assert!(body.contains("x-forwarded-for=10.0.0.1, 127.0.0.1\n"), "{body}");
    assert!(body.contains("x-real-ip=127.0.0.1\n"), "{body}");
    assert!(body.contains("x-forwarded-proto=http\n"), "{body}");
    assert!(body.contains("x-secret=-\n"), "{body}");
    assert!(body.contains("proxy-authorization=-\n"), "{body}");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn exact_prefix_maps_to_backend_root() {
    let backend = spawn_backend(Router::new().fallback(echo_headers)).await;
    let proxy = spawn_proxy(config_with_routes(&[("/service1", backend)])).await;

    let body = client()
        .get(proxy.url("/service1"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("uri=/\n"), "{body}");

    let res = client().get(proxy.url("/service10")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn routes_on_percent_decoded_path() {
    let backend = spawn_backend(Router::new().fallback(echo_headers)).await;
    let proxy = spawn_proxy(config_with_routes(&[("/service1", backend)])).await;
    let c = client();

    let cases = [
        ("/service%31/x", "uri=/x\n"),
        ("/service1%2Fx", "uri=/x\n"),
        ("/service1/a%20b", "uri=/a%20b\n"),
        ("/service1/caf%C3%A9?q=%31", "uri=/caf%C3%A9?q=%31\n"),
    ];
    for (path, expected) in cases {
        let res = c.get(proxy.url(path)).send().await.unwrap();
        assert_eq!(res.status(), 200, "{path}");
        let body = res.text().await.unwrap();
        assert!(body.contains(expected), "{path}: {body}");
    }

    let res = c.get(proxy.url("/service%310")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "no route for /service10\n");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn longest_prefix_wins() {
    let short = spawn_backend(Router::new().fallback(|| async { "short" })).await;
    let long = spawn_backend(Router::new().fallback(|| async { "long" })).await;
    let proxy = spawn_proxy(config_with_routes(&[("/api", short), ("/api/v2", long)])).await;

    let c = client();
    let text = |path: &'static str| {
        let c = c.clone();
        let url = proxy.url(path);
        async move { c.get(url).send().await.unwrap().text().await.unwrap() }
    };

    assert_eq!(text("/api/v2/users").await, "long");
    assert_eq!(text("/api/v1/users").await, "short");
    assert_eq!(text("/api/v2").await, "long");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn unmatched_path_is_404_with_path_in_body() {
    let proxy = spawn_proxy(config_with_routes(&[])).await;

    let res = client().get(proxy.url("/nowhere/else")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "no route for /nowhere/else\n");

    let records = proxy.recorder.wait_for(1).await;
    assert_eq!(records[0].status, 404);
    assert_eq!(records[0].backend, "");
    assert_eq!(records[0].path, "/nowhere/else");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn refused_connection_is_502() {
    let backend = common::closed_port().await;
    let proxy = spawn_proxy(config_with_routes(&[("/down", backend)])).await;

    let res = client().get(proxy.url("/down/x")).send().await.unwrap();
    assert_eq!(res.status(), 502);
    assert_eq!(res.text().await.unwrap(), "backend unavailable\n");

    let records = proxy.recorder.wait_for(1).await;
    assert_eq!(records[0].status, 502);
    assert_eq!(records[0].backend, format!("http://{backend}"));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn silent_backend_is_504_after_deadline() {
    let backend = common::start_hanging_backend().await;
    let mut config = config_with_routes(&[("/slow", backend)]);
    config.timeouts.dispatch_secs = 1;
    let proxy = spawn_proxy(config).await;

    let started = std::time::Instant::now();
    let res = client().get(proxy.url("/slow")).send().await.unwrap();
    assert_eq!(res.status(), 504);
    assert_eq!(res.text().await.unwrap(), "backend timeout\n");
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(10));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn declared_oversize_body_is_413_without_contacting_backend() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .fallback(|State(hits): State<Arc<AtomicUsize>>| async move {
            hits.fetch_add(1, Ordering::SeqCst);
            "reached"
        })
        .with_state(hits.clone());
    let backend = spawn_backend(app).await;

    let mut config = config_with_routes(&[("/upload", backend)]);
    config.limits.max_body_bytes = 10;
    let proxy = spawn_proxy(config).await;

    let res = client()
        .post(proxy.url("/upload"))
        .body(vec![b'x'; 11])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 413);
    assert_eq!(res.text().await.unwrap(), "request body too large\n");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let res = client()
        .post(proxy.url("/upload"))
        .body(vec![b'x'; 10])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    proxy.shutdown.trigger();
}

fn chunked_request(path: &str, chunks: Vec<&'static [u8]>) -> axum::http::Request<Body> {
    let frames = chunks
        .into_iter()
        .map(|c| Ok::<_, std::io::Error>(Frame::data(Bytes::from_static(c))));
    axum::http::Request::builder()
        .method("POST")
        .uri(path)
        .header("host", "proxy.test")
        .body(Body::new(StreamBody::new(futures_util::stream::iter(frames))))
        .unwrap()
}

async fn engine_for(backend: SocketAddr, max_body_bytes: u64, recorder: Arc<Recorder>) -> ForwardingEngine {
    let table = RouteTable::from_config(&[RouteConfig::new("/upload", format!("http://{backend}"))])
        .unwrap();
    ForwardingEngine::new(
        Arc::new(table),
        ForwardLimits {
            max_body_bytes,
            dispatch_timeout: Duration::from_secs(5),
        },
        recorder,
    )
}

#[tokio::test]
async fn streamed_body_over_ceiling_is_413() {
    let backend = spawn_backend(Router::new().fallback(body_length)).await;
    let recorder = Arc::new(Recorder::default());
    let engine = engine_for(backend, 8, recorder.clone()).await;

    let request = chunked_request("/upload", vec![&b"abcd"[..], &b"efgh"[..], &b"i"[..]]);
    let response = engine.handle(request, "127.0.0.1:5000".parse().unwrap()).await;
    assert_eq!(response.status(), 413);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"request body too large\n");

    let records = recorder.wait_for(1).await;
    assert_eq!(records[0].status, 413);
    assert_eq!(records[0].client_ip, "127.0.0.1");
}

#[tokio::test]
async fn streamed_body_at_ceiling_is_forwarded() {
    let backend = spawn_backend(Router::new().fallback(body_length)).await;
    let recorder = Arc::new(Recorder::default());
    let engine = engine_for(backend, 8, recorder.clone()).await;

    let request = chunked_request("/upload", vec![&b"abcd"[..], &b"efgh"[..]]);
    let response = engine.handle(request, "127.0.0.1:5000".parse().unwrap()).await;
    assert_eq!(response.status(), 200);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"8");

    let records = recorder.wait_for(1).await;
    assert_eq!(records[0].status, 200);
    // No Content-Length was declared.
    assert_eq!(records[0].request_size, 0);
    assert_eq!(records[0].response_size, 1);
}

#[tokio::test]
async fn response_streams_without_buffering() {
    let release = Arc::new(Notify::new());
    let app = Router::new()
        .route(
            "/events",
            get(|State(release): State<Arc<Notify>>| async move {
                let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(2);
                tokio::spawn(async move {
                    let _ = tx.send(Ok(Bytes::from_static(b"first"))).await;
                    release.notified().await;
                    let _ = tx.send(Ok(Bytes::from_static(b"second"))).await;
                });
                Body::from_stream(futures_util::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                }))
            }),
        )
        .with_state(release.clone());
    let backend = spawn_backend(app).await;
    let proxy = spawn_proxy(config_with_routes(&[("/stream", backend)])).await;

    let mut res = client().get(proxy.url("/stream/events")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    let first = tokio::time::timeout(Duration::from_secs(5), res.chunk())
        .await
        .expect("first chunk held back")
        .unwrap()
        .unwrap();
    assert_eq!(&first[..], b"first");

    release.notify_one();
    let mut rest = Vec::new();
    while let Some(chunk) = res.chunk().await.unwrap() {
        rest.extend_from_slice(&chunk);
    }
    assert_eq!(rest, b"second");

    let records = proxy.recorder.wait_for(1).await;
    assert_eq!(records[0].response_size, 11);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn health_is_local_and_unrecorded() {
    let backend = spawn_backend(Router::new().fallback(|| async { "backend" })).await;
    let proxy = spawn_proxy(config_with_routes(&[("/", backend), ("/health", backend)])).await;

    let res = client().get(proxy.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "OK");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(proxy.recorder.records().is_empty());

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn one_record_per_request() {
    let backend = spawn_backend(Router::new().fallback(|| async { "hello" })).await;
    let proxy = spawn_proxy(config_with_routes(&[("/svc", backend)])).await;

    let c = client();
    for i in 0..5 {
        let res = c
            .post(proxy.url(&format!("/svc/{i}")))
            .body("ping")
            .send()
            .await
            .unwrap();
        assert_eq!(res.text().await.unwrap(), "hello");
    }

    let records = proxy.recorder.wait_for(5).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(proxy.recorder.records().len(), 5);

    for record in &records {
        assert_eq!(record.method, "POST");
        assert_eq!(record.status, 200);
        assert_eq!(record.client_ip, "127.0.0.1");
        assert_eq!(record.request_size, 4);
        assert_eq!(record.response_size, 5);
    }
    let ids: HashSet<_> = records.iter().map(|r| r.request_id).collect();
    assert_eq!(ids.len(), 5);

    proxy.shutdown.trigger();
}
