//! Integration tests for the firmware relay: a mock appliance is stood up
//! on an ephemeral port and the relay is driven through real HTTP.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use opn_relay::RelayServer;
use opn_relay::config::{Config, StaticFileConfig, UpstreamConfig};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
struct SeenRequest {
    method: String,
    path: String,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

/// Starts a single-purpose mock appliance that answers every request with
/// the given status and body, recording what it saw.
async fn spawn_mock_upstream(
    status: StatusCode,
    response_body: &'static str,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let seen = seen.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let seen = seen.clone();
                    async move {
                        let (parts, body) = req.into_parts();
                        let body_bytes = body.collect().await.unwrap().to_bytes();
                        seen.lock().unwrap().push(SeenRequest {
                            method: parts.method.to_string(),
                            path: parts.uri.path().to_string(),
                            authorization: header(&parts.headers, "authorization"),
                            content_type: header(&parts.headers, "content-type"),
                            body: String::from_utf8_lossy(&body_bytes).to_string(),
                        });

                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from_static(response_body.as_bytes())))
                                .unwrap(),
                        )
                    }
                });

                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

fn header(headers: &hyper::HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(String::from)
}

async fn spawn_relay(upstream_addr: SocketAddr, static_dir: Option<String>) -> SocketAddr {
    let config = Config {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        upstream: UpstreamConfig {
            base_url: format!("http://{}", upstream_addr),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            insecure_tls: false,
            request_timeout_secs: 5,
        },
        static_files: static_dir.map(StaticFileConfig::single),
        private_key: None,
        certificate: None,
        logging: None,
    };

    let server = RelayServer::new(&config).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    addr
}

async fn send(
    method: hyper::Method,
    addr: SocketAddr,
    path: &str,
    body: &'static str,
) -> (StatusCode, String) {
    let client: Client<_, Full<Bytes>> = Client::builder(TokioExecutor::new()).build_http();
    let request = Request::builder()
        .method(method)
        .uri(format!("http://{}{}", addr, path))
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap();

    let response = client.request(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body_bytes).to_string())
}

async fn post(addr: SocketAddr, path: &str) -> (StatusCode, String) {
    send(hyper::Method::POST, addr, path, "").await
}

#[tokio::test]
async fn test_status_renders_four_line_summary() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let upstream = spawn_mock_upstream(
        StatusCode::OK,
        r#"{"status":"ok","version":"1.2","upgrade_available":1,"upgrade_needs_reboot":"no"}"#,
        seen.clone(),
    )
    .await;
    let relay = spawn_relay(upstream, None).await;

    let (status, body) = post(relay, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        "Status: ok\nVersion: 1.2\nUpgrade Available: true\nNeeds Reboot: false"
    );

    let requests = seen.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/api/core/firmware/status");
    assert_eq!(requests[0].authorization.as_deref(), Some("Basic a2V5OnNlY3JldA=="));
    assert_eq!(requests[0].content_type.as_deref(), Some("application/json"));
    assert_eq!(requests[0].body, "{}");
}

#[tokio::test]
async fn test_update_passes_body_through_raw() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let upstream =
        spawn_mock_upstream(StatusCode::OK, r#"{"status":"Firmware update started"}"#, seen.clone()).await;
    let relay = spawn_relay(upstream, None).await;

    let (status, body) = post(relay, "/api/update").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"Firmware update started"}"#);

    let requests = seen.lock().unwrap();
    assert_eq!(requests[0].path, "/api/core/firmware/update");
}

#[tokio::test]
async fn test_upstream_failure_surfaces_status_and_body() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let upstream = spawn_mock_upstream(StatusCode::SERVICE_UNAVAILABLE, "maintenance", seen).await;
    let relay = spawn_relay(upstream, None).await;

    let (status, body) = post(relay, "/api/update").await;
    assert!(!status.is_success());
    assert!(body.contains("503"), "diagnostic should name the upstream status: {}", body);
    assert!(body.contains("maintenance"), "diagnostic should carry the upstream body: {}", body);
}

#[tokio::test]
async fn test_unreachable_upstream_is_a_transport_error() {
    // Grab a port with nothing listening on it.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap();
    drop(listener);

    let relay = spawn_relay(dead_addr, None).await;

    let (status, body) = post(relay, "/api/upgrade").await;
    assert!(!status.is_success());
    assert!(body.contains("transport error"), "unexpected diagnostic: {}", body);
}

#[tokio::test]
async fn test_status_parse_failure_is_surfaced() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let upstream = spawn_mock_upstream(StatusCode::OK, "<html>not json</html>", seen).await;
    let relay = spawn_relay(upstream, None).await;

    let (status, body) = post(relay, "/api/status").await;
    assert!(!status.is_success());
    assert!(body.contains("not valid JSON"), "unexpected diagnostic: {}", body);
}

#[tokio::test]
async fn test_inbound_body_never_reaches_upstream() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let upstream = spawn_mock_upstream(StatusCode::OK, "done", seen.clone()).await;
    let relay = spawn_relay(upstream, None).await;

    let (status, _) = send(
        hyper::Method::POST,
        relay,
        "/api/upgrade",
        r#"{"path":"/api/core/firmware/poweroff"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let requests = seen.lock().unwrap();
    assert_eq!(requests[0].path, "/api/core/firmware/upgrade");
    assert_eq!(requests[0].body, "{}");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let upstream = spawn_mock_upstream(StatusCode::OK, "{}", seen.clone()).await;
    let relay = spawn_relay(upstream, None).await;

    let (status, _) = post(relay, "/api/reboot").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Nothing should have been relayed upstream.
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_static_files_served_alongside_api() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>relay ui</html>").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let upstream = spawn_mock_upstream(StatusCode::OK, "{}", seen).await;
    let relay = spawn_relay(upstream, Some(dir.path().to_str().unwrap().to_string())).await;

    let (status, body) = send(hyper::Method::GET, relay, "/", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<html>relay ui</html>");

    let (status, _) = send(hyper::Method::GET, relay, "/missing.css", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
