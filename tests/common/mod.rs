//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;

use gatewall::config::GuardConfig;
use gatewall::{protect, Guard, GuardHandle};

/// Spawn a guarded echo app on an ephemeral port and return its base URL.
#[allow(dead_code)]
pub async fn spawn_guarded_app(config: GuardConfig) -> String {
    let guard = Guard::builder(config).build().await;
    spawn_guard(guard).await
}

/// Spawn a pre-built guard in front of the echo app.
#[allow(dead_code)]
pub async fn spawn_guard(guard: Arc<Guard>) -> String {
    let handle = GuardHandle::new(guard);
    let app = Router::new()
        .route("/", any(|| async { "OK" }))
        .route("/{*path}", any(|| async { "OK" }));
    let router = protect(handle, app);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    format!("http://{}", addr)
}

/// A base config with proxy-header trust on, so tests can pick client IPs
/// per request via `x-forwarded-for`.
#[allow(dead_code)]
pub fn test_config() -> GuardConfig {
    let mut config = GuardConfig::default();
    config.trust_proxy_header = true;
    // keep default rate limiting out of the way unless a test wants it
    config.active_defense.rate_limit.enabled = false;
    config.logging.enabled = false;
    config
}

/// Send a GET as the given client IP.
#[allow(dead_code)]
pub async fn get_as(base_url: &str, path: &str, ip: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("{}{}", base_url, path))
        .header("x-forwarded-for", ip)
        .send()
        .await
        .unwrap()
}

/// Start a mock sink that records every JSON body POSTed to it.
#[allow(dead_code)]
pub async fn start_capture_sink() -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
    let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let state = received.clone();

    let app = Router::new().route(
        "/{*path}",
        any(
            move |axum::extract::Json(body): axum::extract::Json<serde_json::Value>| {
                let state = state.clone();
                async move {
                    state.lock().unwrap().push(body);
                    "OK"
                }
            },
        ),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), received)
}

/// Start a mock server answering every path with a fixed text body.
#[allow(dead_code)]
pub async fn start_text_server(body: &'static str) -> String {
    let app = Router::new()
        .route("/", any(move || async move { body }))
        .route("/{*path}", any(move || async move { body }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}
