//! Gateway server setup.
//!
//! # Responsibilities
//! - Build an Axum router with the guard mounted in front of the handlers
//! - Bind the listener with per-connection peer addresses
//! - Serve with graceful shutdown, closing the guard's background tasks

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::guard::GuardHandle;
use crate::http::middleware::guard_middleware;

/// Mount the guard in front of an application router.
///
/// The guard layer runs before any route; denied requests never reach the
/// application.
pub fn protect(handle: GuardHandle, app: Router) -> Router {
    app.layer(middleware::from_fn_with_state(handle, guard_middleware))
        .layer(TraceLayer::new_for_http())
}

/// HTTP server for the gateway binary.
pub struct GuardServer {
    router: Router,
    handle: GuardHandle,
}

impl GuardServer {
    /// Wrap the given application router with the guard.
    pub fn new(handle: GuardHandle, app: Router) -> Self {
        let timeout = handle.load().config().listener.request_timeout_secs;
        let router =
            protect(handle.clone(), app).layer(TimeoutLayer::new(Duration::from_secs(timeout)));
        Self { router, handle }
    }

    /// A server fronting the built-in placeholder handler. The binary uses
    /// this; real deployments pass their own router to [`GuardServer::new`].
    pub fn with_echo_handler(handle: GuardHandle) -> Self {
        let app = Router::new()
            .route("/", any(echo_handler))
            .route("/{*path}", any(echo_handler));
        Self::new(handle, app)
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.handle.load().close();
        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Placeholder application handler: echoes method and path as JSON.
async fn echo_handler(request: Request<Body>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ok",
        "method": request.method().as_str(),
        "path": request.uri().path(),
    });
    axum::Json(body)
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
