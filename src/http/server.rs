//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the data-plane router: probes plus the gateway fallback
//! - Wire up middleware (tracing, timeout, body limit)
//! - Serve data and control planes with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ListenerConfig;
use crate::gateway::Coordinator;
use crate::registry::ServiceRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub registry: Arc<ServiceRegistry>,
}

/// Data-plane HTTP server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, listener: &ListenerConfig, request_timeout: Duration) -> Self {
        let router = Self::build_router(state, listener, request_timeout);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, listener: &ListenerConfig, request_timeout: Duration) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/ready", get(ready))
            .fallback(gateway_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(listener.max_body_bytes))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until the shutdown broadcast fires.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        serve(listener, self.router, shutdown, "data plane").await
    }
}

/// Serve `router` with connect info until the shutdown broadcast fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
    name: &'static str,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, listener = name, "HTTP server starting");

    let app = router.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!(listener = name, "HTTP server stopped");
    Ok(())
}

async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.coordinator.handle(request).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn ready(State(state): State<AppState>) -> Response {
    match state.registry.ping().await {
        Ok(()) => Json(json!({ "status": "ready" })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not_ready", "reason": e.to_string() })),
            )
                .into_response()
        }
    }
}
