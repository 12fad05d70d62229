use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use quotes::QuoteStore;

use crate::metrics::encode_metrics;
use crate::shutdown::cancelled;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub batches: usize,
}

/// Shared state for health endpoints
#[derive(Clone)]
pub struct ServerState {
    pub batches: usize,
    pub store: Arc<dyn QuoteStore>,
}

impl ServerState {
    pub fn new(batches: usize, store: Arc<dyn QuoteStore>) -> Self {
        Self { batches, store }
    }
}

/// Health endpoint - always returns 200 if server is running
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        batches: state.batches,
    })
}

/// Ready endpoint - returns 200 only when the quote store answers
async fn ready(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    let (status_code, status) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, "Quote store not reachable");
            (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
        }
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            batches: state.batches,
        }),
    )
}

/// Prometheus text exposition
async fn metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding error: {}", e),
        )
            .into_response(),
    }
}

/// Create the health server router
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the health server until shutdown
pub async fn run_server(
    listener: TcpListener,
    state: ServerState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancelled(&mut shutdown).await })
        .await
}
