use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::metrics::encode_metrics;
use crate::status::LinkStatus;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub channel: String,
    pub market: String,
    pub relay: String,
}

/// Shared state for health endpoints
#[derive(Clone)]
pub struct ServerState {
    pub channel: String,
    pub status: Arc<LinkStatus>,
}

impl ServerState {
    pub fn new(channel: impl Into<String>, status: Arc<LinkStatus>) -> Self {
        Self {
            channel: channel.into(),
            status,
        }
    }

    fn response(&self, status: &str) -> HealthResponse {
        HealthResponse {
            status: status.to_string(),
            channel: self.channel.clone(),
            market: self.status.market().to_string(),
            relay: self.status.relay().to_string(),
        }
    }
}

/// Health endpoint - always returns 200 if server is running
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(state.response("ok"))
}

/// Ready endpoint - returns 200 only while both links are open
async fn ready(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    if state.status.both_open() {
        (StatusCode::OK, Json(state.response("ready")))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(state.response("not_ready")),
        )
    }
}

/// Prometheus text exposition
async fn metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            e.to_string(),
        ),
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

/// Run the health server
pub async fn run_server(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
