//! HTTP Server for PickGok recommendations
//!
//! # Endpoints
//!
//! - `POST /recommend` - Nearest tracks for a seed track
//! - `GET /health` - Readiness and loaded resource counts

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::RecommendService;

/// Shared application state
pub struct AppState {
    pub service: RecommendService,
}

impl AppState {
    pub fn new(service: RecommendService) -> Arc<Self> {
        Arc::new(Self { service })
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok" once resources are published, "loading" before
    pub status: String,
    pub tracks: usize,
    pub vectors: usize,
    pub dimensions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
}

/// POST /recommend
///
/// The body is taken raw so readiness is reported before any parsing.
async fn recommend(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    match state.service.handle(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.service.snapshot() {
        Ok(resources) => {
            let index = resources.index();
            (
                StatusCode::OK,
                Json(HealthResponse {
                    status: "ok".to_string(),
                    tracks: resources.mapping().len(),
                    vectors: index.len(),
                    dimensions: index.dim(),
                    metric: Some(index.metric().to_string()),
                }),
            )
        }
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "loading".to_string(),
                tracks: 0,
                vectors: 0,
                dimensions: 0,
                metric: None,
            }),
        ),
    }
}

/// Create the axum router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/recommend", post(recommend))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the server
pub async fn serve(state: Arc<AppState>, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let router = create_router(state);

    tracing::info!("Starting PickGok AI server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
