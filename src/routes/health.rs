use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Name of the loaded pipeline backend, or `busy` while a generation holds it.
    pub backend: String,
    /// Number of images in the history directory.
    pub images: usize,
}

/// GET /health -- returns service status and history size.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend = match state.facade.try_lock() {
        Ok(facade) => facade.backend_name().to_string(),
        Err(_) => "busy".to_string(),
    };

    let history = state.history.clone();
    let images = tokio::task::spawn_blocking(move || history.count())
        .await
        .unwrap_or_default();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend,
        images,
    })
}

/// Mount health check routes (root level, not under `/api`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
