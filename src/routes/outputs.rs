use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{routing::get, Router};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

fn content_type(filename: &str) -> &'static str {
    if filename.ends_with(".json") {
        "application/json"
    } else {
        "image/png"
    }
}

/// GET /outputs/{filename} -- a stored image or sidecar, by plain filename.
async fn get_output(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    let path = state
        .history
        .resolve_file(&filename)
        .ok_or_else(|| AppError::NotFound(format!("No stored file named {filename}")))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::InternalError(format!("reading {}: {e}", path.display())))?;

    Ok(([(header::CONTENT_TYPE, content_type(&filename))], bytes))
}

/// Mount the stored-file route (root level, not under `/api`).
pub fn router() -> Router<AppState> {
    Router::new().route("/outputs/{filename}", get(get_output))
}
