use axum::extract::State;
use axum::Json;
use imagent::params::{GenerationBounds, GenerationDefaults};
use serde::Serialize;

use crate::state::AppState;

/// What the page needs to build its form controls.
#[derive(Serialize)]
pub struct SettingsResponse {
    pub defaults: GenerationDefaults,
    pub bounds: GenerationBounds,
    /// Size of the recent-generations gallery.
    pub recent_limit: usize,
}

/// GET /api/settings -- configured defaults and bounds.
pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    let limits = &state.config.generation;
    Json(SettingsResponse {
        defaults: limits.defaults.clone(),
        bounds: limits.bounds.clone(),
        recent_limit: state.config.server.recent_limit,
    })
}
