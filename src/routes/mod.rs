pub mod generate;
pub mod health;
pub mod history;
pub mod outputs;
pub mod settings;
pub mod styles;
pub mod ui;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /styles                 list style presets (GET)
/// /settings               generation defaults and bounds (GET)
/// /text2img               generate from a prompt (POST)
/// /img2img                transform an uploaded image (POST)
/// /history                recent generations, newest first (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/styles", get(styles::list_styles))
        .route("/settings", get(settings::get_settings))
        .route("/text2img", post(generate::text_to_image))
        .route("/img2img", post(generate::image_to_image))
        .route("/history", get(history::list_history))
}
