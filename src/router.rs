//! Shared application router builder.
//!
//! Provides [`build_app_router`] so both the server binary and the
//! integration tests (`tests/common/mod.rs`) use the exact same middleware
//! stack.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::routes;
use crate::state::AppState;

/// Build the full application [`Router`] with all middleware layers.
///
/// The middleware stack is applied bottom-up:
///
/// 1. Request body limit (sized for base64 image uploads)
/// 2. Structured request/response tracing
/// 3. Panic recovery (catch panics, return 500)
///
/// No request timeout: a generation holds the request until the pipeline
/// returns.
pub fn build_app_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes();

    Router::new()
        // Page and health check at root level.
        .merge(routes::ui::router())
        .merge(routes::health::router())
        .merge(routes::outputs::router())
        // JSON API.
        .nest("/api", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500.
        .layer(CatchPanicLayer::new())
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Uploaded images arrive base64-encoded inside JSON.
        .layer(DefaultBodyLimit::max(body_limit))
        // Shared state.
        .with_state(state)
}
