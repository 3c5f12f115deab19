use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use imagent::ImageGenError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`ImageGenError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `imagent`.
    #[error(transparent)]
    Generation(#[from] ImageGenError),

    /// A request body that is not the expected JSON shape.
    #[error(transparent)]
    Json(#[from] JsonRejection),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut field = None;
        let (status, code, message) = match &self {
            AppError::Generation(err) => {
                let (status, code, message) = classify_generation_error(err);
                field = err.field().map(str::to_string);
                (status, code, message)
            }
            AppError::Json(rejection) => (
                rejection.status(),
                "BAD_REQUEST",
                rejection.body_text(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = match field {
            Some(field) => json!({
                "error": message,
                "code": code,
                "field": field,
            }),
            None => json!({
                "error": message,
                "code": code,
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Map a domain error into an HTTP status, error code, and message.
///
/// - Request problems (bad field, unknown style, unusable upload) map to 400.
/// - Pipeline failures map to 500 and keep their cause plus a hint to retry smaller.
/// - Everything else maps to 500 with a sanitized message.
fn classify_generation_error(err: &ImageGenError) -> (StatusCode, &'static str, String) {
    match err {
        ImageGenError::InvalidParameter { .. } | ImageGenError::UnknownStyle(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_PARAMETER", err.to_string())
        }
        ImageGenError::InvalidSourceImage(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_SOURCE_IMAGE", err.to_string())
        }
        ImageGenError::GenerationFailed(cause) => {
            tracing::error!(error = %cause, "Generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "GENERATION_FAILED",
                format!(
                    "{err}. Try a lower resolution or fewer steps and generate again."
                ),
            )
        }
        other => {
            tracing::error!(error = %other, "Internal generation error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
