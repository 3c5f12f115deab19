use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use imagent::{DirectoryHistory, GenerationFacade, GenerationLimits, PreviewGenerator};
use imagent_studio::{build_app_router, AppState, BackendKind, StudioConfig};
use tower::ServiceExt;

/// Build a test `StudioConfig` pointing at `output_dir`, using the preview backend.
pub fn test_config(output_dir: &Path) -> StudioConfig {
    let mut config = StudioConfig::default();
    config.server.port = 0;
    config.model.backend = BackendKind::Preview;
    config.storage.output_dir = output_dir.to_path_buf();
    config
}

/// Build the full application router over a fresh preview pipeline.
///
/// Uses the same `build_app_router` as the binary so tests exercise the
/// production middleware stack.
pub fn build_test_app(output_dir: &Path) -> Router {
    let config = test_config(output_dir);
    let facade = GenerationFacade::new(Box::new(PreviewGenerator::new()), GenerationLimits::default());
    let history = Arc::new(DirectoryHistory::new(output_dir));
    build_app_router(AppState::new(config, facade, history))
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// A solid-colour PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([30, 60, 90]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}
