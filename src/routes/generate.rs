use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use imagent::history::SIDECAR_TIMESTAMP_FORMAT;
use imagent::{GenerationMode, GenerationResult, ImageGenError, RawParams, Style};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::routes::history::{recent_entries, HistoryEntry};
use crate::state::AppState;

/// Body of `POST /api/img2img`.
#[derive(Debug, Deserialize)]
pub struct ImageToImageRequest {
    /// Source image as base64, optionally wrapped in a `data:` URL.
    #[serde(default)]
    pub image: String,
    #[serde(flatten)]
    pub params: RawParams,
}

/// Parameters the image was actually generated with.
#[derive(Debug, Serialize)]
pub struct ResolvedSummary {
    pub prompt: String,
    pub styled_prompt: String,
    pub style: Style,
    pub mode: GenerationMode,
    pub steps: u32,
    pub guidance_scale: f64,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    pub timestamp: String,
}

impl From<&GenerationResult> for ResolvedSummary {
    fn from(result: &GenerationResult) -> Self {
        let p = &result.parameters;
        Self {
            prompt: p.prompt.clone(),
            styled_prompt: p.final_prompt.clone(),
            style: p.style,
            mode: result.mode,
            steps: p.steps,
            guidance_scale: p.guidance_scale,
            width: p.width,
            height: p.height,
            seed: p.seed,
            strength: p.strength,
            timestamp: result.timestamp.format(SIDECAR_TIMESTAMP_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    /// PNG as a `data:image/png;base64,` URL.
    pub image: String,
    pub parameters: ResolvedSummary,
    /// Stored filename; absent when persisting failed.
    pub filename: Option<String>,
    /// Set when the image could not be saved to history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Refreshed recent-generations gallery.
    pub recent: Vec<HistoryEntry>,
    pub total: usize,
}

/// Strip an optional `data:<mime>;base64,` prefix and decode.
fn decode_upload(encoded: &str) -> Result<Vec<u8>, ImageGenError> {
    let trimmed = encoded.trim();
    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| ImageGenError::InvalidSourceImage("malformed data URL".into()))?,
        None => trimmed,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| ImageGenError::InvalidSourceImage(format!("not valid base64: {e}")))
}

/// Run one request on the shared pipeline, persist it and build the response.
///
/// The facade lock is held only for the pipeline call; the history write
/// happens after it is released.
async fn run_generation(
    state: AppState,
    mode: GenerationMode,
    raw: RawParams,
    source: Option<Vec<u8>>,
) -> AppResult<Json<GenerationResponse>> {
    let facade = state.facade.clone().lock_owned().await;
    let history = state.history.clone();

    let (result, png, saved) = tokio::task::spawn_blocking(move || {
        let mut facade = facade;
        let result = facade.run(mode, &raw, source.as_deref())?;
        drop(facade);

        let png = result.image.encode_png()?;
        let saved = history.save_png(&result, &png);
        Ok::<_, ImageGenError>((result, png, saved))
    })
    .await
    .map_err(|e| AppError::InternalError(format!("generation task panicked: {e}")))??;

    let mut parameters = ResolvedSummary::from(&result);
    let (filename, warning) = match saved {
        Ok(record) => {
            // The store may have moved the timestamp to find a free name
            if let Some(metadata) = record.metadata.as_ref() {
                parameters.timestamp = metadata.timestamp.clone();
            }
            (Some(record.filename()), None)
        }
        Err(e) => {
            tracing::error!(error = %e, "Could not persist generation");
            (None, Some(format!("The image was not saved to history: {e}")))
        }
    };

    let (recent, total) =
        recent_entries(state.history.clone(), state.config.server.recent_limit).await?;

    Ok(Json(GenerationResponse {
        image: format!("data:image/png;base64,{}", STANDARD.encode(&png)),
        parameters,
        filename,
        warning,
        recent,
        total,
    }))
}

/// POST /api/text2img -- generate from a prompt.
pub async fn text_to_image(
    State(state): State<AppState>,
    body: Result<Json<RawParams>, JsonRejection>,
) -> AppResult<Json<GenerationResponse>> {
    let Json(raw) = body?;
    run_generation(state, GenerationMode::Text2Img, raw, None).await
}

/// POST /api/img2img -- transform an uploaded image.
pub async fn image_to_image(
    State(state): State<AppState>,
    body: Result<Json<ImageToImageRequest>, JsonRejection>,
) -> AppResult<Json<GenerationResponse>> {
    let Json(request) = body?;
    let source = decode_upload(&request.image)?;
    run_generation(state, GenerationMode::Img2Img, request.params, Some(source)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_base64() {
        assert_eq!(decode_upload("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_data_url() {
        assert_eq!(
            decode_upload("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_upload("data:image/png;base64"),
            Err(ImageGenError::InvalidSourceImage(_))
        ));
        assert!(matches!(
            decode_upload("!!not base64!!"),
            Err(ImageGenError::InvalidSourceImage(_))
        ));
    }

    #[test]
    fn test_empty_upload_decodes_to_nothing() {
        assert!(decode_upload("").unwrap().is_empty());
    }
}
