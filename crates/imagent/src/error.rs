// Error types for imagent

use std::path::PathBuf;
use thiserror::Error;

/// Result type for imagent operations
pub type Result<T> = std::result::Result<T, ImageGenError>;

/// Errors that can occur while validating, generating or persisting images
#[derive(Error, Debug)]
pub enum ImageGenError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Model loading error: {0}")]
    ModelLoading(String),

    #[error("Tokenization error: {0}")]
    Tokenization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A request field could not be coerced to the expected type.
    #[error("Invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("Unknown style: {0}")]
    UnknownStyle(String),

    /// The uploaded source image is empty or cannot be decoded.
    #[error("Invalid input image: {0}")]
    InvalidSourceImage(String),

    /// The pipeline itself failed; the cause is kept for display.
    #[error("Generation failed: {0}")]
    GenerationFailed(#[source] Box<ImageGenError>),

    #[error("Could not write {}: {source}", path.display())]
    HistoryWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HuggingFace Hub error: {0}")]
    HfHub(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImageGenError {
    pub fn invalid_parameter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ImageGenError::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Field name for `InvalidParameter`, if this is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ImageGenError::InvalidParameter { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<image::ImageError> for ImageGenError {
    fn from(err: image::ImageError) -> Self {
        ImageGenError::ImageProcessing(err.to_string())
    }
}
