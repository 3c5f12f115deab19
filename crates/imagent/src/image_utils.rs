// Image helpers - decoding uploads and fitting them to pipeline dimensions

use crate::params::GenerationLimits;
use crate::{ImageGenError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

/// Decode an uploaded image, rejecting empty or zero-sized input
pub fn decode_source_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(ImageGenError::InvalidSourceImage("no image data uploaded".into()));
    }

    let image = image::load_from_memory(bytes)
        .map_err(|e| ImageGenError::InvalidSourceImage(e.to_string()))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(ImageGenError::InvalidSourceImage(format!(
            "image has zero size ({}x{})",
            image.width(),
            image.height()
        )));
    }

    Ok(image)
}

/// Clamp both dimensions into the resolution bounds, rounded down to a multiple of 8
pub fn validate_dimensions(width: u32, height: u32, limits: &GenerationLimits) -> (u32, u32) {
    (
        limits.clamp_dimension(width as i64),
        limits.clamp_dimension(height as i64),
    )
}

/// Convert to RGB and resize to valid pipeline dimensions when needed
pub fn prepare_source_image(image: DynamicImage, limits: &GenerationLimits) -> RgbImage {
    let (width, height) = validate_dimensions(image.width(), image.height(), limits);
    let rgb = image.to_rgb8();

    if rgb.dimensions() == (width, height) {
        return rgb;
    }

    tracing::debug!(
        from_width = rgb.width(),
        from_height = rgb.height(),
        width,
        height,
        "Resizing source image"
    );
    image::imageops::resize(&rgb, width, height, FilterType::Lanczos3)
}
