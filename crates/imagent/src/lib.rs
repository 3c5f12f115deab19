// imagent - AI Image Generation Library
// Style presets, parameter validation, a generation facade over a pluggable
// diffusion backend, and a file-based history of generated images

mod preview;
mod stable_diffusion;

pub mod error;
pub mod generation;
pub mod history;
pub mod image_utils;
pub mod params;
pub mod styles;

pub use error::{ImageGenError, Result};
pub use generation::{GenerationFacade, GenerationMode, GenerationResult};
pub use history::{DirectoryHistory, GenerationMetadata, HistoryRecord, HistoryStore};
pub use params::{GenerationLimits, NumberInput, RawParams, ResolvedParameters};
pub use preview::PreviewGenerator;
pub use stable_diffusion::{DevicePreference, LoadOptions, StableDiffusionGenerator, StableDiffusionVersion};
pub use styles::{Style, StylePreset};

use image::{ImageBuffer, Rgb, RgbImage};
use std::io::Cursor;

/// Source image and strength for image-to-image generation
#[derive(Debug, Clone)]
pub struct InitImage {
    /// RGB image already resized to the requested output dimensions
    pub image: RgbImage,

    /// How much to alter the source (0.0 keeps it, 1.0 replaces it)
    pub strength: f64,
}

/// Everything a backend needs for one pipeline call
#[derive(Debug, Clone)]
pub struct ImageGenConfig {
    /// Final (styled) prompt
    pub prompt: String,

    /// Width of the generated image (must be multiple of 8)
    pub width: usize,

    /// Height of the generated image (must be multiple of 8)
    pub height: usize,

    /// Number of inference steps (more steps = better quality but slower)
    pub num_steps: usize,

    /// Classifier-free guidance scale
    pub guidance_scale: f64,

    /// Seed for the backend's noise; identical seeds reproduce identical images
    pub seed: u64,

    /// Present for image-to-image
    pub init_image: Option<InitImage>,
}

impl ImageGenConfig {
    pub fn from_resolved(params: &ResolvedParameters, init_image: Option<InitImage>) -> Self {
        Self {
            prompt: params.final_prompt.clone(),
            width: params.width as usize,
            height: params.height as usize,
            num_steps: params.steps as usize,
            guidance_scale: params.guidance_scale,
            seed: params.seed,
            init_image,
        }
    }

    pub(crate) fn check_dimensions(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.width % 8 != 0 || self.height % 8 != 0 {
            return Err(ImageGenError::InvalidConfig(
                "Width and height must be non-zero multiples of 8".into(),
            ));
        }
        Ok(())
    }
}

/// Result of image generation
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    /// Image data as RGB bytes
    pub data: Vec<u8>,

    /// Image width
    pub width: u32,

    /// Image height
    pub height: u32,

    /// Prompt used to generate the image
    pub prompt: String,

    /// Seed used for generation
    pub seed: u64,
}

impl GeneratedImage {
    fn to_buffer(&self) -> Result<RgbImage> {
        ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| ImageGenError::ImageProcessing("Failed to create image buffer".into()))
    }

    /// Encode as PNG bytes
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let img = self.to_buffer()?;
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Save the image to a file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        self.to_buffer()?
            .save(path)
            .map_err(|e| ImageGenError::ImageProcessing(e.to_string()))?;

        Ok(())
    }
}

/// The diffusion pipeline capability: one blocking call per image
pub trait ImageGenerator {
    /// Generate an image from the given configuration
    fn generate(&mut self, config: &ImageGenConfig) -> Result<GeneratedImage>;

    /// Short backend name for logs and the health endpoint
    fn name(&self) -> &str;
}
