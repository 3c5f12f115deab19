// Generation facade - validated parameters in, pipeline call, result out

use crate::image_utils::{decode_source_image, prepare_source_image};
use crate::params::{self, GenerationLimits, RawParams, ResolvedParameters};
use crate::{GeneratedImage, ImageGenConfig, ImageGenError, ImageGenerator, InitImage, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pipeline a request goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationMode {
    #[serde(rename = "text2img")]
    Text2Img,
    #[serde(rename = "img2img")]
    Img2Img,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Text2Img => "text2img",
            GenerationMode::Img2Img => "img2img",
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished generation, ready to be shown and persisted
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub image: GeneratedImage,
    pub parameters: ResolvedParameters,
    pub mode: GenerationMode,
    pub timestamp: DateTime<Utc>,
}

/// Owns the loaded pipeline and runs one request at a time.
pub struct GenerationFacade {
    generator: Box<dyn ImageGenerator + Send>,
    limits: GenerationLimits,
}

impl GenerationFacade {
    pub fn new(generator: Box<dyn ImageGenerator + Send>, limits: GenerationLimits) -> Self {
        Self { generator, limits }
    }

    pub fn limits(&self) -> &GenerationLimits {
        &self.limits
    }

    pub fn backend_name(&self) -> &str {
        self.generator.name()
    }

    /// Normalize raw parameters and dispatch to the right pipeline
    pub fn run(
        &mut self,
        mode: GenerationMode,
        raw: &RawParams,
        source_image: Option<&[u8]>,
    ) -> Result<GenerationResult> {
        let resolved = params::normalize(raw, &self.limits, mode)?;
        match mode {
            GenerationMode::Text2Img => self.text_to_image(&resolved),
            GenerationMode::Img2Img => self.image_to_image(&resolved, source_image.unwrap_or_default()),
        }
    }

    pub fn text_to_image(&mut self, params: &ResolvedParameters) -> Result<GenerationResult> {
        let config = ImageGenConfig::from_resolved(params, None);
        self.invoke(GenerationMode::Text2Img, params.clone(), &config)
    }

    /// Output dimensions follow the (clamped) source image size.
    pub fn image_to_image(
        &mut self,
        params: &ResolvedParameters,
        source_image: &[u8],
    ) -> Result<GenerationResult> {
        let source = decode_source_image(source_image)?;
        let source = prepare_source_image(source, &self.limits);
        let (width, height) = source.dimensions();

        let strength = self
            .limits
            .clamp_strength(params.strength.unwrap_or(self.limits.defaults.strength));
        let params = ResolvedParameters {
            strength: Some(strength),
            ..params.with_dimensions(width, height)
        };

        let init = InitImage {
            image: source,
            strength,
        };
        let config = ImageGenConfig::from_resolved(&params, Some(init));
        self.invoke(GenerationMode::Img2Img, params, &config)
    }

    fn invoke(
        &mut self,
        mode: GenerationMode,
        params: ResolvedParameters,
        config: &ImageGenConfig,
    ) -> Result<GenerationResult> {
        tracing::info!(
            mode = %mode,
            style = %params.style,
            steps = params.steps,
            guidance_scale = params.guidance_scale,
            width = params.width,
            height = params.height,
            seed = params.seed,
            strength = ?params.strength,
            "Starting generation"
        );
        tracing::debug!("Final prompt: {}", params.final_prompt);

        let image = self.generator.generate(config).map_err(|e| {
            tracing::error!(error = %e, "Pipeline failed");
            ImageGenError::GenerationFailed(Box::new(e))
        })?;

        tracing::info!(seed = params.seed, "Generation complete");

        Ok(GenerationResult {
            image,
            parameters: params,
            mode,
            timestamp: Utc::now(),
        })
    }
}
