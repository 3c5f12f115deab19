// Preview backend - deterministic placeholder images without loading any model

use crate::{GeneratedImage, ImageGenConfig, ImageGenerator, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Offline generator that paints a seed- and prompt-derived pattern.
///
/// Output depends only on the prompt, seed, size and (for image-to-image)
/// the source image and strength, so it doubles as a reproducible stand-in
/// for the real pipeline.
#[derive(Debug, Default)]
pub struct PreviewGenerator {
    generated: u64,
}

impl PreviewGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of images produced so far
    pub fn generated(&self) -> u64 {
        self.generated
    }
}

// FNV-1a, so the pattern changes with the prompt
fn prompt_hash(prompt: &str) -> u64 {
    prompt.bytes().fold(0xcbf29ce484222325u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

impl ImageGenerator for PreviewGenerator {
    fn generate(&mut self, config: &ImageGenConfig) -> Result<GeneratedImage> {
        config.check_dimensions()?;

        tracing::info!(
            seed = config.seed,
            width = config.width,
            height = config.height,
            "Painting preview image"
        );

        let mut rng = StdRng::seed_from_u64(config.seed ^ prompt_hash(&config.prompt));
        let width = config.width as u32;
        let height = config.height as u32;
        let tint: [f32; 3] = [rng.gen(), rng.gen(), rng.gen()];

        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let fx = x as f32 / width as f32;
                let fy = y as f32 / height as f32;
                let noise = rng.gen::<f32>() * 40.0;
                let pattern = [
                    fx * 255.0 * tint[0] + noise,
                    fy * 255.0 * tint[1] + noise,
                    (1.0 - fx) * 255.0 * tint[2] + noise,
                ];

                let pixel = match &config.init_image {
                    Some(init) => {
                        let src = init.image.get_pixel(x, y).0;
                        let s = init.strength as f32;
                        [
                            src[0] as f32 * (1.0 - s) + pattern[0] * s,
                            src[1] as f32 * (1.0 - s) + pattern[1] * s,
                            src[2] as f32 * (1.0 - s) + pattern[2] * s,
                        ]
                    }
                    None => pattern,
                };

                data.extend(pixel.iter().map(|v| v.clamp(0.0, 255.0) as u8));
            }
        }

        self.generated += 1;

        Ok(GeneratedImage {
            data,
            width,
            height,
            prompt: config.prompt.clone(),
            seed: config.seed,
        })
    }

    fn name(&self) -> &str {
        "preview"
    }
}
