// Stable Diffusion implementation using Candle

use crate::{GeneratedImage, ImageGenConfig, ImageGenError, ImageGenerator, Result};
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_transformers::models::stable_diffusion::{
    self, clip::ClipTextTransformer, unet_2d::UNet2DConditionModel, vae::AutoEncoderKL,
    StableDiffusionConfig,
};
use hf_hub::api::sync::{Api, ApiBuilder};
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokenizers::Tokenizer;

/// Stable Diffusion model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StableDiffusionVersion {
    /// Stable Diffusion v1.5
    #[default]
    #[serde(rename = "v1-5")]
    V1_5,
    /// Stable Diffusion v2.1
    #[serde(rename = "v2-1")]
    V2_1,
}

impl StableDiffusionVersion {
    pub fn repo(&self) -> &str {
        match self {
            Self::V1_5 => "runwayml/stable-diffusion-v1-5",
            Self::V2_1 => "stabilityai/stable-diffusion-2-1",
        }
    }

    // Both versions share the CLIP BPE vocabulary
    fn tokenizer_repo(&self) -> &str {
        match self {
            Self::V1_5 | Self::V2_1 => "openai/clip-vit-base-patch32",
        }
    }

    fn sd_config(&self) -> StableDiffusionConfig {
        match self {
            Self::V1_5 => StableDiffusionConfig::v1_5(None, None, None),
            Self::V2_1 => StableDiffusionConfig::v2_1(None, None, None),
        }
    }
}

/// Which device the pipeline should run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// CUDA when available, otherwise CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl DevicePreference {
    fn device(&self) -> Result<Device> {
        Ok(match self {
            Self::Auto => Device::cuda_if_available(0)?,
            Self::Cpu => Device::Cpu,
            Self::Cuda => Device::new_cuda(0)?,
        })
    }
}

/// Where and how to load the model weights
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub version: StableDiffusionVersion,
    /// Hub repository holding the weights; defaults to the version's repo
    pub model_id: Option<String>,
    pub device: DevicePreference,
    /// Hub cache directory; defaults to the hub's own cache
    pub cache_dir: Option<PathBuf>,
    /// Access token for gated or rate-limited downloads
    pub hf_token: Option<String>,
}

/// Standard-normal noise drawn from a seeded RNG, so latents are reproducible
/// on every device (the CPU backend cannot be seeded directly).
fn seeded_noise(
    seed: u64,
    shape: (usize, usize, usize, usize),
    device: &Device,
    dtype: DType,
) -> Result<Tensor> {
    let mut rng = StdRng::seed_from_u64(seed);
    let count = shape.0 * shape.1 * shape.2 * shape.3;
    let values: Vec<f32> = (0..count)
        .map(|_| {
            // Box-Muller
            let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
            let u2: f32 = rng.gen();
            (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
        })
        .collect();
    Ok(Tensor::from_vec(values, shape, &Device::Cpu)?
        .to_device(device)?
        .to_dtype(dtype)?)
}

/// Stable Diffusion image generator.
///
/// All weights are fetched and built once in [`StableDiffusionGenerator::load`]
/// and reused for every request.
pub struct StableDiffusionGenerator {
    version: StableDiffusionVersion,
    model_id: String,
    device: Device,
    dtype: DType,
    vae_scale: f64,
    sd_config: StableDiffusionConfig,
    tokenizer: Tokenizer,
    pad_id: u32,
    text_model: ClipTextTransformer,
    vae: AutoEncoderKL,
    unet: UNet2DConditionModel,
}

struct WeightFetcher {
    api: Api,
    model_id: String,
    dtype: DType,
}

impl WeightFetcher {
    fn download(&self, repo: &str, filename: &str) -> Result<PathBuf> {
        self.api
            .model(repo.to_string())
            .get(filename)
            .map_err(|e| ImageGenError::HfHub(format!("Failed to download {repo}/{filename}: {e}")))
    }

    /// Try the fp16 variant first when running in half precision
    fn weights(&self, stem: &str) -> Result<PathBuf> {
        if self.dtype == DType::F16 {
            match self.download(&self.model_id, &format!("{stem}.fp16.safetensors")) {
                Ok(path) => return Ok(path),
                Err(_) => tracing::warn!("fp16 weights for {} not found, falling back to fp32", stem),
            }
        }
        self.download(&self.model_id, &format!("{stem}.safetensors"))
    }
}

impl StableDiffusionGenerator {
    /// Download (or reuse cached) weights and build every sub-model
    pub fn load(options: LoadOptions) -> Result<Self> {
        let version = options.version;
        let model_id = options
            .model_id
            .clone()
            .unwrap_or_else(|| version.repo().to_string());

        let device = options.device.device()?;
        let dtype = if device.is_cuda() { DType::F16 } else { DType::F32 };
        tracing::info!(model = %model_id, cuda = device.is_cuda(), "Loading Stable Diffusion {:?}", version);

        let mut builder = ApiBuilder::new().with_token(options.hf_token.clone());
        if let Some(dir) = &options.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder
            .build()
            .map_err(|e| ImageGenError::HfHub(format!("Failed to create API: {e}")))?;
        let fetcher = WeightFetcher {
            api,
            model_id: model_id.clone(),
            dtype,
        };

        let sd_config = version.sd_config();

        tracing::info!("Loading CLIP tokenizer and encoder");
        let tokenizer_path = fetcher.download(version.tokenizer_repo(), "tokenizer.json")?;
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| ImageGenError::Tokenization(e.to_string()))?;

        let pad_token = sd_config.clip.pad_with.as_deref().unwrap_or("<|endoftext|>");
        let pad_id = *tokenizer
            .get_vocab(true)
            .get(pad_token)
            .ok_or_else(|| ImageGenError::Tokenization(format!("Pad token {pad_token} not found")))?;

        let clip_weights = fetcher.weights("text_encoder/model")?;
        let text_model =
            stable_diffusion::build_clip_transformer(&sd_config.clip, clip_weights, &device, dtype)?;

        tracing::info!("Loading VAE");
        let vae_weights = fetcher.weights("vae/diffusion_pytorch_model")?;
        let vae = sd_config.build_vae(vae_weights, &device, dtype)?;

        tracing::info!("Loading UNet");
        let unet_weights = fetcher.weights("unet/diffusion_pytorch_model")?;
        let unet = sd_config.build_unet(
            unet_weights,
            &device,
            4,     // standard latent channels
            false, // no flash attention
            dtype,
        )?;

        tracing::info!("Stable Diffusion ready");

        Ok(Self {
            version,
            model_id,
            device,
            dtype,
            vae_scale: 0.18215,
            sd_config,
            tokenizer,
            pad_id,
            text_model,
            vae,
            unet,
        })
    }

    pub fn version(&self) -> StableDiffusionVersion {
        self.version
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn text_embeddings(&self, prompt: &str) -> Result<Tensor> {
        let max_len = self.sd_config.clip.max_position_embeddings;

        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| ImageGenError::Tokenization(e.to_string()))?
            .get_ids()
            .to_vec();

        if tokens.len() > max_len {
            tracing::warn!("Prompt is {} tokens, truncating to {}", tokens.len(), max_len);
            tokens.truncate(max_len);
        }
        tokens.resize(max_len, self.pad_id);

        let tokens = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        Ok(self.text_model.forward(&tokens)?)
    }

    /// RGB image -> (1, 3, H, W) tensor scaled to [-1, 1]
    fn image_to_tensor(&self, image: &RgbImage) -> Result<Tensor> {
        let (width, height) = image.dimensions();
        let tensor = Tensor::from_vec(
            image.as_raw().clone(),
            (height as usize, width as usize, 3),
            &Device::Cpu,
        )?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(2. / 255., -1.)?
        .unsqueeze(0)?
        .to_device(&self.device)?
        .to_dtype(self.dtype)?;
        Ok(tensor)
    }
}

impl ImageGenerator for StableDiffusionGenerator {
    fn generate(&mut self, config: &ImageGenConfig) -> Result<GeneratedImage> {
        tracing::info!("Generating image with Stable Diffusion {:?}", self.version);
        tracing::debug!("Prompt: {}", config.prompt);

        config.check_dimensions()?;
        // Seeds the VAE posterior sample on CUDA; CPU keeps its own RNG
        if let Err(e) = self.device.set_seed(config.seed) {
            tracing::debug!("Device RNG not seeded: {}", e);
        }

        let use_guidance = config.guidance_scale > 1.0;

        // 1. Encode text prompt (plus the unconditional prompt for guidance)
        let text_embeddings = self.text_embeddings(&config.prompt)?;
        let text_embeddings = if use_guidance {
            let uncond_embeddings = self.text_embeddings("")?;
            Tensor::cat(&[uncond_embeddings, text_embeddings], 0)?
        } else {
            text_embeddings
        };

        // 2. Create scheduler
        let mut scheduler = self.sd_config.build_scheduler(config.num_steps)?;
        let timesteps = scheduler.timesteps().to_vec();

        // 3. Initialize latents, from noise or from the encoded source image
        let (mut latents, t_start) = match &config.init_image {
            Some(init) => {
                tracing::info!("Encoding source image (strength {})", init.strength);
                let image = self.image_to_tensor(&init.image)?;
                let latents = (self.vae.encode(&image)?.sample()? * self.vae_scale)?;
                let t_start = config.num_steps
                    - (config.num_steps as f64 * init.strength.clamp(0.0, 1.0)) as usize;
                let latents = if t_start < timesteps.len() {
                    let noise = seeded_noise(config.seed, latents.dims4()?, &self.device, self.dtype)?;
                    scheduler.add_noise(&latents, noise, timesteps[t_start])?
                } else {
                    latents
                };
                (latents, t_start)
            }
            None => {
                let latents = seeded_noise(
                    config.seed,
                    (1, 4, config.height / 8, config.width / 8),
                    &self.device,
                    DType::F32,
                )?;
                let latents = (latents * scheduler.init_noise_sigma())?.to_dtype(self.dtype)?;
                (latents, 0)
            }
        };

        // 4. Diffusion loop
        tracing::info!("Running diffusion for {} steps", timesteps.len().saturating_sub(t_start));
        for (step_idx, &timestep) in timesteps.iter().enumerate() {
            if step_idx < t_start {
                continue;
            }
            tracing::debug!("Step {}/{}", step_idx + 1, timesteps.len());

            let latent_model_input = if use_guidance {
                Tensor::cat(&[&latents, &latents], 0)?
            } else {
                latents.clone()
            };

            let latent_model_input = scheduler.scale_model_input(latent_model_input, timestep)?;

            let noise_pred =
                self.unet
                    .forward(&latent_model_input, timestep as f64, &text_embeddings)?;

            let noise_pred = if use_guidance {
                let noise_pred = noise_pred.chunk(2, 0)?;
                let (uncond, text) = (&noise_pred[0], &noise_pred[1]);
                (uncond + ((text - uncond)? * config.guidance_scale)?)?
            } else {
                noise_pred
            };

            latents = scheduler.step(&noise_pred, timestep, &latents)?;
        }

        // 5. Decode latents
        tracing::info!("Decoding latents to image");
        let image = self.vae.decode(&(&latents / self.vae_scale)?)?;
        let image = ((image / 2.)? + 0.5)?.to_device(&Device::Cpu)?;
        let image = (image.clamp(0f32, 1.)? * 255.)?.to_dtype(DType::U8)?;

        // 6. Convert to RGB bytes
        let (_, _, height, width) = image.dims4()?;
        let image = image.i(0)?;
        let data = image.permute((1, 2, 0))?.to_vec3::<u8>()?;
        let data: Vec<u8> = data.into_iter().flatten().flatten().collect();

        tracing::info!("Image generation complete!");

        Ok(GeneratedImage {
            data,
            width: width as u32,
            height: height as u32,
            prompt: config.prompt.clone(),
            seed: config.seed,
        })
    }

    fn name(&self) -> &str {
        "stable-diffusion"
    }
}
