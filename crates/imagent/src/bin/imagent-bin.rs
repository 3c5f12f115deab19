// imagent-bin - CLI for generating styled images and browsing the local history

use clap::{Args, Parser, Subcommand};
use imagent::styles::{self, Style};
use imagent::{
    DevicePreference, DirectoryHistory, GenerationFacade, GenerationLimits, GenerationMode,
    HistoryStore, ImageGenerator, LoadOptions, NumberInput, PreviewGenerator, RawParams, Result,
    StableDiffusionGenerator, StableDiffusionVersion,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate images with Stable Diffusion and style presets", long_about = None)]
struct Cli {
    /// Directory holding generated images and their JSON sidecars
    #[arg(short, long, global = true, default_value = "outputs/generated")]
    output_dir: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Text-to-image generation
    Generate(GenerateArgs),

    /// Image-to-image transformation of an existing picture
    Transform {
        /// Source image to transform
        #[arg(short, long)]
        input: PathBuf,

        /// How much to alter the source (0.0 keeps it, 1.0 replaces it)
        #[arg(long)]
        strength: Option<f64>,

        #[command(flatten)]
        common: GenerateArgs,
    },

    /// List the most recent generations
    History {
        /// Number of records to show
        #[arg(short, long, default_value = "6")]
        limit: usize,
    },

    /// List the available style presets
    Styles,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Text prompt describing the image to generate
    #[arg(short, long)]
    prompt: String,

    /// Style preset name or slug (e.g. "Oil Painting" or oil_painting)
    #[arg(long, default_value = "None")]
    style: String,

    /// Image width (clamped to 256..=768, rounded down to a multiple of 8)
    #[arg(short, long)]
    width: Option<i64>,

    /// Image height (clamped to 256..=768, rounded down to a multiple of 8)
    #[arg(long)]
    height: Option<i64>,

    /// Number of inference steps
    #[arg(short = 'n', long)]
    steps: Option<i64>,

    /// Classifier-free guidance scale
    #[arg(short, long)]
    guidance_scale: Option<f64>,

    /// Random seed for reproducibility (negative picks one)
    #[arg(short, long, allow_negative_numbers = true)]
    seed: Option<i64>,

    /// Model variant to use
    #[arg(short, long, value_enum, default_value = "sd-v15")]
    model: ModelVariant,

    /// Hub repository overriding the variant's default weights
    #[arg(long)]
    model_id: Option<String>,

    /// Force CPU usage (default: use GPU if available)
    #[arg(long)]
    cpu: bool,

    /// Skip model loading and paint a deterministic preview pattern
    #[arg(long)]
    preview: bool,

    /// Also copy the image to this path
    #[arg(long)]
    copy_to: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ModelVariant {
    /// Stable Diffusion v1.5 - Classic, 30 steps
    SdV15,
    /// Stable Diffusion v2.1 - Improved, 30 steps
    SdV21,
}

impl From<ModelVariant> for StableDiffusionVersion {
    fn from(variant: ModelVariant) -> Self {
        match variant {
            ModelVariant::SdV15 => StableDiffusionVersion::V1_5,
            ModelVariant::SdV21 => StableDiffusionVersion::V2_1,
        }
    }
}

impl GenerateArgs {
    fn raw_params(&self) -> RawParams {
        RawParams {
            style: Some(self.style.clone()),
            steps: self.steps.map(NumberInput::from),
            guidance_scale: self.guidance_scale.map(NumberInput::from),
            width: self.width.map(NumberInput::from),
            height: self.height.map(NumberInput::from),
            seed: self.seed.map(NumberInput::from),
            ..RawParams::new(self.prompt.clone())
        }
    }

    fn build_generator(&self) -> Result<Box<dyn ImageGenerator + Send>> {
        if self.preview {
            tracing::info!("Using preview backend, no model will be loaded");
            return Ok(Box::new(PreviewGenerator::new()));
        }

        let options = LoadOptions {
            version: self.model.into(),
            model_id: self.model_id.clone(),
            device: if self.cpu {
                DevicePreference::Cpu
            } else {
                DevicePreference::Auto
            },
            cache_dir: None,
            hf_token: std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
        };
        Ok(Box::new(StableDiffusionGenerator::load(options)?))
    }
}

fn run_generation(
    history: &DirectoryHistory,
    mode: GenerationMode,
    args: &GenerateArgs,
    raw: RawParams,
    source: Option<Vec<u8>>,
) -> Result<()> {
    let mut facade = GenerationFacade::new(args.build_generator()?, GenerationLimits::default());

    tracing::info!("Generating image...");
    let result = facade.run(mode, &raw, source.as_deref())?;

    // A failed save still leaves the image reachable through --copy-to
    match history.save(&result) {
        Ok(record) => {
            tracing::info!("Saved to: {}", record.image_path.display());
            println!("Image saved to: {}", record.image_path.display());
        }
        Err(e) => {
            tracing::error!(error = %e, "Could not persist generation");
            eprintln!("Warning: {e}");
        }
    }

    if let Some(path) = &args.copy_to {
        result.image.save(path)?;
        println!("Copied to: {}", path.display());
    }

    let p = &result.parameters;
    println!("Prompt: {}", p.final_prompt);
    println!(
        "Style: {} | Steps: {} | Guidance: {} | Size: {}x{}",
        p.style, p.steps, p.guidance_scale, p.width, p.height
    );
    if let Some(strength) = p.strength {
        println!("Strength: {strength}");
    }
    println!("Seed: {}", p.seed);

    Ok(())
}

fn print_history(history: &DirectoryHistory, limit: usize) {
    let records = history.list_recent(limit);
    if records.is_empty() {
        println!("No generations in {}", history.dir().display());
        return;
    }

    println!("{} of {} generations:", records.len(), history.count());
    for record in records {
        match &record.metadata {
            Some(m) => println!(
                "  {}  [{} | {} | seed {}] {}",
                record.filename(),
                m.mode,
                m.style,
                m.seed,
                m.prompt
            ),
            None => println!("  {}  (no metadata)", record.filename()),
        }
    }
}

fn print_styles() {
    for style in Style::ALL {
        println!("{:<22} {:<22} {}", style.name(), style.slug(), style.preset().description);
    }
    tracing::debug!("{} styles available", styles::list_styles().len());
}

fn main() -> Result<()> {
    // .env may carry HF_TOKEN
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("imagent={log_level},imagent_bin={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match dotenv {
        Ok(path) => tracing::debug!("Loaded .env file from: {}", path.display()),
        Err(e) => tracing::debug!(".env not loaded: {}", e),
    }

    let history = DirectoryHistory::new(&cli.output_dir);

    match cli.command {
        Command::Generate(args) => {
            let raw = args.raw_params();
            run_generation(&history, GenerationMode::Text2Img, &args, raw, None)
        }
        Command::Transform {
            input,
            strength,
            common,
        } => {
            tracing::info!("Reading source image: {}", input.display());
            let source = std::fs::read(&input)?;
            let raw = RawParams {
                strength: strength.map(NumberInput::from),
                ..common.raw_params()
            };
            run_generation(&history, GenerationMode::Img2Img, &common, raw, Some(source))
        }
        Command::History { limit } => {
            print_history(&history, limit);
            Ok(())
        }
        Command::Styles => {
            print_styles();
            Ok(())
        }
    }
}
