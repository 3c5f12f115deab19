// Imagent Studio - serve the generation UI and JSON API on the local machine

use anyhow::Context;
use clap::Parser;
use imagent::{
    DirectoryHistory, GenerationFacade, HistoryStore, ImageGenerator, PreviewGenerator,
    StableDiffusionGenerator,
};
use imagent_studio::{build_app_router, AppState, BackendKind, StudioConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Local web studio for Stable Diffusion image generation", long_about = None)]
struct Args {
    /// Config file (default: ./imagent-studio.toml, then ~/.imagent-studio.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind host, overrides config and IMAGENT_HOST
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides config and IMAGENT_PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Output directory, overrides config and IMAGENT_OUTPUT_DIR
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Use the preview backend instead of loading the model
    #[arg(long)]
    preview: bool,

    /// Force CPU usage
    #[arg(long)]
    cpu: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut StudioConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = &self.output_dir {
            config.storage.output_dir = dir.clone();
        }
        if self.preview {
            config.model.backend = BackendKind::Preview;
        }
        if self.cpu {
            config.model.device = imagent::DevicePreference::Cpu;
        }
    }
}

/// Load the configured pipeline once; the weights stay resident for the process lifetime.
async fn load_generator(config: &StudioConfig) -> anyhow::Result<Box<dyn ImageGenerator + Send>> {
    match config.model.backend {
        BackendKind::Preview => {
            tracing::info!("Using preview backend, no model will be loaded");
            Ok(Box::new(PreviewGenerator::new()))
        }
        BackendKind::StableDiffusion => {
            if config.model.safety_checker {
                tracing::warn!("Safety checker requested but not available for this backend; continuing without it");
            }
            let options = config.load_options();
            let generator = tokio::task::spawn_blocking(move || StableDiffusionGenerator::load(options))
                .await
                .context("model loading task failed")?
                .context("failed to load Stable Diffusion")?;
            Ok(Box::new(generator))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("imagent_studio={log_level},imagent={log_level},tower_http={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded .env file from: {}", path.display());
    }

    // --- Configuration ---
    let (mut config, source) = StudioConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;
    match &source {
        Some(path) => tracing::info!("Loaded configuration from {}", path.display()),
        None => tracing::info!("No config file found, using built-in defaults"),
    }
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        output_dir = %config.storage.output_dir.display(),
        backend = ?config.model.backend,
        "Loaded server configuration"
    );

    // --- History ---
    std::fs::create_dir_all(&config.storage.output_dir).with_context(|| {
        format!("creating output directory {}", config.storage.output_dir.display())
    })?;
    let history: Arc<dyn HistoryStore> = Arc::new(DirectoryHistory::new(&config.storage.output_dir));
    tracing::info!("{} images in history", history.count());

    // --- Pipeline ---
    let generator = load_generator(&config).await?;
    let facade = GenerationFacade::new(generator, config.generation.clone());

    // --- Router ---
    let address = config.bind_address();
    let state = AppState::new(config, facade, history);
    let app = build_app_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    tracing::info!("Imagent Studio listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
