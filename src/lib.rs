// imagent-studio - local web studio for styled text-to-image and image-to-image
// generation on top of the imagent crate

pub mod config;
pub mod error;
pub mod router;
pub mod routes;
pub mod state;

pub use config::{BackendKind, ConfigError, StudioConfig};
pub use error::{AppError, AppResult};
pub use router::build_app_router;
pub use state::AppState;
