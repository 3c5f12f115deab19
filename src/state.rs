use std::sync::Arc;

use imagent::{GenerationFacade, HistoryStore};
use tokio::sync::Mutex;

use crate::config::StudioConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration (limits, gallery size, output directory).
    pub config: Arc<StudioConfig>,
    /// The one loaded pipeline; holding the lock means owning the pipeline,
    /// so generations run strictly one at a time.
    pub facade: Arc<Mutex<GenerationFacade>>,
    /// Where finished images and sidecars are kept.
    pub history: Arc<dyn HistoryStore>,
}

impl AppState {
    pub fn new(
        config: StudioConfig,
        facade: GenerationFacade,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            facade: Arc::new(Mutex::new(facade)),
            history,
        }
    }
}
