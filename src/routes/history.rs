use axum::extract::{Query, State};
use axum::Json;
use imagent::{GenerationMetadata, HistoryRecord, HistoryStore};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Largest `limit` a history request may ask for.
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// A gallery entry as sent to the page.
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub filename: String,
    /// Path under which the image is served.
    pub url: String,
    /// `None` when the sidecar is missing or unreadable.
    pub metadata: Option<GenerationMetadata>,
}

impl From<HistoryRecord> for HistoryEntry {
    fn from(record: HistoryRecord) -> Self {
        let filename = record.filename();
        Self {
            url: format!("/outputs/{filename}"),
            filename,
            metadata: record.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub total: usize,
    pub items: Vec<HistoryEntry>,
}

/// Scan the store off the async runtime.
pub async fn recent_entries(
    history: std::sync::Arc<dyn HistoryStore>,
    limit: usize,
) -> AppResult<(Vec<HistoryEntry>, usize)> {
    tokio::task::spawn_blocking(move || {
        let items = history
            .list_recent(limit)
            .into_iter()
            .map(HistoryEntry::from)
            .collect();
        (items, history.count())
    })
    .await
    .map_err(|e| AppError::InternalError(format!("history scan panicked: {e}")))
}

/// GET /api/history?limit=n -- most recent generations first.
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<HistoryResponse>> {
    let limit = query
        .limit
        .unwrap_or(state.config.server.recent_limit)
        .min(MAX_HISTORY_LIMIT);

    let (items, total) = recent_entries(state.history.clone(), limit).await?;
    Ok(Json(HistoryResponse { total, items }))
}
