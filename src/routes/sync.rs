//! Replication status endpoint

use crate::error::Result;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    pub parent_node_url: Option<String>,
    pub records_total: i64,
    pub records_sent_to_parent: i64,
    pub records_sent_to_parent_fraction: f64,
    pub records_not_sent_to_parent: i64,
    pub records_not_sent_to_parent_fraction: f64,
}

/// GET /sync/status
///
/// Replication backlog counters. An empty store counts as fully synced.
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<SyncStatusResponse>> {
    let (total, sent) = state.store.record_counts().await?;
    let unsent = total - sent;

    let (sent_fraction, unsent_fraction) = if total == 0 {
        (1.0, 0.0)
    } else {
        (sent as f64 / total as f64, unsent as f64 / total as f64)
    };

    Ok(Json(SyncStatusResponse {
        parent_node_url: state.config.parent_node_url.clone(),
        records_total: total,
        records_sent_to_parent: sent,
        records_sent_to_parent_fraction: sent_fraction,
        records_not_sent_to_parent: unsent,
        records_not_sent_to_parent_fraction: unsent_fraction,
    }))
}
