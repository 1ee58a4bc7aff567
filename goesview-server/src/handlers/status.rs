use axum::{Json, extract::State};
use goesview_core::{QueueStats, ScanSnapshot};
use serde::Serialize;

use crate::infra::app_state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub queue: QueueStats,
    pub scan: ScanSnapshot,
    pub channels: usize,
}

/// `GET /api/status` - queue counters and reconciliation progress.
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        queue: state.cache.queue().stats(),
        scan: state.reconciler.progress().snapshot(),
        channels: state.channels.len(),
    })
}
