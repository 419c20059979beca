//! Scheduler handlers

use axum::{extract::State, Json};
use dialwave_core::TickReport;
use std::sync::Arc;
use tracing::info;

use crate::routes::AppState;

/// Run one scheduler sweep now
///
/// POST /api/v1/scheduler/tick
pub async fn run_tick(State(state): State<Arc<AppState>>) -> Json<TickReport> {
    let report = state.scheduler.tick().await;
    info!(?report, "Manual scheduler tick");
    Json(report)
}
