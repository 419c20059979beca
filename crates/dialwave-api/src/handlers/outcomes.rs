//! Call outcome callback from the Call Execution Service

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use dialwave_core::signature::{verify, SIGNATURE_HEADER};
use dialwave_core::LedgerEntry;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use super::{api_error, ApiError};
use crate::routes::AppState;

/// Terminal outcome of one dispatched attempt
#[derive(Debug, Deserialize)]
pub struct CallOutcomeRequest {
    pub queue_item_id: Uuid,
    /// Raw provider status (`completed`, `no-answer`, `busy`, ...)
    pub status: String,
    /// Defaults to the time of receipt
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Record a call outcome
///
/// POST /api/v1/call-outcomes
///
/// The body is verified against `X-Webhook-Signature` when an outcome secret
/// is configured. Duplicate and unknown outcomes are acknowledged with 200 so
/// the provider does not redeliver them.
pub async fn record_call_outcome(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LedgerEntry>, ApiError> {
    if let Some(secret) = &state.outcome_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify(secret, &body, signature) {
            warn!("Rejected call outcome with invalid signature");
            return Err(api_error(
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                "Missing or invalid webhook signature",
            ));
        }
    }

    let input: CallOutcomeRequest = serde_json::from_slice(&body).map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("Invalid call outcome: {}", e),
        )
    })?;

    let occurred_at = input.occurred_at.unwrap_or_else(|| state.clock.now());
    let entry = state
        .outcomes
        .record_call_outcome(input.queue_item_id, &input.status, occurred_at)
        .await
        .map_err(|e| {
            error!(queue_item_id = %input.queue_item_id, "Failed to record call outcome: {}", e);
            let status = StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            api_error(status, "internal_error", "Failed to record call outcome")
        })?;

    Ok(Json(entry))
}
