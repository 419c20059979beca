//! API request handlers

pub mod campaigns;
pub mod health;
pub mod outcomes;
pub mod scheduler;

use axum::{http::StatusCode, Json};
use dialwave_core::CampaignError;
use serde::{Deserialize, Serialize};
use tracing::error;

pub use health::*;

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Handler error
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

/// Map a campaign manager error to a response
pub(crate) fn campaign_error(e: CampaignError) -> ApiError {
    match e {
        CampaignError::NotFound => api_error(StatusCode::NOT_FOUND, "not_found", "Campaign not found"),
        CampaignError::InvalidConfig(msg) => {
            api_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg)
        }
        e @ CampaignError::InvalidTransition { .. } => {
            api_error(StatusCode::CONFLICT, "invalid_transition", e.to_string())
        }
        CampaignError::Store(e) => {
            error!("Campaign store error: {}", e);
            let status = StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            api_error(status, "internal_error", "Campaign store unavailable")
        }
    }
}
