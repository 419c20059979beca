//! Call Execution Service boundary
//!
//! The provider accepts or rejects a dispatch synchronously; the terminal
//! call outcome arrives later through `OutcomeProcessor::record_call_outcome`.

mod http;

pub use http::HttpCallExecutor;

use async_trait::async_trait;
use dialwave_common::types::{AgentId, CampaignId, ContactId, PhoneNumberId, QueueItemId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Dispatch request handed to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Echoed back by the provider with the outcome
    pub queue_item_id: QueueItemId,
    pub contact_id: ContactId,
    pub campaign_id: CampaignId,
    pub phone_number_id: Option<PhoneNumberId>,
    pub to_number: String,
    pub agent_id: Option<AgentId>,
    pub attempt_number: i32,
}

/// Synchronous answer to a dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DispatchResponse {
    Accepted,
    Rejected { reason: String },
}

/// Transport-level dispatch failures. Never consume a retry slot.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Provider unreachable: {0}")]
    Transport(String),

    #[error("Provider returned status {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Call Execution Service
#[async_trait]
pub trait CallExecutor: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchResponse, DispatchError>;
}

/// Accepts every dispatch and only logs it. Outcomes must be reported
/// through the API. Used when no provider endpoint is configured.
#[derive(Debug, Default)]
pub struct LoggingCallExecutor;

#[async_trait]
impl CallExecutor for LoggingCallExecutor {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchResponse, DispatchError> {
        info!(
            queue_item_id = %request.queue_item_id,
            campaign_id = %request.campaign_id,
            to = %request.to_number,
            attempt = request.attempt_number,
            "Dry-run dispatch"
        );
        Ok(DispatchResponse::Accepted)
    }
}
