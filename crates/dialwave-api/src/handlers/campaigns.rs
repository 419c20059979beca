//! Campaign handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use dialwave_storage::models::{Campaign, Contact, CreateCampaign, CreateContact, QueueItem};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{campaign_error, ApiError};
use crate::routes::AppState;

/// Campaign response
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub status: String,
    pub first_call_time: String,
    pub last_call_time: String,
    pub use_custom_timezone: bool,
    pub timezone: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub max_retries: i32,
    pub retry_interval_minutes: i32,
    pub total_contacts: i32,
    pub completed_calls: i32,
    pub successful_calls: i32,
    pub failed_calls: i32,
    pub progress_percentage: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        let progress = c.progress_percentage();
        Self {
            id: c.id,
            tenant_id: c.tenant_id,
            name: c.name,
            status: c.status,
            first_call_time: c.first_call_time,
            last_call_time: c.last_call_time,
            use_custom_timezone: c.use_custom_timezone,
            timezone: c.timezone,
            start_date: c.start_date,
            end_date: c.end_date,
            max_retries: c.max_retries,
            retry_interval_minutes: c.retry_interval_minutes,
            total_contacts: c.total_contacts,
            completed_calls: c.completed_calls,
            successful_calls: c.successful_calls,
            failed_calls: c.failed_calls,
            progress_percentage: progress,
            started_at: c.started_at,
            completed_at: c.completed_at,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Request body for creating a campaign
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    #[serde(flatten)]
    pub campaign: CreateCampaign,
    #[serde(default)]
    pub contacts: Vec<CreateContact>,
}

/// Created campaign with its contacts
#[derive(Debug, Serialize)]
pub struct CreateCampaignResponse {
    pub campaign: CampaignResponse,
    pub contacts: Vec<Contact>,
}

/// Create a new `pending` campaign
///
/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CreateCampaignResponse>), ApiError> {
    let created = state
        .manager
        .create_campaign(input.campaign, input.contacts)
        .await
        .map_err(campaign_error)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateCampaignResponse {
            campaign: CampaignResponse::from(created.campaign),
            contacts: created.contacts,
        }),
    ))
}

/// Get a campaign with its counters
///
/// GET /api/v1/campaigns/:campaign_id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .manager
        .get_campaign(campaign_id)
        .await
        .map_err(campaign_error)?;

    Ok(Json(CampaignResponse::from(campaign)))
}

/// POST /api/v1/campaigns/:campaign_id/pause
pub async fn pause_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .manager
        .pause_campaign(campaign_id)
        .await
        .map_err(campaign_error)?;

    Ok(Json(CampaignResponse::from(campaign)))
}

/// POST /api/v1/campaigns/:campaign_id/resume
pub async fn resume_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .manager
        .resume_campaign(campaign_id)
        .await
        .map_err(campaign_error)?;

    Ok(Json(CampaignResponse::from(campaign)))
}

/// POST /api/v1/campaigns/:campaign_id/cancel
pub async fn cancel_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .manager
        .cancel_campaign(campaign_id)
        .await
        .map_err(campaign_error)?;

    Ok(Json(CampaignResponse::from(campaign)))
}

/// Attempt history of one contact
///
/// GET /api/v1/campaigns/:campaign_id/contacts/:contact_id/attempts
pub async fn list_attempts(
    State(state): State<Arc<AppState>>,
    Path((campaign_id, contact_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<QueueItem>>, ApiError> {
    let attempts = state
        .manager
        .list_attempts(campaign_id, contact_id)
        .await
        .map_err(campaign_error)?;

    Ok(Json(attempts))
}
