//! Campaign Manager - configuration validation and external lifecycle actions

use std::sync::Arc;

use dialwave_common::types::{CampaignId, ContactId};
use dialwave_storage::models::{
    Campaign, CampaignStatus, Contact, CreateCampaign, CreateContact, QueueItem,
};
use dialwave_storage::repository::CampaignStore;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::completion::CompletionEvaluator;
use super::timezone::is_valid_timezone;
use super::window::CallWindow;
use crate::clock::Clock;

/// Campaign manager errors
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Invalid campaign configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot {action} a campaign in status {status}")]
    InvalidTransition { action: &'static str, status: String },

    #[error(transparent)]
    Store(#[from] dialwave_common::Error),
}

/// A newly created campaign and its contacts
#[derive(Debug, Clone, Serialize)]
pub struct CreatedCampaign {
    pub campaign: Campaign,
    pub contacts: Vec<Contact>,
}

/// Validate a campaign configuration before it is stored
pub fn validate_config(
    input: &CreateCampaign,
    contacts: &[CreateContact],
) -> Result<(), CampaignError> {
    let invalid = |msg: String| Err(CampaignError::InvalidConfig(msg));

    if input.name.trim().is_empty() {
        return invalid("name must not be empty".to_string());
    }

    if let Err(e) = CallWindow::parse(&input.first_call_time, &input.last_call_time) {
        return invalid(e.to_string());
    }

    match input.timezone.as_deref() {
        Some(tz) if !is_valid_timezone(tz) => {
            return invalid(format!("{:?} is not a canonical IANA timezone", tz));
        }
        None if input.use_custom_timezone => {
            return invalid("use_custom_timezone requires a timezone".to_string());
        }
        _ => {}
    }

    if input.max_retries < 0 {
        return invalid("max_retries must not be negative".to_string());
    }
    if input.retry_interval_minutes < 0 {
        return invalid("retry_interval_minutes must not be negative".to_string());
    }
    if input.max_retries > 0 && input.retry_interval_minutes <= 0 {
        return invalid("retry_interval_minutes must be positive when max_retries > 0".to_string());
    }

    if let (Some(start), Some(end)) = (input.start_date, input.end_date) {
        if end < start {
            return invalid(format!("end_date {} is before start_date {}", end, start));
        }
    }

    if let Some(contact) = contacts.iter().find(|c| c.phone_number.trim().is_empty()) {
        return invalid(format!(
            "contact {:?} has no phone number",
            contact.name.as_deref().unwrap_or("")
        ));
    }

    Ok(())
}

/// Campaign Manager - Manages campaign lifecycle outside the scheduler
pub struct CampaignManager {
    store: Arc<dyn CampaignStore>,
    completion: CompletionEvaluator,
    clock: Arc<dyn Clock>,
}

impl CampaignManager {
    /// Create a new campaign manager
    pub fn new(
        store: Arc<dyn CampaignStore>,
        completion: CompletionEvaluator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            completion,
            clock,
        }
    }

    /// Validate and store a `pending` campaign with its contacts
    pub async fn create_campaign(
        &self,
        input: CreateCampaign,
        contacts: Vec<CreateContact>,
    ) -> Result<CreatedCampaign, CampaignError> {
        validate_config(&input, &contacts)?;

        let (campaign, contacts) = self.store.create_campaign(input, contacts).await?;

        info!(
            campaign_id = %campaign.id,
            tenant_id = %campaign.tenant_id,
            contacts = contacts.len(),
            "Campaign created"
        );

        Ok(CreatedCampaign { campaign, contacts })
    }

    pub async fn get_campaign(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        self.store
            .get_campaign(id)
            .await?
            .ok_or(CampaignError::NotFound)
    }

    /// `active -> paused`
    pub async fn pause_campaign(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        self.transition(id, "pause", &[CampaignStatus::Active], CampaignStatus::Paused)
            .await
    }

    /// `paused -> active`. A campaign whose contacts all finished while
    /// paused completes right away.
    pub async fn resume_campaign(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        let campaign = self
            .transition(id, "resume", &[CampaignStatus::Paused], CampaignStatus::Active)
            .await?;

        if self.completion.maybe_complete(id).await? {
            return self.get_campaign(id).await;
        }
        Ok(campaign)
    }

    /// `pending | active | paused -> cancelled`
    pub async fn cancel_campaign(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        self.transition(
            id,
            "cancel",
            &[
                CampaignStatus::Pending,
                CampaignStatus::Active,
                CampaignStatus::Paused,
            ],
            CampaignStatus::Cancelled,
        )
        .await
    }

    /// Attempt history of one contact, oldest first
    pub async fn list_attempts(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<Vec<QueueItem>, CampaignError> {
        let contact = self
            .store
            .get_contact(contact_id)
            .await?
            .filter(|c| c.campaign_id == campaign_id)
            .ok_or(CampaignError::NotFound)?;

        Ok(self.store.list_attempts(campaign_id, contact.id).await?)
    }

    async fn transition(
        &self,
        id: CampaignId,
        action: &'static str,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<Campaign, CampaignError> {
        let now = self.clock.now();
        if let Some(campaign) = self.store.transition_campaign(id, from, to, now).await? {
            info!(campaign_id = %id, action, status = %to, "Campaign status changed");
            return Ok(campaign);
        }

        let current = self.get_campaign(id).await?;
        Err(CampaignError::InvalidTransition {
            action,
            status: current.status,
        })
    }
}
