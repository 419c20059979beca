//! In-memory campaign store
//!
//! Mirrors the PostgreSQL store's compare-and-set semantics under a single
//! mutex. Used by tests and by `database.backend = "memory"`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialwave_common::types::{CampaignId, ContactId, QueueItemId, TenantId};
use dialwave_common::{Error, Result};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::CampaignStore;
use crate::models::{
    Campaign, CampaignStatus, Contact, CreateCampaign, CreateContact, OutcomeUpdate, QueueItem,
    QueueItemStatus, Tally, Tenant,
};

#[derive(Default)]
struct InMemoryState {
    tenants: HashMap<TenantId, Tenant>,
    campaigns: HashMap<CampaignId, Campaign>,
    contacts: HashMap<ContactId, Contact>,
    /// Contact ids per campaign, in insertion order
    campaign_contacts: HashMap<CampaignId, Vec<ContactId>>,
    items: HashMap<QueueItemId, QueueItem>,
}

impl InMemoryState {
    fn campaign_status(&self, id: CampaignId) -> Option<CampaignStatus> {
        self.campaigns.get(&id).and_then(Campaign::status_enum)
    }

    fn has_open_items(&self, campaign_id: CampaignId) -> bool {
        self.items.values().any(|item| {
            item.campaign_id == campaign_id
                && item.status_enum().map(QueueItemStatus::is_open).unwrap_or(false)
        })
    }

    /// Caller has checked that the campaign exists
    fn insert_contacts(
        &mut self,
        campaign_id: CampaignId,
        tenant_id: TenantId,
        contacts: Vec<CreateContact>,
        now: DateTime<Utc>,
    ) -> Vec<Contact> {
        let mut created = Vec::with_capacity(contacts.len());
        for input in contacts {
            let contact = Contact {
                id: Uuid::now_v7(),
                campaign_id,
                tenant_id,
                phone_number: input.phone_number,
                name: input.name,
                created_at: now,
            };
            self.campaign_contacts
                .entry(campaign_id)
                .or_default()
                .push(contact.id);
            self.contacts.insert(contact.id, contact.clone());
            created.push(contact);
        }
        created
    }

    fn new_item(
        campaign_id: CampaignId,
        contact_id: ContactId,
        attempt_number: i32,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> QueueItem {
        QueueItem {
            id: Uuid::now_v7(),
            campaign_id,
            contact_id,
            attempt_number,
            status: QueueItemStatus::Queued.to_string(),
            scheduled_at,
            dispatched_at: None,
            finished_at: None,
            outcome: None,
            dispatch_failures: 0,
            last_error: None,
            is_live: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Campaign store kept entirely in process memory
#[derive(Clone, Default)]
pub struct InMemoryCampaignStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant. Tenants are owned by the CRM, so there is no trait
    /// method for this.
    pub async fn insert_tenant(&self, id: TenantId, name: &str, timezone: Option<&str>) {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        state.tenants.insert(
            id,
            Tenant {
                id,
                name: name.to_string(),
                timezone: timezone.map(str::to_string),
                created_at: now,
                updated_at: now,
            },
        );
    }

    /// Snapshot of every queue item of a campaign
    pub async fn items_for_campaign(&self, campaign_id: CampaignId) -> Vec<QueueItem> {
        let state = self.state.lock().await;
        let mut items: Vec<QueueItem> = state
            .items
            .values()
            .filter(|item| item.campaign_id == campaign_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.created_at, item.attempt_number));
        items
    }
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn create_campaign(
        &self,
        input: CreateCampaign,
        contacts: Vec<CreateContact>,
    ) -> Result<(Campaign, Vec<Contact>)> {
        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::now_v7(),
            tenant_id: input.tenant_id,
            name: input.name,
            agent_id: input.agent_id,
            phone_number_id: input.phone_number_id,
            first_call_time: input.first_call_time,
            last_call_time: input.last_call_time,
            use_custom_timezone: input.use_custom_timezone,
            timezone: input.timezone,
            start_date: input.start_date,
            end_date: input.end_date,
            max_retries: input.max_retries,
            retry_interval_minutes: input.retry_interval_minutes,
            status: CampaignStatus::Pending.to_string(),
            total_contacts: 0,
            completed_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            metadata: input.metadata.unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };

        let mut state = self.state.lock().await;
        state.campaigns.insert(campaign.id, campaign.clone());
        let contacts = state.insert_contacts(campaign.id, campaign.tenant_id, contacts, now);
        Ok((campaign, contacts))
    }

    async fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.state.lock().await.campaigns.get(&id).cloned())
    }

    async fn list_campaigns_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        let state = self.state.lock().await;
        let mut campaigns: Vec<Campaign> = state
            .campaigns
            .values()
            .filter(|c| c.status_enum() == Some(status))
            .cloned()
            .collect();
        campaigns.sort_by_key(|c| c.created_at);
        Ok(campaigns)
    }

    async fn transition_campaign(
        &self,
        id: CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>> {
        let mut state = self.state.lock().await;
        let Some(campaign) = state.campaigns.get_mut(&id) else {
            return Ok(None);
        };
        match campaign.status_enum() {
            Some(current) if from.contains(&current) => {}
            _ => return Ok(None),
        }

        campaign.status = to.to_string();
        campaign.updated_at = now;
        if to.is_terminal() && campaign.completed_at.is_none() {
            campaign.completed_at = Some(now);
        }
        Ok(Some(campaign.clone()))
    }

    async fn tenant_timezone(&self, tenant_id: TenantId) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.tenants.get(&tenant_id).and_then(|t| t.timezone.clone()))
    }

    async fn add_contacts(
        &self,
        campaign_id: CampaignId,
        contacts: Vec<CreateContact>,
    ) -> Result<Vec<Contact>> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let campaign = state
            .campaigns
            .get(&campaign_id)
            .ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))?;
        if campaign.status_enum() != Some(CampaignStatus::Pending) {
            return Err(Error::Conflict(format!(
                "campaign {} is {}, contacts can only be added while pending",
                campaign_id, campaign.status
            )));
        }

        let tenant_id = campaign.tenant_id;
        Ok(state.insert_contacts(campaign_id, tenant_id, contacts, now))
    }

    async fn get_contact(&self, id: ContactId) -> Result<Option<Contact>> {
        Ok(self.state.lock().await.contacts.get(&id).cloned())
    }

    async fn activate_campaign(
        &self,
        id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>> {
        let mut state = self.state.lock().await;
        if state.campaign_status(id) != Some(CampaignStatus::Pending) {
            return Ok(None);
        }

        let contact_ids = state.campaign_contacts.get(&id).cloned().unwrap_or_default();
        for contact_id in &contact_ids {
            let item = InMemoryState::new_item(id, *contact_id, 1, now, now);
            state.items.insert(item.id, item);
        }

        let Some(campaign) = state.campaigns.get_mut(&id) else {
            return Ok(None);
        };
        campaign.status = CampaignStatus::Active.to_string();
        campaign.total_contacts = i32::try_from(contact_ids.len())
            .map_err(|_| Error::Internal("too many contacts".to_string()))?;
        campaign.started_at.get_or_insert(now);
        campaign.updated_at = now;
        Ok(Some(campaign.clone()))
    }

    async fn complete_if_finished(
        &self,
        id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>> {
        let mut state = self.state.lock().await;
        if state.campaign_status(id) != Some(CampaignStatus::Active) || state.has_open_items(id) {
            return Ok(None);
        }

        let Some(campaign) = state.campaigns.get_mut(&id) else {
            return Ok(None);
        };
        if campaign.completed_calls < campaign.total_contacts {
            return Ok(None);
        }
        campaign.status = CampaignStatus::Completed.to_string();
        campaign.completed_at.get_or_insert(now);
        campaign.updated_at = now;
        Ok(Some(campaign.clone()))
    }

    async fn get_queue_item(&self, id: QueueItemId) -> Result<Option<QueueItem>> {
        Ok(self.state.lock().await.items.get(&id).cloned())
    }

    async fn list_attempts(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<Vec<QueueItem>> {
        let state = self.state.lock().await;
        let mut attempts: Vec<QueueItem> = state
            .items
            .values()
            .filter(|i| i.campaign_id == campaign_id && i.contact_id == contact_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|i| i.attempt_number);
        Ok(attempts)
    }

    async fn list_due_items(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QueueItem>> {
        let state = self.state.lock().await;
        let mut due: Vec<QueueItem> = state
            .items
            .values()
            .filter(|i| {
                i.campaign_id == campaign_id
                    && i.is_live
                    && i.status_enum() == Some(QueueItemStatus::Queued)
                    && i.scheduled_at <= now
            })
            .cloned()
            .collect();
        due.sort_by_key(|i| (i.scheduled_at, i.created_at));
        due.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn claim_item(&self, id: QueueItemId, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(campaign_id) = state.items.get(&id).map(|i| i.campaign_id) else {
            return Ok(false);
        };
        if state.campaign_status(campaign_id) != Some(CampaignStatus::Active) {
            return Ok(false);
        }

        match state.items.get_mut(&id) {
            Some(item)
                if item.is_live
                    && item.status_enum() == Some(QueueItemStatus::Queued)
                    && item.scheduled_at <= now =>
            {
                item.status = QueueItemStatus::InProgress.to_string();
                item.dispatched_at = Some(now);
                item.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_item(
        &self,
        id: QueueItemId,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.items.get_mut(&id) {
            Some(item) if item.status_enum() == Some(QueueItemStatus::InProgress) => {
                item.status = QueueItemStatus::Queued.to_string();
                item.dispatched_at = None;
                item.dispatch_failures += 1;
                item.last_error = Some(error.to_string());
                item.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn recycle_stuck_items(
        &self,
        dispatched_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>> {
        let mut state = self.state.lock().await;
        let mut recycled = Vec::new();
        for item in state.items.values_mut() {
            let stuck = item.status_enum() == Some(QueueItemStatus::InProgress)
                && item.dispatched_at.map(|at| at < dispatched_before).unwrap_or(false);
            if stuck {
                item.status = QueueItemStatus::Queued.to_string();
                item.dispatched_at = None;
                item.dispatch_failures += 1;
                item.last_error = Some("no outcome reported".to_string());
                item.updated_at = now;
                recycled.push(item.clone());
            }
        }
        Ok(recycled)
    }

    async fn apply_outcome(&self, update: OutcomeUpdate) -> Result<bool> {
        let mut state = self.state.lock().await;
        let (campaign_id, contact_id) = match state.items.get(&update.queue_item_id) {
            Some(item) if !item.is_terminal() => (item.campaign_id, item.contact_id),
            _ => return Ok(false),
        };

        if let Some(next) = &update.next_attempt {
            let duplicate = state.items.values().any(|i| {
                i.contact_id == contact_id && i.attempt_number == next.attempt_number
            });
            if duplicate {
                return Err(Error::Conflict(format!(
                    "attempt {} already exists for contact {}",
                    next.attempt_number, contact_id
                )));
            }
        }

        if let Some(item) = state.items.get_mut(&update.queue_item_id) {
            item.status = update.status.to_string();
            item.outcome = Some(update.outcome.clone());
            item.finished_at = Some(update.occurred_at);
            item.updated_at = update.occurred_at;
            if update.next_attempt.is_some() {
                item.is_live = false;
            }
        }

        if let Some(tally) = update.tally {
            if let Some(campaign) = state.campaigns.get_mut(&campaign_id) {
                campaign.completed_calls += 1;
                match tally {
                    Tally::Successful => campaign.successful_calls += 1,
                    Tally::Failed => campaign.failed_calls += 1,
                }
                campaign.updated_at = update.occurred_at;
            }
        }

        if let Some(next) = update.next_attempt {
            let retry = InMemoryState::new_item(
                campaign_id,
                contact_id,
                next.attempt_number,
                next.scheduled_at,
                update.occurred_at,
            );
            state.items.insert(retry.id, retry);
        }

        Ok(true)
    }

    async fn expire_queued_items(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut expired = 0i32;
        for item in state.items.values_mut() {
            if item.campaign_id == campaign_id
                && item.is_live
                && item.status_enum() == Some(QueueItemStatus::Queued)
            {
                item.status = QueueItemStatus::Failed.to_string();
                item.outcome = Some("expired".to_string());
                item.finished_at = Some(now);
                item.updated_at = now;
                expired += 1;
            }
        }

        if expired > 0 {
            if let Some(campaign) = state.campaigns.get_mut(&campaign_id) {
                campaign.completed_calls += expired;
                campaign.failed_calls += expired;
                campaign.updated_at = now;
            }
        }
        Ok(expired as u64)
    }
}
