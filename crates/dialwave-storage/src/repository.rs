//! Repository layer for data access

pub mod memory;
pub mod postgres;

pub use memory::InMemoryCampaignStore;
pub use postgres::PgCampaignStore;

use crate::models::{
    Campaign, CampaignStatus, Contact, CreateCampaign, CreateContact, OutcomeUpdate, QueueItem,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialwave_common::types::{CampaignId, ContactId, QueueItemId, TenantId};
use dialwave_common::Result;

/// Persistence port of the scheduling core
///
/// Every method that changes more than one row is atomic: either all of its
/// writes become visible or none do.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    // ---- campaigns ----

    /// Insert a `pending` campaign together with its contacts. The campaign
    /// is never visible without them.
    async fn create_campaign(
        &self,
        input: CreateCampaign,
        contacts: Vec<CreateContact>,
    ) -> Result<(Campaign, Vec<Contact>)>;
    async fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>>;
    async fn list_campaigns_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>>;

    /// Move a campaign to `to` only if its current status is one of `from`.
    /// Returns `None` when the campaign does not exist or is in another state.
    async fn transition_campaign(
        &self,
        id: CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>>;

    /// Tenant default timezone, if the tenant has one
    async fn tenant_timezone(&self, tenant_id: TenantId) -> Result<Option<String>>;

    // ---- contacts ----

    /// Append contacts to a campaign that is still `pending`. Fails with
    /// `Conflict` once the campaign has been activated.
    async fn add_contacts(
        &self,
        campaign_id: CampaignId,
        contacts: Vec<CreateContact>,
    ) -> Result<Vec<Contact>>;
    async fn get_contact(&self, id: ContactId) -> Result<Option<Contact>>;

    // ---- lifecycle ----

    /// `pending -> active`: snapshot `total_contacts` and seed one attempt-1
    /// item per contact, scheduled at `now`.
    async fn activate_campaign(&self, id: CampaignId, now: DateTime<Utc>)
        -> Result<Option<Campaign>>;

    /// `active -> completed` when every contact has a final outcome and no
    /// item is queued or in progress. Returns the completed campaign only to
    /// the caller that performed the transition.
    async fn complete_if_finished(
        &self,
        id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>>;

    // ---- call queue ----

    async fn get_queue_item(&self, id: QueueItemId) -> Result<Option<QueueItem>>;

    /// All attempts of one contact, oldest first
    async fn list_attempts(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<Vec<QueueItem>>;

    /// Live queued items whose `scheduled_at <= now`, earliest first
    async fn list_due_items(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QueueItem>>;

    /// `queued -> in_progress` if the item is still queued, due at `now` and
    /// its campaign is active. Returns false when another worker won.
    async fn claim_item(&self, id: QueueItemId, now: DateTime<Utc>) -> Result<bool>;

    /// `in_progress -> queued` after a dispatch failure
    async fn release_item(&self, id: QueueItemId, error: &str, now: DateTime<Utc>)
        -> Result<bool>;

    /// Return in-progress items dispatched before `dispatched_before` to the
    /// queue. Returns the recycled items.
    async fn recycle_stuck_items(
        &self,
        dispatched_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>>;

    /// Apply a terminal outcome: compare-and-set the item to its terminal
    /// status, bump counters if the attempt is final for the contact, and
    /// insert the follow-up attempt if one is scheduled.
    ///
    /// Returns false when the item was already terminal (nothing written).
    async fn apply_outcome(&self, update: OutcomeUpdate) -> Result<bool>;

    /// Fail every live queued item of a campaign as `expired`, counting each
    /// as a final failure. Returns the number of contacts finalized.
    async fn expire_queued_items(&self, campaign_id: CampaignId, now: DateTime<Utc>)
        -> Result<u64>;
}

pub(crate) fn status_strings(statuses: &[CampaignStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.to_string()).collect()
}
