//! Outcome processing: retry policy, then ledger, then completion

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dialwave_common::types::QueueItemId;
use dialwave_common::{Error, Result};
use dialwave_storage::models::CampaignStatus;
use dialwave_storage::repository::CampaignStore;
use tracing::{debug, info};

use super::ledger::{CounterLedger, LedgerEntry, OutcomeTransition};
use super::retry::{FailureReason, FinalOutcome, RetryDecision, RetryPolicy};
use super::timezone::effective_timezone;

/// Entry point for terminal call outcomes reported by the provider
#[derive(Clone)]
pub struct OutcomeProcessor {
    store: Arc<dyn CampaignStore>,
    ledger: CounterLedger,
}

impl OutcomeProcessor {
    pub fn new(store: Arc<dyn CampaignStore>, ledger: CounterLedger) -> Self {
        Self { store, ledger }
    }

    /// Record a terminal outcome for a queue item
    ///
    /// Duplicate and unknown notifications are not errors; they are reported
    /// through the returned `LedgerEntry`.
    pub async fn record_call_outcome(
        &self,
        queue_item_id: QueueItemId,
        status: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        let Some(item) = self.store.get_queue_item(queue_item_id).await? else {
            debug!(%queue_item_id, status, "Outcome for unknown queue item ignored");
            return Ok(LedgerEntry::UnknownItem);
        };
        if item.is_terminal() {
            debug!(%queue_item_id, status, previous = ?item.outcome, "Duplicate outcome ignored");
            return Ok(LedgerEntry::Duplicate);
        }

        let campaign = self
            .store
            .get_campaign(item.campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", item.campaign_id)))?;

        let tenant_tz = self.store.tenant_timezone(campaign.tenant_id).await?;
        let tz = effective_timezone(&campaign, tenant_tz.as_deref());
        let mut decision =
            RetryPolicy::for_campaign(&campaign, tz).decide(item.attempt_number, status, occurred_at);

        // Cancelled or finished campaigns take no new attempts.
        let closed = campaign
            .status_enum()
            .map(CampaignStatus::is_terminal)
            .unwrap_or(false);
        if closed && decision.is_retry() {
            decision = RetryDecision::Final(FinalOutcome::Failure {
                reason: FailureReason::CampaignClosed,
            });
        }

        info!(
            campaign_id = %campaign.id,
            %queue_item_id,
            contact_id = %item.contact_id,
            attempt = item.attempt_number,
            status,
            decision = ?decision,
            "Call outcome received"
        );

        self.ledger
            .record_outcome(
                campaign.id,
                queue_item_id,
                OutcomeTransition {
                    raw_status: status.to_string(),
                    occurred_at,
                    decision,
                },
            )
            .await
    }
}
