//! Campaign counter ledger

use chrono::{DateTime, Utc};
use dialwave_common::types::{CampaignId, QueueItemId};
use dialwave_common::Result;
use dialwave_storage::models::{NextAttempt, OutcomeUpdate, QueueItemStatus, Tally};
use dialwave_storage::repository::CampaignStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::completion::CompletionEvaluator;
use super::retry::{FinalOutcome, RetryDecision};

/// Result of recording an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LedgerEntry {
    /// First terminal transition of the item; counters and retry written
    Applied { campaign_completed: bool },
    /// The item was already terminal; nothing changed
    Duplicate,
    /// No such queue item
    UnknownItem,
}

/// Terminal transition of one queue item, already decided by the retry policy
#[derive(Debug, Clone)]
pub struct OutcomeTransition {
    pub raw_status: String,
    pub occurred_at: DateTime<Utc>,
    pub decision: RetryDecision,
}

impl OutcomeTransition {
    fn into_update(self, campaign_id: CampaignId, queue_item_id: QueueItemId) -> OutcomeUpdate {
        let (status, tally, next_attempt) = match self.decision {
            RetryDecision::Final(FinalOutcome::Success) => {
                (QueueItemStatus::Completed, Some(Tally::Successful), None)
            }
            RetryDecision::Final(FinalOutcome::Failure { .. }) => {
                (QueueItemStatus::Failed, Some(Tally::Failed), None)
            }
            RetryDecision::Retry {
                attempt_number,
                scheduled_at,
            } => (
                QueueItemStatus::Failed,
                None,
                Some(NextAttempt {
                    attempt_number,
                    scheduled_at,
                }),
            ),
        };

        OutcomeUpdate {
            queue_item_id,
            campaign_id,
            status,
            outcome: self.raw_status,
            occurred_at: self.occurred_at,
            tally,
            next_attempt,
        }
    }
}

/// Sole writer of the campaign counters
///
/// Counters are per contact: a retried attempt ends `failed` on its queue
/// item but only the contact's final attempt is counted.
#[derive(Clone)]
pub struct CounterLedger {
    store: Arc<dyn CampaignStore>,
    completion: CompletionEvaluator,
}

impl CounterLedger {
    pub fn new(store: Arc<dyn CampaignStore>, completion: CompletionEvaluator) -> Self {
        Self { store, completion }
    }

    /// Apply a terminal transition exactly once, then evaluate completion
    pub async fn record_outcome(
        &self,
        campaign_id: CampaignId,
        queue_item_id: QueueItemId,
        transition: OutcomeTransition,
    ) -> Result<LedgerEntry> {
        let update = transition.into_update(campaign_id, queue_item_id);
        let retried = update.next_attempt.is_some();

        if !self.store.apply_outcome(update).await? {
            return match self.store.get_queue_item(queue_item_id).await? {
                Some(_) => {
                    debug!(%queue_item_id, "Duplicate outcome ignored");
                    Ok(LedgerEntry::Duplicate)
                }
                None => {
                    debug!(%queue_item_id, "Outcome for unknown queue item ignored");
                    Ok(LedgerEntry::UnknownItem)
                }
            };
        }

        debug!(%campaign_id, %queue_item_id, retried, "Outcome recorded");

        // The retry item, if any, is already visible here.
        let campaign_completed = self.completion.maybe_complete(campaign_id).await?;
        Ok(LedgerEntry::Applied { campaign_completed })
    }
}
