//! Campaign completion evaluator

use std::sync::Arc;

use dialwave_common::types::CampaignId;
use dialwave_common::Result;
use dialwave_storage::repository::CampaignStore;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::notify::CompletionNotifier;

/// Performs the only `active -> completed` transition
///
/// A campaign completes when every contact has a final outcome and none of
/// its queue items is queued or in progress. The check and the transition are
/// a single conditional write in the store, so concurrent callers complete a
/// campaign at most once.
#[derive(Clone)]
pub struct CompletionEvaluator {
    store: Arc<dyn CampaignStore>,
    notifier: Arc<dyn CompletionNotifier>,
    clock: Arc<dyn Clock>,
}

impl CompletionEvaluator {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        notifier: Arc<dyn CompletionNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// Complete the campaign if it is finished. Returns whether this call
    /// performed the transition.
    pub async fn maybe_complete(&self, campaign_id: CampaignId) -> Result<bool> {
        let now = self.clock.now();
        let Some(campaign) = self.store.complete_if_finished(campaign_id, now).await? else {
            return Ok(false);
        };

        info!(
            campaign_id = %campaign.id,
            total = campaign.total_contacts,
            successful = campaign.successful_calls,
            failed = campaign.failed_calls,
            "Campaign completed"
        );

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.campaign_completed(&campaign).await {
                warn!(campaign_id = %campaign.id, "Completion notification failed: {}", e);
            }
        });

        Ok(true)
    }
}
