//! Campaign scheduling and retry orchestration

mod completion;
mod ledger;
mod manager;
mod outcome;
mod retry;
mod scheduler;
pub mod timezone;
pub mod window;

pub use completion::CompletionEvaluator;
pub use ledger::{CounterLedger, LedgerEntry, OutcomeTransition};
pub use manager::{validate_config, CampaignError, CampaignManager, CreatedCampaign};
pub use outcome::OutcomeProcessor;
pub use retry::{
    classify_outcome, next_attempt_earliest_instant, should_retry, FailureReason, FinalOutcome,
    OutcomeClass, RetryDecision, RetryPolicy,
};
pub use scheduler::{CampaignScheduler, DispatchJob, TickReport};
pub use timezone::{effective_timezone, is_valid_timezone};
pub use window::{is_within_window, next_window_start, CallWindow, WindowError};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use dialwave_common::types::CampaignId;
    use dialwave_storage::models::{Campaign, CreateCampaign, CreateContact, QueueItem};
    use dialwave_storage::repository::{CampaignStore, InMemoryCampaignStore};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::*;
    use crate::clock::{Clock, FixedClock};
    use crate::dialer::{CallExecutor, DispatchError, DispatchRequest, DispatchResponse};
    use crate::notify::CompletionNotifier;

    /// 2024-05-01 10:00 UTC, a Wednesday
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    pub fn campaign() -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Spring renewals".to_string(),
            agent_id: None,
            phone_number_id: None,
            first_call_time: "09:00".to_string(),
            last_call_time: "17:00".to_string(),
            use_custom_timezone: false,
            timezone: None,
            start_date: None,
            end_date: None,
            max_retries: 2,
            retry_interval_minutes: 60,
            status: "active".to_string(),
            total_contacts: 0,
            completed_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            metadata: serde_json::json!({}),
            created_at: t0(),
            updated_at: t0(),
            started_at: Some(t0()),
            completed_at: None,
        }
    }

    pub fn campaign_input() -> CreateCampaign {
        CreateCampaign {
            tenant_id: Uuid::new_v4(),
            name: "Spring renewals".to_string(),
            agent_id: Some(Uuid::new_v4()),
            phone_number_id: Some(Uuid::new_v4()),
            first_call_time: "09:00".to_string(),
            last_call_time: "17:00".to_string(),
            use_custom_timezone: false,
            timezone: None,
            start_date: None,
            end_date: None,
            max_retries: 2,
            retry_interval_minutes: 60,
            metadata: None,
        }
    }

    pub fn contacts(n: usize) -> Vec<CreateContact> {
        (0..n)
            .map(|i| CreateContact {
                phone_number: format!("+1555010{:04}", i),
                name: Some(format!("Lead {}", i)),
            })
            .collect()
    }

    /// Records every dispatch; the first `fail_next` dispatches time out
    #[derive(Default)]
    pub struct RecordingExecutor {
        requests: Mutex<Vec<DispatchRequest>>,
        failures: AtomicUsize,
    }

    impl RecordingExecutor {
        pub fn fail_next(&self, n: usize) {
            self.failures.store(n, Ordering::SeqCst);
        }

        pub async fn requests(&self) -> Vec<DispatchRequest> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl CallExecutor for RecordingExecutor {
        async fn dispatch(
            &self,
            request: &DispatchRequest,
        ) -> Result<DispatchResponse, DispatchError> {
            self.requests.lock().await.push(request.clone());
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(DispatchError::Transport("connection timed out".to_string()));
            }
            Ok(DispatchResponse::Accepted)
        }
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        completed: Mutex<Vec<CampaignId>>,
    }

    impl RecordingNotifier {
        pub async fn completed(&self) -> Vec<CampaignId> {
            self.completed.lock().await.clone()
        }
    }

    #[async_trait]
    impl CompletionNotifier for RecordingNotifier {
        async fn campaign_completed(&self, campaign: &Campaign) -> dialwave_common::Result<()> {
            self.completed.lock().await.push(campaign.id);
            Ok(())
        }
    }

    /// Scheduling core wired to an in-memory store and a fixed clock at `t0()`
    pub struct Harness {
        pub store: Arc<InMemoryCampaignStore>,
        pub clock: Arc<FixedClock>,
        pub executor: Arc<RecordingExecutor>,
        pub notifier: Arc<RecordingNotifier>,
        pub manager: CampaignManager,
        pub processor: OutcomeProcessor,
        pub scheduler: Arc<CampaignScheduler>,
    }

    impl Harness {
        pub async fn new() -> Self {
            Self::with_scheduler(|s| s).await
        }

        pub async fn with_scheduler(
            configure: impl FnOnce(CampaignScheduler) -> CampaignScheduler,
        ) -> Self {
            let store = Arc::new(InMemoryCampaignStore::new());
            let clock = Arc::new(FixedClock::new(t0()));
            let executor = Arc::new(RecordingExecutor::default());
            let notifier = Arc::new(RecordingNotifier::default());

            let dyn_store: Arc<dyn CampaignStore> = store.clone();
            let dyn_clock: Arc<dyn Clock> = clock.clone();

            let completion =
                CompletionEvaluator::new(dyn_store.clone(), notifier.clone(), dyn_clock.clone());
            let ledger = CounterLedger::new(dyn_store.clone(), completion.clone());
            let processor = OutcomeProcessor::new(dyn_store.clone(), ledger);
            let manager =
                CampaignManager::new(dyn_store.clone(), completion.clone(), dyn_clock.clone());
            let scheduler = configure(CampaignScheduler::new(
                dyn_store,
                executor.clone(),
                completion,
                dyn_clock,
            ));

            Self {
                store,
                clock,
                executor,
                notifier,
                manager,
                processor,
                scheduler: Arc::new(scheduler),
            }
        }

        pub async fn create(&self, input: CreateCampaign, n: usize) -> CampaignId {
            self.manager
                .create_campaign(input, contacts(n))
                .await
                .unwrap()
                .campaign
                .id
        }

        /// Tick, then run every queued dispatch inline
        pub async fn run_tick(&self) -> TickReport {
            let report = self.scheduler.tick().await;
            self.scheduler.drain_dispatch_queue().await;
            report
        }

        pub async fn outcome(&self, id: Uuid, status: &str) -> LedgerEntry {
            self.processor
                .record_call_outcome(id, status, self.clock.now())
                .await
                .unwrap()
        }

        pub async fn campaign(&self, id: CampaignId) -> Campaign {
            self.manager.get_campaign(id).await.unwrap()
        }

        /// The live attempt of a single-contact campaign
        pub async fn live_item(&self, id: CampaignId) -> QueueItem {
            let mut live: Vec<QueueItem> = self
                .store
                .items_for_campaign(id)
                .await
                .into_iter()
                .filter(|i| i.is_live)
                .collect();
            assert!(!live.is_empty(), "campaign {id} has no live item");
            live.remove(0)
        }

        /// Let spawned notification tasks run
        pub async fn settle(&self) {
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
        }
    }
}
