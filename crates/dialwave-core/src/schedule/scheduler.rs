//! Campaign Scheduler - periodic sweep feeding a pool of dispatch workers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use dialwave_common::config::SchedulerConfig;
use dialwave_common::types::TenantId;
use dialwave_storage::models::{Campaign, CampaignStatus, QueueItem};
use dialwave_storage::repository::CampaignStore;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::completion::CompletionEvaluator;
use super::timezone::effective_timezone;
use super::window::{is_within_dates, CallWindow};
use crate::clock::Clock;
use crate::dialer::{CallExecutor, DispatchRequest, DispatchResponse};

/// A claimed queue item waiting for a dispatch worker
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub request: DispatchRequest,
}

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub activated: usize,
    pub recycled: usize,
    pub expired: u64,
    pub completed: usize,
    pub dispatched: usize,
}

/// Tenant timezones looked up during one tick
type TenantZones = HashMap<TenantId, Option<String>>;

/// Campaign Scheduler
///
/// Each tick activates due `pending` campaigns, recycles stuck attempts,
/// expires campaigns past their end date, and claims due queue items of
/// `active` campaigns whose calling window is open. Claimed items go onto a
/// bounded queue drained by the dispatch workers. Claiming is a
/// compare-and-set, so overlapping ticks never dispatch an item twice.
pub struct CampaignScheduler {
    store: Arc<dyn CampaignStore>,
    executor: Arc<dyn CallExecutor>,
    completion: CompletionEvaluator,
    clock: Arc<dyn Clock>,
    dispatch_tx: mpsc::Sender<DispatchJob>,
    dispatch_rx: Arc<Mutex<mpsc::Receiver<DispatchJob>>>,
    /// Number of dispatch workers
    concurrency: usize,
    /// Due items fetched per campaign per tick
    batch_size: i64,
    /// Interval between ticks (seconds)
    tick_interval_secs: u64,
    /// In-progress age after which an attempt is recycled
    stuck_after: Duration,
}

impl CampaignScheduler {
    /// Create a scheduler with default settings
    pub fn new(
        store: Arc<dyn CampaignStore>,
        executor: Arc<dyn CallExecutor>,
        completion: CompletionEvaluator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let defaults = SchedulerConfig::default();
        let (dispatch_tx, dispatch_rx) = mpsc::channel(defaults.queue_capacity.max(1));

        Self {
            store,
            executor,
            completion,
            clock,
            dispatch_tx,
            dispatch_rx: Arc::new(Mutex::new(dispatch_rx)),
            concurrency: defaults.concurrency,
            batch_size: defaults.batch_size,
            tick_interval_secs: defaults.tick_interval_secs,
            stuck_after: Duration::seconds(defaults.stuck_after_secs as i64),
        }
    }

    /// Apply scheduler configuration. Must be called before workers start.
    pub fn with_config(self, config: &SchedulerConfig) -> Self {
        self.with_queue_capacity(config.queue_capacity)
            .with_concurrency(config.concurrency)
            .with_batch_size(config.batch_size)
            .with_tick_interval(config.tick_interval_secs)
            .with_stuck_after(Duration::seconds(config.stuck_after_secs as i64))
    }

    /// Set number of dispatch workers
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    /// Set batch size
    pub fn with_batch_size(mut self, size: i64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set tick interval
    pub fn with_tick_interval(mut self, secs: u64) -> Self {
        self.tick_interval_secs = secs.max(1);
        self
    }

    /// Set stuck guard
    pub fn with_stuck_after(mut self, after: Duration) -> Self {
        self.stuck_after = after;
        self
    }

    /// Replace the dispatch queue with one of the given capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(capacity.max(1));
        self.dispatch_tx = dispatch_tx;
        self.dispatch_rx = Arc::new(Mutex::new(dispatch_rx));
        self
    }

    /// Run dispatch workers and the tick loop forever
    pub async fn run(self: Arc<Self>) {
        let workers = self.spawn_dispatch_workers();
        let mut ticker = interval(StdDuration::from_secs(self.tick_interval_secs));

        info!(
            "Campaign scheduler started (workers: {}, batch: {}, interval: {}s)",
            workers.len(),
            self.batch_size,
            self.tick_interval_secs
        );

        loop {
            ticker.tick().await;
            let report = self.tick().await;
            if report != TickReport::default() {
                debug!(?report, "Scheduler tick finished");
            }
        }
    }

    /// Start the dispatch worker pool
    pub fn spawn_dispatch_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.concurrency)
            .map(|worker| {
                let scheduler = Arc::clone(self);
                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut rx = scheduler.dispatch_rx.lock().await;
                            rx.recv().await
                        };
                        match job {
                            Some(job) => scheduler.execute_dispatch(job).await,
                            None => {
                                debug!(worker, "Dispatch queue closed, worker exiting");
                                break;
                            }
                        }
                    }
                })
            })
            .collect()
    }

    /// Execute every job currently queued on the calling task. Returns the
    /// number of jobs executed.
    pub async fn drain_dispatch_queue(&self) -> usize {
        let mut executed = 0;
        loop {
            let job = {
                let mut rx = self.dispatch_rx.lock().await;
                rx.try_recv().ok()
            };
            let Some(job) = job else {
                return executed;
            };
            self.execute_dispatch(job).await;
            executed += 1;
        }
    }

    /// One sweep over all campaigns
    pub async fn tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut zones = TenantZones::new();
        let mut report = TickReport::default();

        match self.activate_pending_campaigns(now, &mut zones).await {
            Ok((activated, completed)) => {
                report.activated = activated;
                report.completed += completed;
            }
            Err(e) => error!("Error activating pending campaigns: {}", e),
        }

        match self.recycle_stuck_items(now).await {
            Ok(recycled) => report.recycled = recycled,
            Err(e) => error!("Error recycling stuck queue items: {}", e),
        }

        if let Err(e) = self
            .process_active_campaigns(now, &mut zones, &mut report)
            .await
        {
            error!("Error processing active campaigns: {}", e);
        }

        report
    }

    async fn timezone_for(&self, campaign: &Campaign, zones: &mut TenantZones) -> Result<Tz> {
        if !zones.contains_key(&campaign.tenant_id) {
            let tz = self.store.tenant_timezone(campaign.tenant_id).await?;
            zones.insert(campaign.tenant_id, tz);
        }
        let tenant_tz = zones.get(&campaign.tenant_id).and_then(|tz| tz.as_deref());
        Ok(effective_timezone(campaign, tenant_tz))
    }

    /// `pending -> active` once the start date is reached
    async fn activate_pending_campaigns(
        &self,
        now: DateTime<Utc>,
        zones: &mut TenantZones,
    ) -> Result<(usize, usize)> {
        let mut activated = 0;
        let mut completed = 0;

        for campaign in self
            .store
            .list_campaigns_by_status(CampaignStatus::Pending)
            .await?
        {
            let tz = match self.timezone_for(&campaign, zones).await {
                Ok(tz) => tz,
                Err(e) => {
                    error!(campaign_id = %campaign.id, "Failed to resolve timezone: {}", e);
                    continue;
                }
            };
            let today = now.with_timezone(&tz).date_naive();
            if campaign.start_date.map_or(false, |start| today < start) {
                continue;
            }

            match self.store.activate_campaign(campaign.id, now).await {
                Ok(Some(active)) => {
                    activated += 1;
                    info!(
                        campaign_id = %active.id,
                        contacts = active.total_contacts,
                        timezone = %tz,
                        "Campaign activated"
                    );
                    if active.total_contacts == 0 {
                        match self.completion.maybe_complete(active.id).await {
                            Ok(true) => completed += 1,
                            Ok(false) => {}
                            Err(e) => error!(campaign_id = %active.id, "Failed to complete campaign: {}", e),
                        }
                    }
                }
                Ok(None) => debug!(campaign_id = %campaign.id, "Campaign already activated"),
                Err(e) => error!(campaign_id = %campaign.id, "Failed to activate campaign: {}", e),
            }
        }

        Ok((activated, completed))
    }

    /// Return attempts stuck in progress to the queue as dispatch failures
    async fn recycle_stuck_items(&self, now: DateTime<Utc>) -> Result<usize> {
        let recycled = self
            .store
            .recycle_stuck_items(now - self.stuck_after, now)
            .await?;

        for item in &recycled {
            warn!(
                queue_item_id = %item.id,
                campaign_id = %item.campaign_id,
                attempt = item.attempt_number,
                dispatch_failures = item.dispatch_failures,
                "No outcome reported for attempt, returned to queue"
            );
        }

        Ok(recycled.len())
    }

    async fn process_active_campaigns(
        &self,
        now: DateTime<Utc>,
        zones: &mut TenantZones,
        report: &mut TickReport,
    ) -> Result<()> {
        let campaigns = self
            .store
            .list_campaigns_by_status(CampaignStatus::Active)
            .await?;

        let mut queue_full = false;
        for campaign in campaigns {
            let tz = match self.timezone_for(&campaign, zones).await {
                Ok(tz) => tz,
                Err(e) => {
                    error!(campaign_id = %campaign.id, "Failed to resolve timezone: {}", e);
                    continue;
                }
            };
            let today = now.with_timezone(&tz).date_naive();

            if campaign.end_date.map_or(false, |end| today > end) {
                match self.store.expire_queued_items(campaign.id, now).await {
                    Ok(0) => {}
                    Ok(expired) => {
                        info!(campaign_id = %campaign.id, expired, "End date passed, remaining contacts failed");
                        report.expired += expired;
                    }
                    Err(e) => error!(campaign_id = %campaign.id, "Failed to expire queue items: {}", e),
                }
            }

            match self.completion.maybe_complete(campaign.id).await {
                Ok(true) => {
                    report.completed += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => error!(campaign_id = %campaign.id, "Failed to check completion: {}", e),
            }

            if queue_full {
                continue;
            }
            match self.dispatch_campaign(&campaign, tz, now).await {
                Ok((dispatched, full)) => {
                    report.dispatched += dispatched;
                    queue_full = full;
                }
                Err(e) => error!(campaign_id = %campaign.id, "Failed to dispatch campaign: {}", e),
            }
        }

        Ok(())
    }

    /// Claim due items of one campaign onto the dispatch queue. Returns the
    /// number claimed and whether the queue filled up.
    async fn dispatch_campaign(
        &self,
        campaign: &Campaign,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> Result<(usize, bool)> {
        let local = now.with_timezone(&tz);
        if !is_within_dates(local.date_naive(), campaign.start_date, campaign.end_date) {
            return Ok((0, false));
        }

        let window = CallWindow::lenient(&campaign.first_call_time, &campaign.last_call_time);
        if !window.contains(local.time()) {
            debug!(
                campaign_id = %campaign.id,
                local_time = %local.format("%H:%M"),
                "Outside calling window"
            );
            return Ok((0, false));
        }

        let due = self
            .store
            .list_due_items(campaign.id, now, self.batch_size)
            .await?;

        let mut dispatched = 0;
        for item in due {
            let Ok(permit) = self.dispatch_tx.try_reserve() else {
                warn!(campaign_id = %campaign.id, "Dispatch queue full, deferring to next tick");
                return Ok((dispatched, true));
            };

            if !self.store.claim_item(item.id, now).await? {
                debug!(queue_item_id = %item.id, "Queue item already claimed");
                continue;
            }

            match self.build_request(campaign, &item).await {
                Ok(request) => {
                    permit.send(DispatchJob { request });
                    dispatched += 1;
                }
                Err(e) => {
                    warn!(queue_item_id = %item.id, "Cannot build dispatch request: {}", e);
                    self.store.release_item(item.id, &e.to_string(), now).await?;
                }
            }
        }

        if dispatched > 0 {
            debug!(campaign_id = %campaign.id, dispatched, "Queued dispatches");
        }
        Ok((dispatched, false))
    }

    async fn build_request(&self, campaign: &Campaign, item: &QueueItem) -> Result<DispatchRequest> {
        let contact = self
            .store
            .get_contact(item.contact_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("contact {} not found", item.contact_id))?;

        Ok(DispatchRequest {
            queue_item_id: item.id,
            contact_id: contact.id,
            campaign_id: campaign.id,
            phone_number_id: campaign.phone_number_id,
            to_number: contact.phone_number,
            agent_id: campaign.agent_id,
            attempt_number: item.attempt_number,
        })
    }

    /// Hand one job to the Call Execution Service. Rejections and transport
    /// errors release the item without consuming a retry.
    async fn execute_dispatch(&self, job: DispatchJob) {
        let request = &job.request;
        let failure = match self.executor.dispatch(request).await {
            Ok(DispatchResponse::Accepted) => {
                debug!(
                    queue_item_id = %request.queue_item_id,
                    attempt = request.attempt_number,
                    "Dispatch accepted"
                );
                return;
            }
            Ok(DispatchResponse::Rejected { reason }) => reason,
            Err(e) => e.to_string(),
        };

        warn!(
            queue_item_id = %request.queue_item_id,
            campaign_id = %request.campaign_id,
            "Dispatch failed, item returned to queue: {}",
            failure
        );

        if let Err(e) = self
            .store
            .release_item(request.queue_item_id, &failure, self.clock.now())
            .await
        {
            error!(
                queue_item_id = %request.queue_item_id,
                "Failed to release queue item: {}", e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ledger::LedgerEntry;
    use crate::schedule::test_support::{campaign_input, Harness, t0};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use dialwave_common::types::{CampaignId, ContactId, QueueItemId};
    use dialwave_common::Result as StoreResult;
    use dialwave_storage::models::{Contact, CreateCampaign, CreateContact, OutcomeUpdate};
    use dialwave_storage::repository::InMemoryCampaignStore;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_single_contact_retries_before_completion() {
        let h = Harness::new().await;
        let id = h.create(campaign_input(), 1).await;

        // Attempt 1
        let report = h.run_tick().await;
        assert_eq!(report.activated, 1);
        assert_eq!(report.dispatched, 1);
        let first = h.live_item(id).await;
        assert_eq!(first.attempt_number, 1);

        let entry = h.outcome(first.id, "no-answer").await;
        assert_eq!(entry, LedgerEntry::Applied { campaign_completed: false });

        let campaign = h.campaign(id).await;
        assert_eq!(campaign.status, "active");
        assert_eq!(campaign.completed_calls, 0);
        let second = h.live_item(id).await;
        assert_eq!(second.attempt_number, 2);
        assert_eq!(second.status, "queued");
        assert_eq!(second.scheduled_at, t0() + Duration::minutes(60));

        // Not due yet
        assert_eq!(h.run_tick().await.dispatched, 0);

        // Attempt 2
        h.clock.advance(Duration::minutes(60));
        assert_eq!(h.run_tick().await.dispatched, 1);
        h.outcome(second.id, "no-answer").await;
        assert_eq!(h.campaign(id).await.status, "active");
        let third = h.live_item(id).await;
        assert_eq!(third.attempt_number, 3);

        // Attempt 3 succeeds
        h.clock.advance(Duration::minutes(60));
        assert_eq!(h.run_tick().await.dispatched, 1);
        let entry = h.outcome(third.id, "completed").await;
        assert_eq!(entry, LedgerEntry::Applied { campaign_completed: true });

        let campaign = h.campaign(id).await;
        assert_eq!(campaign.status, "completed");
        assert_eq!(campaign.completed_calls, 1);
        assert_eq!(campaign.successful_calls, 1);
        assert_eq!(campaign.failed_calls, 0);
        assert!(campaign.completed_at.is_some());

        let attempts = h.manager.list_attempts(id, first.contact_id).await.unwrap();
        let statuses: Vec<_> = attempts.iter().map(|a| a.status.as_str()).collect();
        assert_eq!(statuses, vec!["failed", "failed", "completed"]);

        h.settle().await;
        assert_eq!(h.notifier.completed().await, vec![id]);
    }

    #[tokio::test]
    async fn test_retries_exhausted_counts_failure() {
        let h = Harness::new().await;
        let mut input = campaign_input();
        input.max_retries = 1;
        let id = h.create(input, 1).await;

        h.run_tick().await;
        h.outcome(h.live_item(id).await.id, "busy").await;
        h.clock.advance(Duration::minutes(60));
        h.run_tick().await;
        let entry = h.outcome(h.live_item(id).await.id, "busy").await;
        assert_eq!(entry, LedgerEntry::Applied { campaign_completed: true });

        let campaign = h.campaign(id).await;
        assert_eq!(campaign.failed_calls, 1);
        assert_eq!(campaign.completed_calls, 1);
    }

    #[tokio::test]
    async fn test_duplicate_outcome_counts_once() {
        let h = Harness::new().await;
        let id = h.create(campaign_input(), 2).await;
        h.run_tick().await;

        let item = h.live_item(id).await;
        assert_eq!(
            h.outcome(item.id, "completed").await,
            LedgerEntry::Applied { campaign_completed: false }
        );
        assert_eq!(h.outcome(item.id, "completed").await, LedgerEntry::Duplicate);
        assert_eq!(h.outcome(item.id, "no-answer").await, LedgerEntry::Duplicate);

        let campaign = h.campaign(id).await;
        assert_eq!(campaign.completed_calls, 1);
        assert_eq!(campaign.successful_calls, 1);
        assert!(campaign.counters_consistent());
    }

    #[tokio::test]
    async fn test_unknown_queue_item() {
        let h = Harness::new().await;
        assert_eq!(
            h.outcome(uuid::Uuid::new_v4(), "completed").await,
            LedgerEntry::UnknownItem
        );
    }

    #[tokio::test]
    async fn test_dispatch_failures_do_not_consume_retries() {
        let h = Harness::new().await;
        h.executor.fail_next(2);
        let id = h.create(campaign_input(), 1).await;

        h.run_tick().await;
        h.run_tick().await;
        let item = h.live_item(id).await;
        assert_eq!(item.status, "queued");
        assert_eq!(item.attempt_number, 1);
        assert_eq!(item.dispatch_failures, 2);

        assert_eq!(h.run_tick().await.dispatched, 1);
        assert_eq!(h.live_item(id).await.status, "in_progress");
        h.outcome(item.id, "no-answer").await;

        let retry = h.live_item(id).await;
        assert_eq!(retry.attempt_number, 2);
        assert_eq!(h.executor.requests().await.len(), 3);
    }

    #[tokio::test]
    async fn test_overlapping_ticks_never_double_dispatch() {
        let h = Harness::new().await;
        let id = h.create(campaign_input(), 3).await;

        let first = h.scheduler.tick().await;
        let second = h.scheduler.tick().await;
        assert_eq!(first.dispatched, 3);
        assert_eq!(second.dispatched, 0);

        assert_eq!(h.scheduler.drain_dispatch_queue().await, 3);
        let requests = h.executor.requests().await;
        let mut ids: Vec<_> = requests.iter().map(|r| r.queue_item_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert!(requests.iter().all(|r| r.campaign_id == id));
    }

    #[tokio::test]
    async fn test_outside_window_is_skipped() {
        let h = Harness::new().await;
        let mut input = campaign_input();
        input.first_call_time = "13:00".to_string();
        input.last_call_time = "14:00".to_string();
        let id = h.create(input, 1).await;

        // 10:00 UTC
        let report = h.run_tick().await;
        assert_eq!(report.activated, 1);
        assert_eq!(report.dispatched, 0);
        assert_eq!(h.live_item(id).await.status, "queued");

        h.clock.advance(Duration::hours(3));
        assert_eq!(h.run_tick().await.dispatched, 1);
    }

    #[tokio::test]
    async fn test_window_uses_campaign_timezone() {
        let h = Harness::new().await;
        let mut input = campaign_input();
        input.use_custom_timezone = true;
        // 10:00 UTC is 06:00 EDT
        input.timezone = Some("America/New_York".to_string());
        let id = h.create(input, 1).await;

        assert_eq!(h.run_tick().await.dispatched, 0);
        h.clock.advance(Duration::hours(3));
        assert_eq!(h.run_tick().await.dispatched, 1);
        assert_eq!(h.live_item(id).await.status, "in_progress");
    }

    #[tokio::test]
    async fn test_tenant_timezone_fallback() {
        let h = Harness::new().await;
        let input = campaign_input();
        // 10:00 UTC is 19:00 in Tokyo
        h.store
            .insert_tenant(input.tenant_id, "Acme", Some("Asia/Tokyo"))
            .await;
        h.create(input, 1).await;

        assert_eq!(h.run_tick().await.dispatched, 0);
    }

    /// Store whose tenant lookup fails for one tenant
    struct TenantLookupFails {
        inner: Arc<InMemoryCampaignStore>,
        tenant_id: TenantId,
    }

    #[async_trait]
    impl CampaignStore for TenantLookupFails {
        async fn create_campaign(
            &self,
            input: CreateCampaign,
            contacts: Vec<CreateContact>,
        ) -> StoreResult<(Campaign, Vec<Contact>)> {
            self.inner.create_campaign(input, contacts).await
        }

        async fn get_campaign(&self, id: CampaignId) -> StoreResult<Option<Campaign>> {
            self.inner.get_campaign(id).await
        }

        async fn list_campaigns_by_status(
            &self,
            status: CampaignStatus,
        ) -> StoreResult<Vec<Campaign>> {
            self.inner.list_campaigns_by_status(status).await
        }

        async fn transition_campaign(
            &self,
            id: CampaignId,
            from: &[CampaignStatus],
            to: CampaignStatus,
            now: DateTime<Utc>,
        ) -> StoreResult<Option<Campaign>> {
            self.inner.transition_campaign(id, from, to, now).await
        }

        async fn tenant_timezone(&self, tenant_id: TenantId) -> StoreResult<Option<String>> {
            if tenant_id == self.tenant_id {
                return Err(dialwave_common::Error::Database("connection reset".to_string()));
            }
            self.inner.tenant_timezone(tenant_id).await
        }

        async fn add_contacts(
            &self,
            campaign_id: CampaignId,
            contacts: Vec<CreateContact>,
        ) -> StoreResult<Vec<Contact>> {
            self.inner.add_contacts(campaign_id, contacts).await
        }

        async fn get_contact(&self, id: ContactId) -> StoreResult<Option<Contact>> {
            self.inner.get_contact(id).await
        }

        async fn activate_campaign(
            &self,
            id: CampaignId,
            now: DateTime<Utc>,
        ) -> StoreResult<Option<Campaign>> {
            self.inner.activate_campaign(id, now).await
        }

        async fn complete_if_finished(
            &self,
            id: CampaignId,
            now: DateTime<Utc>,
        ) -> StoreResult<Option<Campaign>> {
            self.inner.complete_if_finished(id, now).await
        }

        async fn get_queue_item(&self, id: QueueItemId) -> StoreResult<Option<QueueItem>> {
            self.inner.get_queue_item(id).await
        }

        async fn list_attempts(
            &self,
            campaign_id: CampaignId,
            contact_id: ContactId,
        ) -> StoreResult<Vec<QueueItem>> {
            self.inner.list_attempts(campaign_id, contact_id).await
        }

        async fn list_due_items(
            &self,
            campaign_id: CampaignId,
            now: DateTime<Utc>,
            limit: i64,
        ) -> StoreResult<Vec<QueueItem>> {
            self.inner.list_due_items(campaign_id, now, limit).await
        }

        async fn claim_item(&self, id: QueueItemId, now: DateTime<Utc>) -> StoreResult<bool> {
            self.inner.claim_item(id, now).await
        }

        async fn release_item(
            &self,
            id: QueueItemId,
            error: &str,
            now: DateTime<Utc>,
        ) -> StoreResult<bool> {
            self.inner.release_item(id, error, now).await
        }

        async fn recycle_stuck_items(
            &self,
            dispatched_before: DateTime<Utc>,
            now: DateTime<Utc>,
        ) -> StoreResult<Vec<QueueItem>> {
            self.inner.recycle_stuck_items(dispatched_before, now).await
        }

        async fn apply_outcome(&self, update: OutcomeUpdate) -> StoreResult<bool> {
            self.inner.apply_outcome(update).await
        }

        async fn expire_queued_items(
            &self,
            campaign_id: CampaignId,
            now: DateTime<Utc>,
        ) -> StoreResult<u64> {
            self.inner.expire_queued_items(campaign_id, now).await
        }
    }

    #[tokio::test]
    async fn test_tenant_lookup_failure_skips_only_that_campaign() {
        let h = Harness::new().await;
        let broken = campaign_input();
        let broken_tenant = broken.tenant_id;
        let broken_id = h.create(broken, 1).await;
        let healthy_id = h.create(campaign_input(), 1).await;

        let store: Arc<dyn CampaignStore> = Arc::new(TenantLookupFails {
            inner: h.store.clone(),
            tenant_id: broken_tenant,
        });
        let clock: Arc<dyn Clock> = h.clock.clone();
        let completion = CompletionEvaluator::new(store.clone(), h.notifier.clone(), clock.clone());
        let scheduler = CampaignScheduler::new(store, h.executor.clone(), completion, clock);

        let report = scheduler.tick().await;
        assert_eq!(report.activated, 1);
        assert_eq!(h.campaign(broken_id).await.status, "pending");
        assert_eq!(h.campaign(healthy_id).await.status, "active");
    }

    #[tokio::test]
    async fn test_start_date_defers_activation() {
        let h = Harness::new().await;
        let mut input = campaign_input();
        input.start_date = NaiveDate::from_ymd_opt(2024, 5, 2);
        let id = h.create(input, 1).await;

        assert_eq!(h.run_tick().await.activated, 0);
        assert_eq!(h.campaign(id).await.status, "pending");

        h.clock.advance(Duration::days(1));
        assert_eq!(h.run_tick().await.activated, 1);
    }

    #[tokio::test]
    async fn test_zero_contact_campaign_completes_on_activation() {
        let h = Harness::new().await;
        let id = h.create(campaign_input(), 0).await;

        let report = h.run_tick().await;
        assert_eq!(report.activated, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(h.campaign(id).await.status, "completed");
    }

    #[tokio::test]
    async fn test_paused_campaign_is_not_dispatched_or_completed() {
        let h = Harness::new().await;
        let id = h.create(campaign_input(), 2).await;
        assert_eq!(h.scheduler.tick().await.dispatched, 2);
        h.scheduler.drain_dispatch_queue().await;

        h.manager.pause_campaign(id).await.unwrap();

        // In-flight outcomes are still counted
        for item in h.store.items_for_campaign(id).await {
            h.outcome(item.id, "answered").await;
        }
        let campaign = h.campaign(id).await;
        assert_eq!(campaign.status, "paused");
        assert_eq!(campaign.completed_calls, 2);

        assert_eq!(h.run_tick().await, TickReport::default());
        assert_eq!(h.campaign(id).await.status, "paused");

        let resumed = h.manager.resume_campaign(id).await.unwrap();
        assert_eq!(resumed.status, "completed");
    }

    #[tokio::test]
    async fn test_paused_campaign_keeps_retry_for_resume() {
        let h = Harness::new().await;
        let id = h.create(campaign_input(), 1).await;
        h.run_tick().await;
        h.manager.pause_campaign(id).await.unwrap();

        h.outcome(h.live_item(id).await.id, "no-answer").await;
        h.clock.advance(Duration::minutes(90));
        assert_eq!(h.run_tick().await.dispatched, 0);

        h.manager.resume_campaign(id).await.unwrap();
        assert_eq!(h.run_tick().await.dispatched, 1);
        assert_eq!(h.live_item(id).await.attempt_number, 2);
    }

    #[tokio::test]
    async fn test_cancelled_campaign_takes_no_retries() {
        let h = Harness::new().await;
        let id = h.create(campaign_input(), 1).await;
        h.run_tick().await;
        h.manager.cancel_campaign(id).await.unwrap();

        h.outcome(h.live_item(id).await.id, "no-answer").await;
        let campaign = h.campaign(id).await;
        assert_eq!(campaign.status, "cancelled");
        assert_eq!(campaign.failed_calls, 1);
        assert_eq!(h.store.items_for_campaign(id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_stuck_attempt_is_recycled() {
        let h = Harness::new().await;
        let id = h.create(campaign_input(), 1).await;
        h.run_tick().await;
        assert_eq!(h.live_item(id).await.status, "in_progress");

        h.clock.advance(Duration::minutes(31));
        let report = h.run_tick().await;
        assert_eq!(report.recycled, 1);
        assert_eq!(report.dispatched, 1);

        let item = h.live_item(id).await;
        assert_eq!(item.attempt_number, 1);
        assert_eq!(item.dispatch_failures, 1);
        assert_eq!(h.executor.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_end_date_expires_remaining_contacts() {
        let h = Harness::new().await;
        let mut input = campaign_input();
        input.end_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        let id = h.create(input, 3).await;

        h.run_tick().await;
        let items = h.store.items_for_campaign(id).await;
        h.outcome(items[0].id, "completed").await;
        // 16:30 no-answer: a retry at 17:30 is outside the window and the
        // campaign ends today, so the contact fails
        h.clock.set(t0() + Duration::minutes(390));
        h.outcome(items[1].id, "no-answer").await;
        // Third contact never reports back
        h.store
            .release_item(items[2].id, "provider unreachable", h.clock.now())
            .await
            .unwrap();

        h.clock.set(t0() + Duration::days(1));
        let report = h.run_tick().await;
        assert_eq!(report.expired, 1);
        assert_eq!(report.completed, 1);

        let campaign = h.campaign(id).await;
        assert_eq!(campaign.status, "completed");
        assert_eq!(campaign.successful_calls, 1);
        assert_eq!(campaign.failed_calls, 2);
        assert_eq!(campaign.completed_calls, 3);
    }

    #[tokio::test]
    async fn test_concurrent_outcomes_complete_once() {
        let h = Harness::new().await;
        let id = h.create(campaign_input(), 25).await;
        h.run_tick().await;

        let mut tasks = tokio::task::JoinSet::new();
        for (n, item) in h.store.items_for_campaign(id).await.into_iter().enumerate() {
            let processor = h.processor.clone();
            let status = if n % 3 == 0 { "invalid-number" } else { "answered" };
            let at = t0();
            tasks.spawn(async move {
                // Every outcome is delivered twice
                let a = processor.record_call_outcome(item.id, status, at).await.unwrap();
                let b = processor.record_call_outcome(item.id, status, at).await.unwrap();
                (a, b)
            });
        }

        let mut completions = 0;
        while let Some(result) = tasks.join_next().await {
            let (a, b) = result.unwrap();
            if a == (LedgerEntry::Applied { campaign_completed: true }) {
                completions += 1;
            }
            assert_eq!(b, LedgerEntry::Duplicate);
        }
        assert_eq!(completions, 1);

        let campaign = h.campaign(id).await;
        assert_eq!(campaign.status, "completed");
        assert_eq!(campaign.completed_calls, 25);
        assert_eq!(campaign.failed_calls, 9);
        assert_eq!(campaign.successful_calls, 16);
        assert!(campaign.counters_consistent());

        h.settle().await;
        assert_eq!(h.notifier.completed().await, vec![id]);
    }

    #[tokio::test]
    async fn test_full_queue_defers_dispatch() {
        let h = Harness::with_scheduler(|s| s.with_queue_capacity(2)).await;
        let id = h.create(campaign_input(), 5).await;

        let report = h.scheduler.tick().await;
        assert_eq!(report.dispatched, 2);
        let queued = h
            .store
            .items_for_campaign(id)
            .await
            .into_iter()
            .filter(|i| i.status == "queued")
            .count();
        assert_eq!(queued, 3);

        h.scheduler.drain_dispatch_queue().await;
        assert_eq!(h.scheduler.tick().await.dispatched, 2);
    }

    #[tokio::test]
    async fn test_worker_pool_dispatches() {
        let h = Harness::new().await;
        let id = h.create(campaign_input(), 4).await;
        let workers = h.scheduler.spawn_dispatch_workers();

        assert_eq!(h.scheduler.tick().await.dispatched, 4);
        for _ in 0..50 {
            if h.executor.requests().await.len() == 4 {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        assert_eq!(h.executor.requests().await.len(), 4);
        assert!(h
            .store
            .items_for_campaign(id)
            .await
            .iter()
            .all(|i| i.status == "in_progress"));

        for worker in workers {
            worker.abort();
        }
    }

    #[tokio::test]
    async fn test_every_tick_keeps_counters_consistent() {
        let h = Harness::new().await;
        let mut input = campaign_input();
        input.max_retries = 3;
        input.retry_interval_minutes = 30;
        let id = h.create(input, 6).await;

        let statuses = ["no-answer", "answered", "busy", "invalid-number", "voicemail", "completed"];
        for round in 0..8 {
            h.run_tick().await;
            for (n, item) in h.store.items_for_campaign(id).await.into_iter().enumerate() {
                if item.status == "in_progress" {
                    h.outcome(item.id, statuses[(n + round) % statuses.len()]).await;
                }
                let campaign = h.campaign(id).await;
                assert!(campaign.counters_consistent(), "{campaign:?}");
            }
            h.clock.advance(Duration::minutes(30));
        }
    }
}
