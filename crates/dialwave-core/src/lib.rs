//! Dialwave Core - Campaign scheduling and retry orchestration
//!
//! This crate decides when a campaign may place calls, whether a call attempt
//! is retried, keeps the campaign counters exact, and finalizes campaigns.

pub mod clock;
pub mod dialer;
pub mod notify;
pub mod schedule;
pub mod signature;

pub use clock::{Clock, FixedClock, SystemClock};
pub use dialer::{CallExecutor, DispatchError, DispatchRequest, DispatchResponse};
pub use notify::{CompletionNotifier, LogNotifier, WebhookNotifier};
pub use schedule::{
    CampaignError, CampaignManager, CampaignScheduler, CompletionEvaluator, CounterLedger,
    LedgerEntry, OutcomeProcessor, RetryDecision, RetryPolicy, TickReport,
};
