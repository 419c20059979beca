//! Retry policy
//!
//! Pure decisions over a call outcome and a campaign's retry configuration.
//! Nothing in this module reads the clock or touches storage.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use dialwave_storage::models::Campaign;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::window::{next_window_start, CallWindow};

/// Classification of a raw provider status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Success,
    FailureNoRetry,
    Retryable,
}

const SUCCESS_STATUSES: &[&str] = &["completed", "connected", "answered", "success", "successful"];

const RETRYABLE_STATUSES: &[&str] = &[
    "no-answer",
    "busy",
    "voicemail",
    "timeout",
    "failed",
    "network-error",
    "rejected",
    "call-dropped",
];

const NO_RETRY_STATUSES: &[&str] = &[
    "invalid-number",
    "cancelled",
    "canceled",
    "do-not-call",
    "blocked",
    "disconnected-number",
    "unallocated-number",
];

fn normalize_status(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == '_' || c == ' ' { '-' } else { c })
        .collect()
}

/// Classify a raw provider status. Unknown statuses are retryable.
pub fn classify_outcome(raw_status: &str) -> OutcomeClass {
    let status = normalize_status(raw_status);
    let status = status.as_str();

    if SUCCESS_STATUSES.contains(&status) {
        OutcomeClass::Success
    } else if NO_RETRY_STATUSES.contains(&status) {
        OutcomeClass::FailureNoRetry
    } else {
        if !RETRYABLE_STATUSES.contains(&status) {
            warn!(status = raw_status, "Unknown call outcome status, treating as retryable");
        }
        OutcomeClass::Retryable
    }
}

/// Attempt numbers are 1-based: `max_retries = 2` permits attempts 1, 2 and 3.
pub fn should_retry(attempt_number: i32, max_retries: i32, class: OutcomeClass) -> bool {
    class == OutcomeClass::Retryable && attempt_number <= max_retries
}

/// `outcome_instant + interval`, moved forward into the calling window and
/// the date bounds. `None` when nothing remains before `end_date`.
pub fn next_attempt_earliest_instant(
    outcome_instant: DateTime<Utc>,
    retry_interval_minutes: i32,
    window: &CallWindow,
    tz: Tz,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Option<DateTime<Utc>> {
    let earliest = outcome_instant + Duration::minutes(i64::from(retry_interval_minutes.max(0)));
    next_window_start(earliest, window, tz, start_date, end_date)
}

/// Why a contact finished without success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The provider reported a permanent failure
    NotRetryable,
    /// The last permitted attempt was still retryable
    RetriesExhausted,
    /// No calling window remains before the campaign's end date
    Unschedulable,
    /// The campaign no longer accepts new attempts
    CampaignClosed,
}

/// Final disposition of a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FinalOutcome {
    Success,
    Failure { reason: FailureReason },
}

/// What happens after a terminal attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RetryDecision {
    /// The contact is done and counts toward the campaign counters
    Final(FinalOutcome),
    /// Another attempt is scheduled
    Retry {
        attempt_number: i32,
        scheduled_at: DateTime<Utc>,
    },
}

impl RetryDecision {
    pub fn is_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry { .. })
    }
}

/// A campaign's retry configuration bound to its effective timezone
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: i32,
    retry_interval_minutes: i32,
    window: CallWindow,
    tz: Tz,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl RetryPolicy {
    pub fn new(max_retries: i32, retry_interval_minutes: i32, window: CallWindow, tz: Tz) -> Self {
        Self {
            max_retries,
            retry_interval_minutes,
            window,
            tz,
            start_date: None,
            end_date: None,
        }
    }

    /// Limit retries to a date range
    pub fn with_dates(mut self, start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }

    pub fn for_campaign(campaign: &Campaign, tz: Tz) -> Self {
        Self::new(
            campaign.max_retries,
            campaign.retry_interval_minutes,
            CallWindow::lenient(&campaign.first_call_time, &campaign.last_call_time),
            tz,
        )
        .with_dates(campaign.start_date, campaign.end_date)
    }

    /// Decide the fate of a terminal attempt
    pub fn decide(
        &self,
        attempt_number: i32,
        raw_status: &str,
        outcome_instant: DateTime<Utc>,
    ) -> RetryDecision {
        let class = classify_outcome(raw_status);
        match class {
            OutcomeClass::Success => RetryDecision::Final(FinalOutcome::Success),
            OutcomeClass::FailureNoRetry => RetryDecision::Final(FinalOutcome::Failure {
                reason: FailureReason::NotRetryable,
            }),
            OutcomeClass::Retryable if !should_retry(attempt_number, self.max_retries, class) => {
                RetryDecision::Final(FinalOutcome::Failure {
                    reason: FailureReason::RetriesExhausted,
                })
            }
            OutcomeClass::Retryable => match next_attempt_earliest_instant(
                outcome_instant,
                self.retry_interval_minutes,
                &self.window,
                self.tz,
                self.start_date,
                self.end_date,
            ) {
                Some(scheduled_at) => RetryDecision::Retry {
                    attempt_number: attempt_number + 1,
                    scheduled_at,
                },
                None => RetryDecision::Final(FinalOutcome::Failure {
                    reason: FailureReason::Unschedulable,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::window::is_within_window;
    use chrono::TimeZone;
    use chrono_tz::America::Chicago;
    use pretty_assertions::assert_eq;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn business_hours() -> CallWindow {
        CallWindow::parse("09:00", "17:00").unwrap()
    }

    #[test]
    fn test_classify_outcome() {
        assert_eq!(classify_outcome("completed"), OutcomeClass::Success);
        assert_eq!(classify_outcome("Connected"), OutcomeClass::Success);
        assert_eq!(classify_outcome("no-answer"), OutcomeClass::Retryable);
        assert_eq!(classify_outcome("NO_ANSWER"), OutcomeClass::Retryable);
        assert_eq!(classify_outcome("no answer"), OutcomeClass::Retryable);
        assert_eq!(classify_outcome("busy"), OutcomeClass::Retryable);
        assert_eq!(classify_outcome("invalid-number"), OutcomeClass::FailureNoRetry);
        assert_eq!(classify_outcome("cancelled"), OutcomeClass::FailureNoRetry);
        assert_eq!(classify_outcome("canceled"), OutcomeClass::FailureNoRetry);
        assert_eq!(classify_outcome("something-new"), OutcomeClass::Retryable);
    }

    #[test]
    fn test_should_retry_counts_attempts_from_one() {
        let r = OutcomeClass::Retryable;
        assert!(should_retry(1, 2, r));
        assert!(should_retry(2, 2, r));
        assert!(!should_retry(3, 2, r));
        assert!(!should_retry(1, 0, r));
        assert!(!should_retry(1, 2, OutcomeClass::Success));
        assert!(!should_retry(1, 2, OutcomeClass::FailureNoRetry));
    }

    #[test]
    fn test_next_attempt_inside_window_is_plain_interval() {
        let at = utc(2024, 5, 1, 10, 0);
        let next = next_attempt_earliest_instant(at, 60, &business_hours(), Tz::UTC, None, None);
        assert_eq!(next, Some(utc(2024, 5, 1, 11, 0)));
    }

    #[test]
    fn test_next_attempt_rolls_forward_out_of_hours() {
        // 16:30 CDT + 60m = 17:30 CDT, outside; next opening 09:00 CDT
        let at = utc(2024, 5, 1, 21, 30);
        let next =
            next_attempt_earliest_instant(at, 60, &business_hours(), Chicago, None, None).unwrap();
        assert_eq!(next, utc(2024, 5, 2, 14, 0));
        assert!(is_within_window(next, &business_hours(), Chicago));
    }

    #[test]
    fn test_next_attempt_never_outside_window() {
        let window = CallWindow::parse("10:15", "11:45").unwrap();
        let mut at = utc(2024, 3, 8, 0, 0);
        // Sweep across a DST change in 7-minute steps
        while at < utc(2024, 3, 12, 0, 0) {
            for interval in [1, 45, 90, 600] {
                let next =
                    next_attempt_earliest_instant(at, interval, &window, Chicago, None, None)
                        .unwrap();
                assert!(is_within_window(next, &window, Chicago), "{at} + {interval}m");
                assert!(next >= at + Duration::minutes(i64::from(interval)));
            }
            at += Duration::minutes(7);
        }
    }

    #[test]
    fn test_decide_is_deterministic() {
        let policy = RetryPolicy::new(2, 60, business_hours(), Tz::UTC);
        let at = utc(2024, 5, 1, 10, 0);
        assert_eq!(policy.decide(1, "busy", at), policy.decide(1, "busy", at));
    }

    #[test]
    fn test_decide_outcomes() {
        let policy = RetryPolicy::new(2, 60, business_hours(), Tz::UTC);
        let at = utc(2024, 5, 1, 10, 0);

        assert_eq!(
            policy.decide(1, "answered", at),
            RetryDecision::Final(FinalOutcome::Success)
        );
        assert_eq!(
            policy.decide(1, "do-not-call", at),
            RetryDecision::Final(FinalOutcome::Failure {
                reason: FailureReason::NotRetryable
            })
        );
        assert_eq!(
            policy.decide(2, "no-answer", at),
            RetryDecision::Retry {
                attempt_number: 3,
                scheduled_at: utc(2024, 5, 1, 11, 0),
            }
        );
        assert_eq!(
            policy.decide(3, "no-answer", at),
            RetryDecision::Final(FinalOutcome::Failure {
                reason: FailureReason::RetriesExhausted
            })
        );
    }

    #[test]
    fn test_decide_unschedulable_after_end_date() {
        let policy = RetryPolicy::new(2, 60, business_hours(), Tz::UTC)
            .with_dates(None, NaiveDate::from_ymd_opt(2024, 5, 1));
        let decision = policy.decide(1, "busy", utc(2024, 5, 1, 16, 30));
        assert_eq!(
            decision,
            RetryDecision::Final(FinalOutcome::Failure {
                reason: FailureReason::Unschedulable
            })
        );
    }
}
