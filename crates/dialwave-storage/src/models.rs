//! Database models

use chrono::{DateTime, NaiveDate, Utc};
use dialwave_common::types::{
    AgentId, CampaignId, ContactId, PhoneNumberId, QueueItemId, TenantId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Tenant model (read-only for the scheduling core)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// IANA timezone used when a campaign has no custom timezone
    pub timezone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Campaigns
// ============================================================================

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    /// No transition leaves these states
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Cancelled)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Pending => write!(f, "pending"),
            CampaignStatus::Active => write!(f, "active"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CampaignStatus::Pending),
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            "cancelled" => Ok(CampaignStatus::Cancelled),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub tenant_id: TenantId,
    pub name: String,
    pub agent_id: Option<AgentId>,
    pub phone_number_id: Option<PhoneNumberId>,
    /// Local wall-clock start of the calling window (HH:MM)
    pub first_call_time: String,
    /// Local wall-clock end of the calling window (HH:MM, inclusive)
    pub last_call_time: String,
    pub use_custom_timezone: bool,
    pub timezone: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub max_retries: i32,
    pub retry_interval_minutes: i32,
    pub status: String,
    pub total_contacts: i32,
    pub completed_calls: i32,
    pub successful_calls: i32,
    pub failed_calls: i32,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// Calculate progress percentage
    pub fn progress_percentage(&self) -> f64 {
        if self.total_contacts == 0 {
            0.0
        } else {
            (self.completed_calls as f64 / self.total_contacts as f64) * 100.0
        }
    }

    /// Counter invariants that must hold at every observable point
    pub fn counters_consistent(&self) -> bool {
        self.completed_calls == self.successful_calls + self.failed_calls
            && self.completed_calls <= self.total_contacts
    }
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub tenant_id: TenantId,
    pub name: String,
    pub agent_id: Option<AgentId>,
    pub phone_number_id: Option<PhoneNumberId>,
    pub first_call_time: String,
    pub last_call_time: String,
    #[serde(default)]
    pub use_custom_timezone: bool,
    pub timezone: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub max_retries: i32,
    #[serde(default)]
    pub retry_interval_minutes: i32,
    pub metadata: Option<serde_json::Value>,
}

// ============================================================================
// Contacts
// ============================================================================

/// Contact (lead) attached to a campaign
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub campaign_id: CampaignId,
    pub tenant_id: TenantId,
    pub phone_number: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create contact input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateContact {
    pub phone_number: String,
    pub name: Option<String>,
}

// ============================================================================
// Call queue
// ============================================================================

/// Queue item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl QueueItemStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueItemStatus::Completed | QueueItemStatus::Failed)
    }

    /// Queued or in progress
    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueItemStatus::Queued => write!(f, "queued"),
            QueueItemStatus::InProgress => write!(f, "in_progress"),
            QueueItemStatus::Completed => write!(f, "completed"),
            QueueItemStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for QueueItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(QueueItemStatus::Queued),
            "in_progress" => Ok(QueueItemStatus::InProgress),
            "completed" => Ok(QueueItemStatus::Completed),
            "failed" => Ok(QueueItemStatus::Failed),
            _ => Err(format!("Invalid queue item status: {}", s)),
        }
    }
}

/// One scheduled or executed call attempt for one contact
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    /// 1-based attempt counter for the contact
    pub attempt_number: i32,
    pub status: String,
    /// Earliest dispatch instant
    pub scheduled_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Raw provider status of the terminal outcome
    pub outcome: Option<String>,
    /// Transport-level dispatch failures for this attempt
    pub dispatch_failures: i32,
    pub last_error: Option<String>,
    /// Most recent attempt of the contact
    pub is_live: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// Get status enum
    pub fn status_enum(&self) -> Option<QueueItemStatus> {
        self.status.parse().ok()
    }

    /// Whether the attempt has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status_enum().map(QueueItemStatus::is_terminal).unwrap_or(false)
    }
}

/// How a terminal attempt contributes to the campaign counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tally {
    Successful,
    Failed,
}

/// Follow-up attempt created together with an outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextAttempt {
    pub attempt_number: i32,
    pub scheduled_at: DateTime<Utc>,
}

/// Atomic outcome update applied by the counter ledger
///
/// Exactly one of `tally` / `next_attempt` is set: an attempt is either final
/// for its contact (and counted) or superseded by a retry (and not counted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeUpdate {
    pub queue_item_id: QueueItemId,
    pub campaign_id: CampaignId,
    pub status: QueueItemStatus,
    pub outcome: String,
    pub occurred_at: DateTime<Utc>,
    pub tally: Option<Tally>,
    pub next_attempt: Option<NextAttempt>,
}
