//! Common types for Dialwave

use uuid::Uuid;

/// Unique identifier for tenants
pub type TenantId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for campaign contacts (leads)
pub type ContactId = Uuid;

/// Unique identifier for call queue items (one per attempt)
pub type QueueItemId = Uuid;

/// Unique identifier for caller-id phone numbers
pub type PhoneNumberId = Uuid;

/// Unique identifier for voice agents
pub type AgentId = Uuid;
