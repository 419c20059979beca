//! Campaign completion notifications (fire-and-forget)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialwave_common::config::NotificationConfig;
use dialwave_common::types::{CampaignId, TenantId};
use dialwave_common::{Error, Result};
use dialwave_storage::models::Campaign;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::signature::{sign, SIGNATURE_HEADER};

/// Receives campaigns that just transitioned to `completed`
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn campaign_completed(&self, campaign: &Campaign) -> Result<()>;
}

/// Event body sent to completion webhooks
#[derive(Debug, Clone, Serialize)]
pub struct CampaignCompletedEvent {
    pub event: &'static str,
    pub campaign_id: CampaignId,
    pub tenant_id: TenantId,
    pub name: String,
    pub total_contacts: i32,
    pub completed_calls: i32,
    pub successful_calls: i32,
    pub failed_calls: i32,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Campaign> for CampaignCompletedEvent {
    fn from(campaign: &Campaign) -> Self {
        Self {
            event: "campaign.completed",
            campaign_id: campaign.id,
            tenant_id: campaign.tenant_id,
            name: campaign.name.clone(),
            total_contacts: campaign.total_contacts,
            completed_calls: campaign.completed_calls,
            successful_calls: campaign.successful_calls,
            failed_calls: campaign.failed_calls,
            completed_at: campaign.completed_at,
        }
    }
}

/// Writes completions to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl CompletionNotifier for LogNotifier {
    async fn campaign_completed(&self, campaign: &Campaign) -> Result<()> {
        info!(
            campaign_id = %campaign.id,
            tenant_id = %campaign.tenant_id,
            successful = campaign.successful_calls,
            failed = campaign.failed_calls,
            "Campaign completed"
        );
        Ok(())
    }
}

/// POSTs a `campaign.completed` event to a configured URL
pub struct WebhookNotifier {
    http_client: Client,
    url: String,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, secret: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: url.into(),
            secret,
        })
    }

    /// Build from configuration; `None` when no webhook URL is set
    pub fn from_config(config: &NotificationConfig) -> Result<Option<Self>> {
        config
            .webhook_url
            .as_ref()
            .map(|url| {
                Self::new(
                    url.clone(),
                    config.secret.clone(),
                    Duration::from_secs(config.timeout_secs),
                )
            })
            .transpose()
    }
}

#[async_trait]
impl CompletionNotifier for WebhookNotifier {
    async fn campaign_completed(&self, campaign: &Campaign) -> Result<()> {
        let body = serde_json::to_vec(&CampaignCompletedEvent::from(campaign))
            .map_err(|e| Error::Internal(e.to_string()))?;

        let mut request = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign(secret, &body));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Completion webhook failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Internal(format!(
                "Completion webhook returned status {}",
                response.status()
            )));
        }

        debug!(campaign_id = %campaign.id, url = %self.url, "Completion webhook delivered");
        Ok(())
    }
}
