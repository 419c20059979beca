//! PostgreSQL campaign store

use super::{status_strings, CampaignStore};
use crate::db::DatabasePool;
use crate::models::{
    Campaign, CampaignStatus, Contact, CreateCampaign, CreateContact, OutcomeUpdate, QueueItem,
    Tally,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialwave_common::types::{CampaignId, ContactId, QueueItemId, TenantId};
use dialwave_common::{Error, Result};
use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

fn db_err(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}

async fn insert_contacts(
    conn: &mut PgConnection,
    campaign_id: CampaignId,
    tenant_id: TenantId,
    contacts: Vec<CreateContact>,
) -> Result<Vec<Contact>> {
    let mut created = Vec::with_capacity(contacts.len());
    for input in contacts {
        let contact = sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO campaign_contacts (id, campaign_id, tenant_id, phone_number, name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(campaign_id)
        .bind(tenant_id)
        .bind(&input.phone_number)
        .bind(&input.name)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;
        created.push(contact);
    }
    Ok(created)
}

/// Campaign store backed by PostgreSQL
#[derive(Clone)]
pub struct PgCampaignStore {
    pool: DatabasePool,
}

impl PgCampaignStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignStore for PgCampaignStore {
    async fn create_campaign(
        &self,
        input: CreateCampaign,
        contacts: Vec<CreateContact>,
    ) -> Result<(Campaign, Vec<Contact>)> {
        let id = Uuid::now_v7();
        let metadata = input.metadata.unwrap_or_else(|| serde_json::json!({}));

        let mut tx = self.pool.pool().begin().await.map_err(db_err)?;

        let campaign = sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, tenant_id, name, agent_id, phone_number_id,
                first_call_time, last_call_time, use_custom_timezone, timezone,
                start_date, end_date, max_retries, retry_interval_minutes,
                status, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'pending', $14)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(input.agent_id)
        .bind(input.phone_number_id)
        .bind(&input.first_call_time)
        .bind(&input.last_call_time)
        .bind(input.use_custom_timezone)
        .bind(&input.timezone)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.max_retries)
        .bind(input.retry_interval_minutes)
        .bind(&metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let contacts = insert_contacts(&mut tx, campaign.id, campaign.tenant_id, contacts).await?;

        tx.commit().await.map_err(db_err)?;
        debug!(campaign_id = %campaign.id, contacts = contacts.len(), "Inserted campaign");
        Ok((campaign, contacts))
    }

    async fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn list_campaigns_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE status = $1 ORDER BY created_at ASC",
        )
        .bind(status.to_string())
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn transition_campaign(
        &self,
        id: CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns
            SET status = $3,
                updated_at = $4,
                completed_at = CASE WHEN $3 IN ('completed', 'cancelled')
                                    THEN COALESCE(completed_at, $4)
                                    ELSE completed_at END
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status_strings(from))
        .bind(to.to_string())
        .bind(now)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn tenant_timezone(&self, tenant_id: TenantId) -> Result<Option<String>> {
        let timezone: Option<Option<String>> =
            sqlx::query_scalar("SELECT timezone FROM tenants WHERE id = $1")
                .bind(tenant_id)
                .fetch_optional(self.pool.pool())
                .await
                .map_err(db_err)?;

        Ok(timezone.flatten())
    }

    async fn add_contacts(
        &self,
        campaign_id: CampaignId,
        contacts: Vec<CreateContact>,
    ) -> Result<Vec<Contact>> {
        let mut tx = self.pool.pool().begin().await.map_err(db_err)?;

        let row: Option<(TenantId, String)> =
            sqlx::query_as("SELECT tenant_id, status FROM campaigns WHERE id = $1 FOR UPDATE")
                .bind(campaign_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        let (tenant_id, status) =
            row.ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))?;
        if status != CampaignStatus::Pending.to_string() {
            return Err(Error::Conflict(format!(
                "campaign {} is {}, contacts can only be added while pending",
                campaign_id, status
            )));
        }

        let created = insert_contacts(&mut tx, campaign_id, tenant_id, contacts).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(created)
    }

    async fn get_contact(&self, id: ContactId) -> Result<Option<Contact>> {
        sqlx::query_as::<_, Contact>("SELECT * FROM campaign_contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn activate_campaign(
        &self,
        id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>> {
        let mut tx = self.pool.pool().begin().await.map_err(db_err)?;

        let campaign = sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns
            SET status = 'active',
                started_at = COALESCE(started_at, $2),
                updated_at = $2,
                total_contacts = (
                    SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id = $1
                )
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(campaign) = campaign else {
            tx.rollback().await.map_err(db_err)?;
            return Ok(None);
        };

        let seeded = sqlx::query(
            r#"
            INSERT INTO call_queue_items (
                id, campaign_id, contact_id, attempt_number, status,
                scheduled_at, is_live, created_at, updated_at
            )
            SELECT gen_random_uuid(), campaign_id, id, 1, 'queued', $2, true, $2, $2
            FROM campaign_contacts
            WHERE campaign_id = $1
            ON CONFLICT (contact_id, attempt_number) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        tx.commit().await.map_err(db_err)?;

        debug!(campaign_id = %id, seeded, "Seeded first attempts");
        Ok(Some(campaign))
    }

    async fn complete_if_finished(
        &self,
        id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns
            SET status = 'completed',
                completed_at = COALESCE(completed_at, $2),
                updated_at = $2
            WHERE id = $1
              AND status = 'active'
              AND completed_calls >= total_contacts
              AND NOT EXISTS (
                  SELECT 1 FROM call_queue_items
                  WHERE campaign_id = $1 AND status IN ('queued', 'in_progress')
              )
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn get_queue_item(&self, id: QueueItemId) -> Result<Option<QueueItem>> {
        sqlx::query_as::<_, QueueItem>("SELECT * FROM call_queue_items WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn list_attempts(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<Vec<QueueItem>> {
        sqlx::query_as::<_, QueueItem>(
            r#"
            SELECT * FROM call_queue_items
            WHERE campaign_id = $1 AND contact_id = $2
            ORDER BY attempt_number ASC
            "#,
        )
        .bind(campaign_id)
        .bind(contact_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn list_due_items(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QueueItem>> {
        sqlx::query_as::<_, QueueItem>(
            r#"
            SELECT * FROM call_queue_items
            WHERE campaign_id = $1
              AND status = 'queued'
              AND is_live
              AND scheduled_at <= $2
            ORDER BY scheduled_at ASC, created_at ASC
            LIMIT $3
            "#,
        )
        .bind(campaign_id)
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn claim_item(&self, id: QueueItemId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE call_queue_items q
            SET status = 'in_progress', dispatched_at = $2, updated_at = $2
            WHERE q.id = $1
              AND q.status = 'queued'
              AND q.is_live
              AND q.scheduled_at <= $2
              AND EXISTS (
                  SELECT 1 FROM campaigns c
                  WHERE c.id = q.campaign_id AND c.status = 'active'
              )
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_item(
        &self,
        id: QueueItemId,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE call_queue_items
            SET status = 'queued',
                dispatched_at = NULL,
                dispatch_failures = dispatch_failures + 1,
                last_error = $2,
                updated_at = $3
            WHERE id = $1 AND status = 'in_progress'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn recycle_stuck_items(
        &self,
        dispatched_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>> {
        sqlx::query_as::<_, QueueItem>(
            r#"
            UPDATE call_queue_items
            SET status = 'queued',
                dispatched_at = NULL,
                dispatch_failures = dispatch_failures + 1,
                last_error = 'no outcome reported',
                updated_at = $2
            WHERE status = 'in_progress' AND dispatched_at < $1
            RETURNING *
            "#,
        )
        .bind(dispatched_before)
        .bind(now)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn apply_outcome(&self, update: OutcomeUpdate) -> Result<bool> {
        let mut tx = self.pool.pool().begin().await.map_err(db_err)?;

        let item = sqlx::query_as::<_, QueueItem>(
            r#"
            UPDATE call_queue_items
            SET status = $2,
                outcome = $3,
                finished_at = $4,
                updated_at = $4,
                is_live = CASE WHEN $5 THEN false ELSE is_live END
            WHERE id = $1 AND status IN ('queued', 'in_progress')
            RETURNING *
            "#,
        )
        .bind(update.queue_item_id)
        .bind(update.status.to_string())
        .bind(&update.outcome)
        .bind(update.occurred_at)
        .bind(update.next_attempt.is_some())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(item) = item else {
            tx.rollback().await.map_err(db_err)?;
            return Ok(false);
        };

        if let Some(tally) = update.tally {
            let (successful, failed) = match tally {
                Tally::Successful => (1, 0),
                Tally::Failed => (0, 1),
            };
            sqlx::query(
                r#"
                UPDATE campaigns
                SET completed_calls = completed_calls + 1,
                    successful_calls = successful_calls + $2,
                    failed_calls = failed_calls + $3,
                    updated_at = $4
                WHERE id = $1
                "#,
            )
            .bind(item.campaign_id)
            .bind(successful)
            .bind(failed)
            .bind(update.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        if let Some(next) = &update.next_attempt {
            sqlx::query(
                r#"
                INSERT INTO call_queue_items (
                    id, campaign_id, contact_id, attempt_number, status,
                    scheduled_at, is_live, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, 'queued', $5, true, $6, $6)
                "#,
            )
            .bind(Uuid::now_v7())
            .bind(item.campaign_id)
            .bind(item.contact_id)
            .bind(next.attempt_number)
            .bind(next.scheduled_at)
            .bind(update.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn expire_queued_items(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tx = self.pool.pool().begin().await.map_err(db_err)?;

        let expired = sqlx::query(
            r#"
            UPDATE call_queue_items
            SET status = 'failed', outcome = 'expired', finished_at = $2, updated_at = $2
            WHERE campaign_id = $1 AND status = 'queued' AND is_live
            "#,
        )
        .bind(campaign_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        if expired > 0 {
            let count = i32::try_from(expired)
                .map_err(|_| Error::Internal(format!("expired count overflow: {}", expired)))?;
            sqlx::query(
                r#"
                UPDATE campaigns
                SET completed_calls = completed_calls + $2,
                    failed_calls = failed_calls + $2,
                    updated_at = $3
                WHERE id = $1
                "#,
            )
            .bind(campaign_id)
            .bind(count)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(expired)
    }
}
