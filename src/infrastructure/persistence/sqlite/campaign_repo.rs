//! SQLite Campaign Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

use super::DbPool;
use crate::application::ports::{CampaignRepositoryPort, RepositoryError};
use crate::domain::campaign::{
    Campaign, CampaignId, CampaignStatus, Contact, ContactDisposition, ContactId, PhoneNumber,
    RetryPolicy,
};

/// SQLite Campaign Repository
pub struct SqliteCampaignRepository {
    pool: DbPool,
}

impl SqliteCampaignRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct CampaignRow {
    id: String,
    name: String,
    status: String,
    concurrency_cap: i64,
    max_attempts: i64,
    backoff_base_ms: i64,
    backoff_cap_ms: i64,
    created_at: String,
    updated_at: String,
}

#[derive(FromRow)]
struct ContactRow {
    id: String,
    phone: String,
    display_name: Option<String>,
    metadata: String,
    attempts: i64,
    disposition: String,
    failure_reason: Option<String>,
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Serialization(e.to_string()))
}

impl ContactRow {
    fn into_contact(self) -> Result<Contact, RepositoryError> {
        let phone = PhoneNumber::new(&self.phone)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        let metadata: HashMap<String, String> = serde_json::from_str(&self.metadata)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        let disposition = match self.disposition.as_str() {
            "pending" => ContactDisposition::Pending,
            "in_flight" => ContactDisposition::InFlight,
            "completed" => ContactDisposition::Completed,
            "failed" => ContactDisposition::Failed {
                reason: self.failure_reason.clone().unwrap_or_default(),
            },
            "cancelled" => ContactDisposition::Cancelled,
            other => {
                return Err(RepositoryError::Serialization(format!(
                    "unknown disposition: {}",
                    other
                )))
            }
        };

        Ok(Contact::restore(
            ContactId::from_uuid(parse_uuid(&self.id)?),
            phone,
            self.display_name,
            metadata,
            self.attempts as u32,
            disposition,
        ))
    }
}

fn contact_failure_reason(contact: &Contact) -> Option<String> {
    match contact.disposition() {
        ContactDisposition::Failed { reason } => Some(reason.clone()),
        _ => None,
    }
}

#[async_trait]
impl CampaignRepositoryPort for SqliteCampaignRepository {
    async fn insert(&self, campaign: &Campaign) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO campaigns
                (id, name, status, concurrency_cap, max_attempts,
                 backoff_base_ms, backoff_cap_ms, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(campaign.id().to_string())
        .bind(campaign.name())
        .bind(campaign.status().as_str())
        .bind(campaign.concurrency_cap() as i64)
        .bind(campaign.retry_policy().max_attempts as i64)
        .bind(campaign.retry_policy().backoff_base_ms as i64)
        .bind(campaign.retry_policy().backoff_cap_ms as i64)
        .bind(campaign.created_at().to_rfc3339())
        .bind(campaign.updated_at().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        for (position, contact) in campaign.contacts().iter().enumerate() {
            let metadata = serde_json::to_string(contact.metadata())
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO contacts
                    (id, campaign_id, position, phone, display_name,
                     metadata, attempts, disposition, failure_reason)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(contact.id().to_string())
            .bind(campaign.id().to_string())
            .bind(position as i64)
            .bind(contact.phone().as_str())
            .bind(contact.display_name())
            .bind(metadata)
            .bind(contact.attempts() as i64)
            .bind(contact.disposition().as_str())
            .bind(contact_failure_reason(contact))
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        tracing::debug!(
            campaign_id = %campaign.id(),
            contact_count = campaign.contacts().len(),
            "Campaign persisted"
        );
        Ok(())
    }

    async fn update_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE campaigns SET status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn update_contact(
        &self,
        campaign_id: CampaignId,
        contact: &Contact,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE contacts
            SET attempts = ?, disposition = ?, failure_reason = ?
            WHERE id = ? AND campaign_id = ?
            "#,
        )
        .bind(contact.attempts() as i64)
        .bind(contact.disposition().as_str())
        .bind(contact_failure_reason(contact))
        .bind(contact.id().to_string())
        .bind(campaign_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(contact.id().to_string()));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: CampaignId) -> Result<Option<Campaign>, RepositoryError> {
        let row: Option<CampaignRow> = sqlx::query_as(
            r#"
            SELECT id, name, status, concurrency_cap, max_attempts,
                   backoff_base_ms, backoff_cap_ms, created_at, updated_at
            FROM campaigns WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        self.hydrate(row).await.map(Some)
    }

    async fn list_by_status(
        &self,
        status: CampaignStatus,
    ) -> Result<Vec<Campaign>, RepositoryError> {
        let rows: Vec<CampaignRow> = sqlx::query_as(
            r#"
            SELECT id, name, status, concurrency_cap, max_attempts,
                   backoff_base_ms, backoff_cap_ms, created_at, updated_at
            FROM campaigns WHERE status = ? ORDER BY created_at
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let mut campaigns = Vec::with_capacity(rows.len());
        for row in rows {
            campaigns.push(self.hydrate(row).await?);
        }
        Ok(campaigns)
    }
}

impl SqliteCampaignRepository {
    /// 行 -> 聚合（加载联系人并按 position 排序）
    async fn hydrate(&self, row: CampaignRow) -> Result<Campaign, RepositoryError> {
        let contact_rows: Vec<ContactRow> = sqlx::query_as(
            r#"
            SELECT id, phone, display_name, metadata, attempts, disposition, failure_reason
            FROM contacts WHERE campaign_id = ? ORDER BY position
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let contacts = contact_rows
            .into_iter()
            .map(ContactRow::into_contact)
            .collect::<Result<Vec<_>, _>>()?;

        let status = CampaignStatus::from_str(&row.status).ok_or_else(|| {
            RepositoryError::Serialization(format!("unknown campaign status: {}", row.status))
        })?;

        Ok(Campaign::restore(
            CampaignId::from_uuid(parse_uuid(&row.id)?),
            row.name,
            contacts,
            row.concurrency_cap as usize,
            RetryPolicy {
                max_attempts: row.max_attempts as u32,
                backoff_base_ms: row.backoff_base_ms as u64,
                backoff_cap_ms: row.backoff_cap_ms as u64,
            },
            status,
            parse_timestamp(&row.created_at)?,
            parse_timestamp(&row.updated_at)?,
        ))
    }
}
