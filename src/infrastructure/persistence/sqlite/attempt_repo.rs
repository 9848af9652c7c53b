//! SQLite Attempt Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::DbPool;
use crate::application::ports::{AttemptRepositoryPort, RepositoryError};
use crate::domain::campaign::{
    AttemptId, AttemptOutcome, CallAttempt, CampaignId, ContactId,
};
use crate::domain::session::SessionId;

/// SQLite Attempt Repository
pub struct SqliteAttemptRepository {
    pool: DbPool,
}

impl SqliteAttemptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: String,
    contact_id: String,
    seq: i64,
    started_at: String,
    outcome: Option<String>,
    failure_reason: Option<String>,
    session_id: Option<String>,
}

impl TryFrom<AttemptRow> for CallAttempt {
    type Error = RepositoryError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let parse_uuid = |s: &str| {
            Uuid::parse_str(s).map_err(|e| RepositoryError::Serialization(e.to_string()))
        };

        let outcome = row
            .outcome
            .as_deref()
            .map(|s| {
                AttemptOutcome::from_str(s).ok_or_else(|| {
                    RepositoryError::Serialization(format!("unknown outcome: {}", s))
                })
            })
            .transpose()?;

        let session_id = row
            .session_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?
            .map(SessionId::from_uuid);

        Ok(CallAttempt::restore(
            AttemptId::from_uuid(parse_uuid(&row.id)?),
            ContactId::from_uuid(parse_uuid(&row.contact_id)?),
            row.seq as u32,
            DateTime::parse_from_rfc3339(&row.started_at)
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?
                .with_timezone(&Utc),
            outcome,
            row.failure_reason,
            session_id,
        ))
    }
}

#[async_trait]
impl AttemptRepositoryPort for SqliteAttemptRepository {
    async fn insert(
        &self,
        campaign_id: CampaignId,
        attempt: &CallAttempt,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO call_attempts
                (id, campaign_id, contact_id, seq, started_at,
                 outcome, failure_reason, session_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.id().to_string())
        .bind(campaign_id.to_string())
        .bind(attempt.contact_id().to_string())
        .bind(attempt.seq() as i64)
        .bind(attempt.started_at().to_rfc3339())
        .bind(attempt.outcome().map(|o| o.as_str()))
        .bind(attempt.failure_reason())
        .bind(attempt.session_id().map(|s| s.to_string()))
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(())
    }

    async fn update(
        &self,
        campaign_id: CampaignId,
        attempt: &CallAttempt,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE call_attempts
            SET outcome = ?, failure_reason = ?, session_id = ?
            WHERE id = ? AND campaign_id = ?
            "#,
        )
        .bind(attempt.outcome().map(|o| o.as_str()))
        .bind(attempt.failure_reason())
        .bind(attempt.session_id().map(|s| s.to_string()))
        .bind(attempt.id().to_string())
        .bind(campaign_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(attempt.id().to_string()));
        }
        Ok(())
    }

    async fn list_by_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<CallAttempt>, RepositoryError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            r#"
            SELECT id, contact_id, seq, started_at, outcome, failure_reason, session_id
            FROM call_attempts WHERE campaign_id = ? ORDER BY started_at
            "#,
        )
        .bind(campaign_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.into_iter().map(CallAttempt::try_from).collect()
    }

    async fn list_by_contact(
        &self,
        contact_id: ContactId,
    ) -> Result<Vec<CallAttempt>, RepositoryError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            r#"
            SELECT id, contact_id, seq, started_at, outcome, failure_reason, session_id
            FROM call_attempts WHERE contact_id = ? ORDER BY seq
            "#,
        )
        .bind(contact_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.into_iter().map(CallAttempt::try_from).collect()
    }
}
