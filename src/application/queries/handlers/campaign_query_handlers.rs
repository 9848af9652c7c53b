//! Campaign Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{AttemptRepositoryPort, CampaignRepositoryPort};
use crate::application::queries::campaign_queries::*;
use crate::domain::campaign::ContactDisposition;

/// Progress Handler - 活动进度统计
pub struct CampaignProgressHandler {
    campaign_repo: Arc<dyn CampaignRepositoryPort>,
    attempt_repo: Arc<dyn AttemptRepositoryPort>,
}

impl CampaignProgressHandler {
    pub fn new(
        campaign_repo: Arc<dyn CampaignRepositoryPort>,
        attempt_repo: Arc<dyn AttemptRepositoryPort>,
    ) -> Self {
        Self {
            campaign_repo,
            attempt_repo,
        }
    }

    pub async fn handle(
        &self,
        query: CampaignProgressQuery,
    ) -> Result<CampaignProgress, ApplicationError> {
        let campaign = self
            .campaign_repo
            .find_by_id(query.campaign_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Campaign", query.campaign_id))?;

        let mut progress = CampaignProgress {
            campaign_id: campaign.id(),
            status: campaign.status(),
            total_contacts: campaign.contacts().len(),
            pending: 0,
            in_flight: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            total_attempts: 0,
        };

        for contact in campaign.contacts() {
            match contact.disposition() {
                ContactDisposition::Pending => progress.pending += 1,
                ContactDisposition::InFlight => progress.in_flight += 1,
                ContactDisposition::Completed => progress.completed += 1,
                ContactDisposition::Failed { .. } => progress.failed += 1,
                ContactDisposition::Cancelled => progress.cancelled += 1,
            }
        }

        progress.total_attempts = self
            .attempt_repo
            .list_by_campaign(query.campaign_id)
            .await?
            .len();

        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::campaign::{
        CallAttempt, Campaign, Contact, PhoneNumber, RetryPolicy,
    };
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteAttemptRepository,
        SqliteCampaignRepository,
    };

    #[tokio::test]
    async fn test_progress_counts_dispositions_and_attempts() {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let campaign_repo = Arc::new(SqliteCampaignRepository::new(pool.clone()));
        let attempt_repo = Arc::new(SqliteAttemptRepository::new(pool));

        let mut campaign = Campaign::new(
            "progress",
            vec![
                Contact::new(PhoneNumber::new("+15556000001").unwrap()),
                Contact::new(PhoneNumber::new("+15556000002").unwrap()),
            ],
            1,
            RetryPolicy::default(),
        )
        .unwrap();
        let campaign_id = campaign.id();
        let first = campaign.contacts()[0].id();

        campaign.contact_mut(first).unwrap().begin_attempt();
        campaign.contact_mut(first).unwrap().mark_completed();
        campaign_repo.insert(&campaign).await.unwrap();
        attempt_repo
            .insert(campaign_id, &CallAttempt::new(first, 1))
            .await
            .unwrap();

        let handler = CampaignProgressHandler::new(campaign_repo, attempt_repo);
        let progress = handler
            .handle(CampaignProgressQuery { campaign_id })
            .await
            .unwrap();

        assert_eq!(progress.total_contacts, 2);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.pending, 1);
        assert_eq!(progress.total_attempts, 1);
    }

    #[tokio::test]
    async fn test_progress_unknown_campaign() {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let handler = CampaignProgressHandler::new(
            Arc::new(SqliteCampaignRepository::new(pool.clone())),
            Arc::new(SqliteAttemptRepository::new(pool)),
        );

        let result = handler
            .handle(CampaignProgressQuery {
                campaign_id: crate::domain::campaign::CampaignId::new(),
            })
            .await;
        assert!(matches!(result, Err(ApplicationError::NotFound { .. })));
    }
}
