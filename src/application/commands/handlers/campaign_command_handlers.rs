//! Campaign Command Handlers

use std::sync::Arc;

use crate::application::commands::campaign_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{
    CampaignRepositoryPort, EventKind, LedgerPort, LedgerScope,
};
use crate::domain::campaign::{Campaign, Contact, PhoneNumber};
use crate::infrastructure::worker::DispatcherHandle;

/// Submit Handler - 校验、落库、写账本、交给 Dispatcher
pub struct SubmitCampaignHandler {
    campaign_repo: Arc<dyn CampaignRepositoryPort>,
    ledger: Arc<dyn LedgerPort>,
    dispatcher: DispatcherHandle,
}

impl SubmitCampaignHandler {
    pub fn new(
        campaign_repo: Arc<dyn CampaignRepositoryPort>,
        ledger: Arc<dyn LedgerPort>,
        dispatcher: DispatcherHandle,
    ) -> Self {
        Self {
            campaign_repo,
            ledger,
            dispatcher,
        }
    }

    pub async fn handle(
        &self,
        cmd: SubmitCampaignCommand,
    ) -> Result<SubmitCampaignResponse, ApplicationError> {
        cmd.agent
            .validate()
            .map_err(ApplicationError::validation)?;

        // 校验并构建联系人
        let mut contacts = Vec::with_capacity(cmd.contacts.len());
        for spec in cmd.contacts {
            let phone = PhoneNumber::new(&spec.phone_number).map_err(|e| {
                ApplicationError::validation(format!("{}: {}", spec.phone_number, e))
            })?;
            let mut contact = Contact::new(phone).with_metadata(spec.metadata);
            if let Some(name) = spec.display_name {
                contact = contact.with_name(name);
            }
            contacts.push(contact);
        }

        let campaign = Campaign::new(cmd.name, contacts, cmd.concurrency_cap, cmd.retry_policy)
            .map_err(|e| ApplicationError::validation(e.to_string()))?;
        let campaign_id = campaign.id();
        let contact_count = campaign.contacts().len();

        // 先落库、写账本，再交给调度器（write-ahead）
        self.campaign_repo.insert(&campaign).await?;
        self.ledger
            .append(
                LedgerScope::Campaign(campaign_id),
                EventKind::CampaignSubmitted {
                    name: campaign.name().to_string(),
                    contact_count,
                },
            )
            .await?;

        self.dispatcher
            .submit(campaign, cmd.agent)
            .await
            .map_err(|e| ApplicationError::DispatcherUnavailable(e.to_string()))?;

        tracing::info!(
            campaign_id = %campaign_id,
            contact_count = contact_count,
            "Campaign submitted"
        );

        Ok(SubmitCampaignResponse {
            campaign_id,
            contact_count,
        })
    }
}

/// Pause Handler
pub struct PauseCampaignHandler {
    dispatcher: DispatcherHandle,
}

impl PauseCampaignHandler {
    pub fn new(dispatcher: DispatcherHandle) -> Self {
        Self { dispatcher }
    }

    pub async fn handle(&self, cmd: PauseCampaignCommand) -> Result<(), ApplicationError> {
        self.dispatcher
            .pause(cmd.campaign_id)
            .await
            .map_err(|e| ApplicationError::DispatcherUnavailable(e.to_string()))?;
        tracing::info!(campaign_id = %cmd.campaign_id, "Campaign pause requested");
        Ok(())
    }
}

/// Resume Handler
pub struct ResumeCampaignHandler {
    dispatcher: DispatcherHandle,
}

impl ResumeCampaignHandler {
    pub fn new(dispatcher: DispatcherHandle) -> Self {
        Self { dispatcher }
    }

    pub async fn handle(&self, cmd: ResumeCampaignCommand) -> Result<(), ApplicationError> {
        self.dispatcher
            .resume(cmd.campaign_id)
            .await
            .map_err(|e| ApplicationError::DispatcherUnavailable(e.to_string()))?;
        tracing::info!(campaign_id = %cmd.campaign_id, "Campaign resume requested");
        Ok(())
    }
}

/// Cancel Handler
pub struct CancelCampaignHandler {
    dispatcher: DispatcherHandle,
}

impl CancelCampaignHandler {
    pub fn new(dispatcher: DispatcherHandle) -> Self {
        Self { dispatcher }
    }

    pub async fn handle(&self, cmd: CancelCampaignCommand) -> Result<(), ApplicationError> {
        self.dispatcher
            .cancel(cmd.campaign_id)
            .await
            .map_err(|e| ApplicationError::DispatcherUnavailable(e.to_string()))?;
        tracing::info!(campaign_id = %cmd.campaign_id, "Campaign cancel requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::commands::ContactSpec;
    use crate::domain::campaign::{CampaignStatus, RetryPolicy};
    use crate::domain::AgentProfile;
    use crate::infrastructure::adapters::{
        SimLlmClient, SimSttClient, SimTelephonyGateway, SimTtsClient,
    };
    use crate::infrastructure::events::EventPublisher;
    use crate::infrastructure::memory::{InMemoryLedger, InMemorySessionRegistry};
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteAttemptRepository,
        SqliteCampaignRepository,
    };
    use crate::infrastructure::worker::{
        CampaignDispatcher, DispatcherConfig, PipelineConfig, PipelineDeps, SessionOrchestrator,
    };
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn spec(phone: &str) -> ContactSpec {
        ContactSpec {
            phone_number: phone.to_string(),
            display_name: None,
            metadata: HashMap::new(),
        }
    }

    async fn stack() -> (SubmitCampaignHandler, Arc<SqliteCampaignRepository>) {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let campaign_repo = Arc::new(SqliteCampaignRepository::new(pool.clone()));
        let attempt_repo = Arc::new(SqliteAttemptRepository::new(pool));

        let gateway = Arc::new(SimTelephonyGateway::with_defaults());
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = Arc::new(InMemorySessionRegistry::new());
        let events = EventPublisher::new().arc();

        let orchestrator = SessionOrchestrator::new(
            gateway.clone(),
            PipelineDeps {
                stt: Arc::new(SimSttClient::with_defaults()),
                llm: Arc::new(SimLlmClient::with_defaults()),
                tts: Arc::new(SimTtsClient::with_defaults()),
                ledger: ledger.clone(),
                recording: None,
            },
            registry.clone(),
            events.clone(),
            PipelineConfig {
                silence: Duration::from_millis(40),
                barge_in_rms: 1_000.0,
                stage_timeout: Duration::from_secs(5),
                provider_max_retries: 1,
                provider_backoff: Duration::from_millis(5),
                idle_timeout: Duration::from_millis(60),
            },
        )
        .arc();

        let dispatcher = CampaignDispatcher::new(
            DispatcherConfig {
                retry_jitter_ms: 0,
                ..DispatcherConfig::default()
            },
            gateway,
            orchestrator,
            campaign_repo.clone(),
            attempt_repo,
            ledger.clone(),
            registry,
            events,
        );
        let handle = dispatcher.handle();
        tokio::spawn(dispatcher.run());

        (
            SubmitCampaignHandler::new(campaign_repo.clone(), ledger, handle),
            campaign_repo,
        )
    }

    #[tokio::test]
    async fn test_submit_runs_campaign_to_completion() {
        let (handler, campaign_repo) = stack().await;

        let response = handler
            .handle(SubmitCampaignCommand {
                name: "handler-e2e".to_string(),
                contacts: vec![spec("+15554000001"), spec("+15554000002")],
                concurrency_cap: 2,
                retry_policy: RetryPolicy::default(),
                agent: AgentProfile::default(),
            })
            .await
            .unwrap();
        assert_eq!(response.contact_count, 2);

        for _ in 0..1_000 {
            let campaign = campaign_repo
                .find_by_id(response.campaign_id)
                .await
                .unwrap()
                .unwrap();
            if campaign.status() == CampaignStatus::Completed {
                assert!(campaign.all_contacts_resolved());
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("campaign never completed");
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_phone_number() {
        let (handler, _) = stack().await;

        let result = handler
            .handle(SubmitCampaignCommand {
                name: "bad".to_string(),
                contacts: vec![spec("not-a-number")],
                concurrency_cap: 1,
                retry_policy: RetryPolicy::default(),
                agent: AgentProfile::default(),
            })
            .await;
        assert!(matches!(result, Err(ApplicationError::ValidationError(_))));
    }
}
