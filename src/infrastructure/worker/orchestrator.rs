//! Session Orchestrator - 会话生命周期管理
//!
//! 包装一条管线与一次 CallAttempt 的会话侧：
//! - 每个会话恰好一次终态迁移
//! - 媒体句柄恰好释放一次，无论经由哪条路径退出
//!   （挂断、错误、超时、调度器 forceEnd）
//! - SessionStarted / SessionEnded 账本先行

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    ActiveSession, CallHandle, EventKind, LedgerScope, SessionRegistryPort, TelephonyPort,
};
use crate::domain::campaign::{AttemptId, CampaignId};
use crate::domain::session::{Session, SessionId, SessionOutcome};
use crate::domain::AgentProfile;
use crate::infrastructure::events::EventPublisher;

use super::pipeline::{PipelineConfig, PipelineCoordinator, PipelineDeps};

/// 会话编排器
///
/// 无状态（会话状态在各自任务里），可被 Dispatcher 与
/// InboundRouter 共享
pub struct SessionOrchestrator {
    telephony: Arc<dyn TelephonyPort>,
    deps: PipelineDeps,
    registry: Arc<dyn SessionRegistryPort>,
    events: Arc<EventPublisher>,
    config: PipelineConfig,
}

impl SessionOrchestrator {
    pub fn new(
        telephony: Arc<dyn TelephonyPort>,
        deps: PipelineDeps,
        registry: Arc<dyn SessionRegistryPort>,
        events: Arc<EventPublisher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            telephony,
            deps,
            registry,
            events,
            config,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 运行一个已接通的会话直到终态，返回会话 id 与结果
    pub async fn run_session(
        &self,
        handle: CallHandle,
        agent: AgentProfile,
        campaign_id: Option<CampaignId>,
        attempt_id: Option<AttemptId>,
    ) -> (SessionId, SessionOutcome) {
        let call_id = handle.call_id;
        let session = Session::new(attempt_id);
        let session_id = session.id();
        let scope = LedgerScope::Session(session_id);

        // 创建事件账本先行；写不进去就不开始
        if let Err(e) = self
            .deps
            .ledger
            .append(scope, EventKind::SessionStarted { attempt_id, call_id })
            .await
        {
            tracing::error!(
                session_id = %session_id,
                error = %e,
                "Failed to record session start, aborting"
            );
            self.telephony.terminate(&call_id).await;
            return (session_id, SessionOutcome::LedgerFailure);
        }

        let cancel = CancellationToken::new();
        if let Err(e) = self.registry.register(ActiveSession::new(
            session_id,
            call_id,
            campaign_id,
            attempt_id,
            cancel.clone(),
        )) {
            // uuid 冲突在实践中不可达，保守处理
            tracing::error!(session_id = %session_id, error = %e, "Registry rejected session");
        }
        self.events.publish_session_started(session_id, campaign_id);

        tracing::info!(
            session_id = %session_id,
            call_id = %call_id,
            campaign_id = ?campaign_id.map(|id| id.to_string()),
            "Session started"
        );

        let coordinator = PipelineCoordinator::new(
            session,
            handle,
            agent,
            self.deps.clone(),
            self.config.clone(),
            cancel,
        );
        let (mut session, mut outcome) = coordinator.run().await;

        // 终态事件账本先行；写失败升级为 LedgerFailure
        if let Err(e) = self
            .deps
            .ledger
            .append(scope, EventKind::SessionEnded { outcome })
            .await
        {
            tracing::error!(
                session_id = %session_id,
                error = %e,
                "Failed to record terminal event"
            );
            outcome = SessionOutcome::LedgerFailure;
        }
        if let Err(e) = session.end(outcome) {
            tracing::error!(session_id = %session_id, error = %e, "Duplicate terminal transition");
        }

        // 句柄释放恰好一次：注销登记并终止媒体（terminate 自身幂等）
        self.registry.remove(&session_id);
        self.telephony.terminate(&call_id).await;
        self.events
            .publish_session_ended(session_id, campaign_id, outcome);

        tracing::info!(
            session_id = %session_id,
            outcome = %outcome.as_str(),
            turns = session.turns().len(),
            "Session ended"
        );

        (session_id, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        LedgerError, LedgerEvent, LedgerPort, PlaceCallRequest, TelephonyPort,
    };
    use crate::domain::campaign::PhoneNumber;
    use crate::infrastructure::adapters::{
        SimLlmClient, SimSttClient, SimTelephonyGateway, SimTtsClient,
    };
    use crate::infrastructure::memory::{InMemoryLedger, InMemorySessionRegistry};
    use async_trait::async_trait;
    use std::time::Duration;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            silence: Duration::from_millis(40),
            barge_in_rms: 1_000.0,
            stage_timeout: Duration::from_secs(5),
            provider_max_retries: 1,
            provider_backoff: Duration::from_millis(5),
            idle_timeout: Duration::from_millis(100),
        }
    }

    fn deps(ledger: Arc<dyn LedgerPort>) -> PipelineDeps {
        PipelineDeps {
            stt: Arc::new(SimSttClient::with_defaults()),
            llm: Arc::new(SimLlmClient::with_defaults()),
            tts: Arc::new(SimTtsClient::with_defaults()),
            ledger,
            recording: None,
        }
    }

    async fn answered_handle(gateway: &SimTelephonyGateway) -> CallHandle {
        gateway
            .place_call(PlaceCallRequest::new(
                PhoneNumber::new("+919148227303").unwrap(),
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_event_and_release() {
        let gateway = Arc::new(SimTelephonyGateway::with_defaults());
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = Arc::new(InMemorySessionRegistry::new());
        let orchestrator = SessionOrchestrator::new(
            gateway.clone(),
            deps(ledger.clone()),
            registry.clone(),
            EventPublisher::new().arc(),
            fast_config(),
        );

        let handle = answered_handle(&gateway).await;
        let call_id = handle.call_id;

        // 无来电音频 → 空闲超时
        let (session_id, outcome) = orchestrator
            .run_session(handle, AgentProfile::default(), None, None)
            .await;
        assert_eq!(outcome, SessionOutcome::IdleTimeout);

        // 恰好一个终态事件
        let events: Vec<LedgerEvent> = ledger
            .replay(LedgerScope::Session(session_id))
            .await
            .unwrap();
        let terminal_count = events
            .iter()
            .filter(|e| e.kind.is_session_terminal())
            .count();
        assert_eq!(terminal_count, 1);

        // 句柄恰好释放一次，登记已清空
        assert_eq!(gateway.terminate_count(&call_id), 1);
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_force_end_via_registry() {
        let gateway = Arc::new(SimTelephonyGateway::with_defaults());
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = Arc::new(InMemorySessionRegistry::new());
        let orchestrator = SessionOrchestrator::new(
            gateway.clone(),
            deps(ledger.clone()),
            registry.clone(),
            EventPublisher::new().arc(),
            PipelineConfig {
                idle_timeout: Duration::from_secs(10),
                ..fast_config()
            },
        )
        .arc();

        let handle = answered_handle(&gateway).await;
        let task = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .run_session(handle, AgentProfile::default(), None, None)
                    .await
            })
        };

        // 等会话登记，然后强制终止
        let mut forced = false;
        for _ in 0..200 {
            let active = registry.list_all();
            if let Some(id) = active.first() {
                assert!(registry.force_end(id));
                forced = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(forced, "session should have been registered");

        let (session_id, outcome) = task.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Cancelled);

        let events = ledger
            .replay(LedgerScope::Session(session_id))
            .await
            .unwrap();
        assert_eq!(
            events
                .iter()
                .filter(|e| e.kind.is_session_terminal())
                .count(),
            1
        );
    }

    /// 始终失败的账本，用于升级路径
    struct FailingLedger;

    #[async_trait]
    impl LedgerPort for FailingLedger {
        async fn append(
            &self,
            _scope: LedgerScope,
            _kind: EventKind,
        ) -> Result<u64, LedgerError> {
            Err(LedgerError::Storage("disk gone".to_string()))
        }

        async fn replay(&self, _scope: LedgerScope) -> Result<Vec<LedgerEvent>, LedgerError> {
            Ok(Vec::new())
        }

        async fn open_sessions(&self) -> Result<Vec<SessionId>, LedgerError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_ledger_failure_escalates_and_releases_handle() {
        let gateway = Arc::new(SimTelephonyGateway::with_defaults());
        let registry = Arc::new(InMemorySessionRegistry::new());
        let orchestrator = SessionOrchestrator::new(
            gateway.clone(),
            deps(Arc::new(FailingLedger)),
            registry.clone(),
            EventPublisher::new().arc(),
            fast_config(),
        );

        let handle = answered_handle(&gateway).await;
        let call_id = handle.call_id;

        let (_, outcome) = orchestrator
            .run_session(handle, AgentProfile::default(), None, None)
            .await;

        assert_eq!(outcome, SessionOutcome::LedgerFailure);
        // 失败路径同样释放句柄、不留登记
        assert_eq!(gateway.terminate_count(&call_id), 1);
        assert_eq!(registry.active_count(), 0);
    }
}
