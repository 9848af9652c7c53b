//! Inbound Router - 入站呼叫路由
//!
//! 消费上游信令面投递的入站信号，应答后为每通电话
//! 起一个会话编排任务。入站会话不归属任何活动。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::application::ports::{InboundSignal, TelephonyPort};
use crate::domain::AgentProfile;

use super::orchestrator::SessionOrchestrator;

/// 入站路由器
pub struct InboundRouter {
    /// 入站信号（由核心之外的信令面投递）
    signals: mpsc::Receiver<InboundSignal>,
    telephony: Arc<dyn TelephonyPort>,
    orchestrator: Arc<SessionOrchestrator>,
    /// 入站会话统一使用的 agent 画像
    agent: AgentProfile,
}

impl InboundRouter {
    pub fn new(
        signals: mpsc::Receiver<InboundSignal>,
        telephony: Arc<dyn TelephonyPort>,
        orchestrator: Arc<SessionOrchestrator>,
        agent: AgentProfile,
    ) -> Self {
        Self {
            signals,
            telephony,
            orchestrator,
            agent,
        }
    }

    /// 消费入站信号直到信令面关闭
    pub async fn run(mut self) {
        tracing::info!("InboundRouter started");

        while let Some(signal) = self.signals.recv().await {
            let call_ref = signal.call_ref.clone();
            let handle = match self.telephony.accept_inbound(signal).await {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!(call_ref = %call_ref, error = %e, "Inbound accept failed");
                    continue;
                }
            };

            tracing::info!(
                call_id = %handle.call_id,
                call_ref = %call_ref,
                "Inbound call accepted"
            );

            let orchestrator = self.orchestrator.clone();
            let agent = self.agent.clone();
            tokio::spawn(async move {
                orchestrator.run_session(handle, agent, None, None).await;
            });
        }

        tracing::info!("InboundRouter stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::LedgerPort;
    use crate::infrastructure::adapters::{
        SimLlmClient, SimSttClient, SimTelephonyGateway, SimTtsClient,
    };
    use crate::infrastructure::events::EventPublisher;
    use crate::infrastructure::memory::{InMemoryLedger, InMemorySessionRegistry};
    use crate::infrastructure::worker::pipeline::{PipelineConfig, PipelineDeps};
    use std::time::Duration;

    #[tokio::test]
    async fn test_inbound_signal_spawns_session() {
        let gateway = Arc::new(SimTelephonyGateway::with_defaults());
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = Arc::new(InMemorySessionRegistry::new());

        let orchestrator = SessionOrchestrator::new(
            gateway.clone(),
            PipelineDeps {
                stt: Arc::new(SimSttClient::with_defaults()),
                llm: Arc::new(SimLlmClient::with_defaults()),
                tts: Arc::new(SimTtsClient::with_defaults()),
                ledger: ledger.clone(),
                recording: None,
            },
            registry,
            EventPublisher::new().arc(),
            PipelineConfig {
                silence: Duration::from_millis(40),
                barge_in_rms: 1_000.0,
                stage_timeout: Duration::from_secs(5),
                provider_max_retries: 1,
                provider_backoff: Duration::from_millis(5),
                idle_timeout: Duration::from_millis(50),
            },
        )
        .arc();

        let (tx, rx) = mpsc::channel(8);
        let router = InboundRouter::new(
            rx,
            gateway.clone(),
            orchestrator,
            AgentProfile::default(),
        );
        tokio::spawn(router.run());

        tx.send(InboundSignal {
            call_ref: "trunk-42".to_string(),
            from: None,
        })
        .await
        .unwrap();

        // 会话以空闲超时终结：账本里应有开始与终态事件
        for _ in 0..400 {
            let open = ledger.open_sessions().await.unwrap();
            if open.is_empty() && ledger.total_events() >= 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // 确认至少记录了一个会话（诊断信息）
        let any_session = ledger.total_events();
        panic!("inbound session never completed, events={}", any_session);
    }

    #[tokio::test]
    async fn test_router_drains_then_exits_on_channel_close() {
        let gateway = Arc::new(SimTelephonyGateway::with_defaults());
        let ledger = Arc::new(InMemoryLedger::new());

        let orchestrator = SessionOrchestrator::new(
            gateway.clone(),
            PipelineDeps {
                stt: Arc::new(SimSttClient::with_defaults()),
                llm: Arc::new(SimLlmClient::with_defaults()),
                tts: Arc::new(SimTtsClient::with_defaults()),
                ledger: ledger.clone(),
                recording: None,
            },
            Arc::new(InMemorySessionRegistry::new()),
            EventPublisher::new().arc(),
            PipelineConfig {
                silence: Duration::from_millis(40),
                barge_in_rms: 1_000.0,
                stage_timeout: Duration::from_secs(5),
                provider_max_retries: 1,
                provider_backoff: Duration::from_millis(5),
                idle_timeout: Duration::from_millis(50),
            },
        )
        .arc();

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(InboundRouter::new(rx, gateway, orchestrator, AgentProfile::default()).run());

        // 投递一个信号后关闭信令通道：已接的会话仍须走到终态
        tx.send(InboundSignal {
            call_ref: "trunk-1".to_string(),
            from: None,
        })
        .await
        .unwrap();
        drop(tx);

        for _ in 0..400 {
            if ledger.open_sessions().await.unwrap().is_empty() && ledger.total_events() >= 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("session never drained");
    }
}
