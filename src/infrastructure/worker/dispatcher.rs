//! Campaign Dispatcher - 外呼活动调度器
//!
//! 单循环消费控制命令与尝试结果，把联系人队列变成受限流的
//! 拨号尝试：
//! - 活动内并发 <= 活动 cap，跨活动总并发 <= 全局 cap（Semaphore）
//! - 可重试失败按 `min(base * 2^attempt, cap) + jitter` 退避重试
//! - 每次尝试的容量在结果记录点恰好释放一次
//!
//! 计数器只在本循环内修改（串行化访问约束）；AtomicUsize 仅为
//! 让探针能从其他任务读取。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use thiserror::Error;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use crate::application::ports::{
    AttemptRepositoryPort, CampaignRepositoryPort, DialError, EventKind, LedgerPort, LedgerScope,
    PlaceCallRequest, SessionRegistryPort, TelephonyPort,
};
use crate::config::DispatcherSettings;
use crate::domain::campaign::{
    AttemptOutcome, CallAttempt, Campaign, CampaignId, CampaignStatus, ContactDisposition,
    ContactId,
};
use crate::domain::session::{SessionId, SessionOutcome};
use crate::domain::AgentProfile;
use crate::infrastructure::events::EventPublisher;

use super::orchestrator::SessionOrchestrator;

/// Dispatcher 错误
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher control channel closed")]
    Closed,
}

/// 控制命令
#[derive(Debug)]
pub enum DispatcherCommand {
    Submit {
        campaign: Campaign,
        agent: AgentProfile,
    },
    Pause(CampaignId),
    Resume(CampaignId),
    Cancel(CampaignId),
}

/// Dispatcher 控制句柄（可克隆，跨任务使用）
#[derive(Clone)]
pub struct DispatcherHandle {
    control_tx: mpsc::Sender<DispatcherCommand>,
}

impl DispatcherHandle {
    /// 提交活动开始调度
    pub async fn submit(
        &self,
        campaign: Campaign,
        agent: AgentProfile,
    ) -> Result<(), DispatchError> {
        self.control_tx
            .send(DispatcherCommand::Submit { campaign, agent })
            .await
            .map_err(|_| DispatchError::Closed)
    }

    /// 暂停：停止新呼叫，在途会话继续
    pub async fn pause(&self, id: CampaignId) -> Result<(), DispatchError> {
        self.control_tx
            .send(DispatcherCommand::Pause(id))
            .await
            .map_err(|_| DispatchError::Closed)
    }

    /// 恢复调度
    pub async fn resume(&self, id: CampaignId) -> Result<(), DispatchError> {
        self.control_tx
            .send(DispatcherCommand::Resume(id))
            .await
            .map_err(|_| DispatchError::Closed)
    }

    /// 取消：清空队列并强制终止在途会话
    pub async fn cancel(&self, id: CampaignId) -> Result<(), DispatchError> {
        self.control_tx
            .send(DispatcherCommand::Cancel(id))
            .await
            .map_err(|_| DispatchError::Closed)
    }
}

/// 并发观测探针（测试与监控只读）
#[derive(Clone)]
pub struct DispatcherProbe {
    counters: Arc<DashMap<CampaignId, Arc<AtomicUsize>>>,
    global: Arc<Semaphore>,
    global_cap: usize,
}

impl DispatcherProbe {
    /// 某活动当前在途数
    pub fn in_flight(&self, id: CampaignId) -> usize {
        self.counters
            .get(&id)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// 全部活动在途数之和
    pub fn total_in_flight(&self) -> usize {
        self.counters
            .iter()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }

    /// 全局额度剩余
    pub fn global_available(&self) -> usize {
        self.global.available_permits()
    }

    /// 全局额度上限
    pub fn global_cap(&self) -> usize {
        self.global_cap
    }
}

/// Dispatcher 配置
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// 跨活动全局并发上限
    pub global_max_concurrent: usize,
    /// 重试退避抖动上限（毫秒）
    pub retry_jitter_ms: u64,
    /// 控制通道容量
    pub control_capacity: usize,
    /// 呼出主叫显示号码
    pub caller_id: Option<String>,
}

impl DispatcherConfig {
    pub fn from_settings(settings: &DispatcherSettings, caller_id: Option<String>) -> Self {
        Self {
            global_max_concurrent: settings.global_max_concurrent,
            retry_jitter_ms: settings.retry_jitter_ms,
            control_capacity: settings.control_capacity,
            caller_id,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            global_max_concurrent: 10,
            retry_jitter_ms: 250,
            control_capacity: 1_000,
            caller_id: None,
        }
    }
}

/// 单个活动的运行态
struct CampaignRuntime {
    campaign: Campaign,
    agent: AgentProfile,
    /// 在途计数（只在调度循环内修改）
    in_flight: Arc<AtomicUsize>,
    /// 待拨联系人队列
    queue: VecDeque<ContactId>,
    /// 在途尝试（contact_id -> attempt）
    pending_attempts: HashMap<ContactId, CallAttempt>,
    /// 已排定、尚未到期的重试数
    retries_pending: usize,
}

/// 一次尝试的结局
enum AttemptResolution {
    /// 拨号即失败
    Dial(DialError),
    /// 接通并走完会话
    Session {
        session_id: SessionId,
        outcome: SessionOutcome,
    },
    /// 拨号前账本写入失败（升级，不拨号）
    LedgerFailed,
}

/// 循环内部事件
enum InternalEvent {
    AttemptResolved {
        campaign_id: CampaignId,
        contact_id: ContactId,
        resolution: AttemptResolution,
        /// 全局额度，随结果记录一起释放
        permit: OwnedSemaphorePermit,
    },
    RetryDue {
        campaign_id: CampaignId,
        contact_id: ContactId,
    },
}

/// 活动调度器
pub struct CampaignDispatcher {
    config: DispatcherConfig,
    control_tx: mpsc::Sender<DispatcherCommand>,
    control_rx: mpsc::Receiver<DispatcherCommand>,
    internal_tx: mpsc::Sender<InternalEvent>,
    internal_rx: mpsc::Receiver<InternalEvent>,
    telephony: Arc<dyn TelephonyPort>,
    orchestrator: Arc<SessionOrchestrator>,
    campaign_repo: Arc<dyn CampaignRepositoryPort>,
    attempt_repo: Arc<dyn AttemptRepositoryPort>,
    ledger: Arc<dyn LedgerPort>,
    registry: Arc<dyn SessionRegistryPort>,
    events: Arc<EventPublisher>,
    global: Arc<Semaphore>,
    counters: Arc<DashMap<CampaignId, Arc<AtomicUsize>>>,
    campaigns: HashMap<CampaignId, CampaignRuntime>,
}

impl CampaignDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DispatcherConfig,
        telephony: Arc<dyn TelephonyPort>,
        orchestrator: Arc<SessionOrchestrator>,
        campaign_repo: Arc<dyn CampaignRepositoryPort>,
        attempt_repo: Arc<dyn AttemptRepositoryPort>,
        ledger: Arc<dyn LedgerPort>,
        registry: Arc<dyn SessionRegistryPort>,
        events: Arc<EventPublisher>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::channel(config.control_capacity);
        let (internal_tx, internal_rx) = mpsc::channel(1_024);
        let global = Arc::new(Semaphore::new(config.global_max_concurrent));

        Self {
            config,
            control_tx,
            control_rx,
            internal_tx,
            internal_rx,
            telephony,
            orchestrator,
            campaign_repo,
            attempt_repo,
            ledger,
            registry,
            events,
            global,
            counters: Arc::new(DashMap::new()),
            campaigns: HashMap::new(),
        }
    }

    /// 控制句柄
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            control_tx: self.control_tx.clone(),
        }
    }

    /// 并发观测探针
    pub fn probe(&self) -> DispatcherProbe {
        DispatcherProbe {
            counters: self.counters.clone(),
            global: self.global.clone(),
            global_cap: self.config.global_max_concurrent,
        }
    }

    /// 调度主循环
    pub async fn run(mut self) {
        tracing::info!(
            global_max_concurrent = self.config.global_max_concurrent,
            "CampaignDispatcher started"
        );

        let mut control_open = true;
        loop {
            if !control_open && self.fully_drained() {
                break;
            }

            tokio::select! {
                cmd = self.control_rx.recv(), if control_open => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => control_open = false,
                    }
                }
                evt = self.internal_rx.recv() => {
                    if let Some(evt) = evt {
                        self.handle_internal(evt).await;
                    }
                }
            }

            self.pump().await;
        }

        tracing::info!("CampaignDispatcher stopped");
    }

    fn fully_drained(&self) -> bool {
        self.campaigns.values().all(|r| {
            r.in_flight.load(Ordering::SeqCst) == 0
                && r.retries_pending == 0
                && r.queue.is_empty()
        })
    }

    /// 写活动范围账本事件；失败时按升级策略处理并返回 false
    async fn append_campaign_event(&self, campaign_id: CampaignId, kind: EventKind) -> bool {
        match self
            .ledger
            .append(LedgerScope::Campaign(campaign_id), kind)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    campaign_id = %campaign_id,
                    error = %e,
                    "Campaign ledger append failed"
                );
                false
            }
        }
    }

    async fn handle_command(&mut self, cmd: DispatcherCommand) {
        match cmd {
            DispatcherCommand::Submit { mut campaign, agent } => {
                let campaign_id = campaign.id();
                if self.campaigns.contains_key(&campaign_id) {
                    tracing::warn!(campaign_id = %campaign_id, "Campaign already running");
                    return;
                }
                if let Err(e) = campaign.start() {
                    tracing::warn!(campaign_id = %campaign_id, error = %e, "Cannot start campaign");
                    return;
                }
                if let Err(e) = self
                    .campaign_repo
                    .update_status(campaign_id, CampaignStatus::Running)
                    .await
                {
                    tracing::error!(campaign_id = %campaign_id, error = %e, "Status persist failed");
                }
                // 账本先行：启动事件写不进去的活动直接判失败，不调度
                if !self
                    .append_campaign_event(campaign_id, EventKind::CampaignStarted)
                    .await
                {
                    if let Err(e) = campaign.fail() {
                        tracing::error!(campaign_id = %campaign_id, error = %e, "Cannot fail campaign");
                    }
                    if let Err(e) = self
                        .campaign_repo
                        .update_status(campaign_id, CampaignStatus::Failed)
                        .await
                    {
                        tracing::error!(campaign_id = %campaign_id, error = %e, "Status persist failed");
                    }
                    self.append_campaign_event(
                        campaign_id,
                        EventKind::CampaignFailed {
                            reason: "ledger write failure".to_string(),
                        },
                    )
                    .await;
                    self.events.publish_campaign_status(campaign_id, "failed");
                    return;
                }
                self.events.publish_campaign_status(campaign_id, "running");

                let counter = Arc::new(AtomicUsize::new(0));
                self.counters.insert(campaign_id, counter.clone());

                let queue: VecDeque<ContactId> = campaign
                    .contacts()
                    .iter()
                    .filter(|c| !c.disposition().is_resolved())
                    .map(|c| c.id())
                    .collect();

                tracing::info!(
                    campaign_id = %campaign_id,
                    contacts = queue.len(),
                    cap = campaign.concurrency_cap(),
                    "Campaign dispatch started"
                );

                self.campaigns.insert(
                    campaign_id,
                    CampaignRuntime {
                        campaign,
                        agent,
                        in_flight: counter,
                        queue,
                        pending_attempts: HashMap::new(),
                        retries_pending: 0,
                    },
                );
            }

            DispatcherCommand::Pause(campaign_id) => {
                let Some(runtime) = self.campaigns.get_mut(&campaign_id) else {
                    tracing::warn!(campaign_id = %campaign_id, "Pause: campaign not running");
                    return;
                };
                if let Err(e) = runtime.campaign.pause() {
                    tracing::warn!(campaign_id = %campaign_id, error = %e, "Cannot pause");
                    return;
                }
                if let Err(e) = self
                    .campaign_repo
                    .update_status(campaign_id, CampaignStatus::Paused)
                    .await
                {
                    tracing::error!(campaign_id = %campaign_id, error = %e, "Status persist failed");
                }
                self.append_campaign_event(campaign_id, EventKind::CampaignPaused)
                    .await;
                self.events.publish_campaign_status(campaign_id, "paused");
                tracing::info!(campaign_id = %campaign_id, "Campaign paused");
            }

            DispatcherCommand::Resume(campaign_id) => {
                let Some(runtime) = self.campaigns.get_mut(&campaign_id) else {
                    tracing::warn!(campaign_id = %campaign_id, "Resume: campaign not running");
                    return;
                };
                if let Err(e) = runtime.campaign.resume() {
                    tracing::warn!(campaign_id = %campaign_id, error = %e, "Cannot resume");
                    return;
                }
                if let Err(e) = self
                    .campaign_repo
                    .update_status(campaign_id, CampaignStatus::Running)
                    .await
                {
                    tracing::error!(campaign_id = %campaign_id, error = %e, "Status persist failed");
                }
                self.append_campaign_event(campaign_id, EventKind::CampaignResumed)
                    .await;
                self.events.publish_campaign_status(campaign_id, "running");
                tracing::info!(campaign_id = %campaign_id, "Campaign resumed");
            }

            DispatcherCommand::Cancel(campaign_id) => {
                let Some(runtime) = self.campaigns.get_mut(&campaign_id) else {
                    tracing::warn!(campaign_id = %campaign_id, "Cancel: campaign not running");
                    return;
                };
                if let Err(e) = runtime.campaign.cancel() {
                    tracing::warn!(campaign_id = %campaign_id, error = %e, "Cannot cancel");
                    return;
                }
                runtime.queue.clear();

                // 新近取消的联系人落库
                let cancelled: Vec<_> = runtime
                    .campaign
                    .contacts()
                    .iter()
                    .filter(|c| *c.disposition() == ContactDisposition::Cancelled)
                    .cloned()
                    .collect();
                for contact in &cancelled {
                    if let Err(e) = self.campaign_repo.update_contact(campaign_id, contact).await {
                        tracing::error!(
                            campaign_id = %campaign_id,
                            contact_id = %contact.id(),
                            error = %e,
                            "Contact persist failed"
                        );
                    }
                    self.append_campaign_event(
                        campaign_id,
                        EventKind::ContactResolved {
                            contact_id: contact.id(),
                            disposition: contact.disposition().as_str().to_string(),
                        },
                    )
                    .await;
                }

                if let Err(e) = self
                    .campaign_repo
                    .update_status(campaign_id, CampaignStatus::Cancelled)
                    .await
                {
                    tracing::error!(campaign_id = %campaign_id, error = %e, "Status persist failed");
                }
                self.append_campaign_event(campaign_id, EventKind::CampaignCancelled)
                    .await;
                self.events.publish_campaign_status(campaign_id, "cancelled");

                // 强制终止在途会话；容量随各自的结果记录释放
                let ended = self.registry.force_end_campaign(campaign_id);
                tracing::info!(
                    campaign_id = %campaign_id,
                    in_flight_ended = ended,
                    "Campaign cancelled"
                );

                self.maybe_finish(campaign_id).await;
            }
        }
    }

    /// 把就绪联系人推进到额度允许的在途数
    async fn pump(&mut self) {
        let ids: Vec<CampaignId> = self.campaigns.keys().copied().collect();
        for campaign_id in ids {
            loop {
                let Some(runtime) = self.campaigns.get_mut(&campaign_id) else {
                    break;
                };
                if runtime.campaign.status() != CampaignStatus::Running {
                    break;
                }
                if runtime.in_flight.load(Ordering::SeqCst) >= runtime.campaign.concurrency_cap()
                {
                    break;
                }
                let Some(contact_id) = runtime.queue.pop_front() else {
                    break;
                };
                // 全局额度耗尽：放回队列，等在途尝试释放后再泵
                let Ok(permit) = self.global.clone().try_acquire_owned() else {
                    runtime.queue.push_front(contact_id);
                    break;
                };
                self.dispatch_one(campaign_id, contact_id, permit).await;
            }
        }
    }

    /// 发起一次拨号尝试
    async fn dispatch_one(
        &mut self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        permit: OwnedSemaphorePermit,
    ) {
        let Some(runtime) = self.campaigns.get_mut(&campaign_id) else {
            return;
        };

        // 额度不变量防御：泵只在 cap 内调用，违背即为编程错误
        let current = runtime.in_flight.load(Ordering::SeqCst);
        if current >= runtime.campaign.concurrency_cap() {
            tracing::error!(
                campaign_id = %campaign_id,
                in_flight = current,
                cap = runtime.campaign.concurrency_cap(),
                "Capacity exceeded, refusing dispatch"
            );
            runtime.queue.push_front(contact_id);
            return;
        }

        let Ok(contact) = runtime.campaign.contact_mut(contact_id) else {
            tracing::error!(campaign_id = %campaign_id, contact_id = %contact_id, "Unknown contact");
            return;
        };
        let seq = contact.begin_attempt();
        let phone = contact.phone().clone();
        let metadata = contact.metadata().clone();
        let contact_snapshot = contact.clone();

        let attempt = CallAttempt::new(contact_id, seq);
        let attempt_id = attempt.id();
        let agent = runtime.agent.clone();

        runtime.in_flight.fetch_add(1, Ordering::SeqCst);
        runtime.pending_attempts.insert(contact_id, attempt.clone());

        // 持久化 + 账本先行，然后才碰电话网关
        if let Err(e) = self.attempt_repo.insert(campaign_id, &attempt).await {
            tracing::error!(attempt_id = %attempt_id, error = %e, "Attempt persist failed");
        }
        if let Err(e) = self
            .campaign_repo
            .update_contact(campaign_id, &contact_snapshot)
            .await
        {
            tracing::error!(contact_id = %contact_id, error = %e, "Contact persist failed");
        }
        let recorded = self
            .append_campaign_event(
                campaign_id,
                EventKind::AttemptStarted {
                    attempt_id,
                    contact_id,
                    seq,
                },
            )
            .await;
        if !recorded {
            // 账本写不进去就不拨号：直接按升级路径收尾本次尝试
            self.handle_internal(InternalEvent::AttemptResolved {
                campaign_id,
                contact_id,
                resolution: AttemptResolution::LedgerFailed,
                permit,
            })
            .await;
            return;
        }

        self.events
            .publish_attempt_started(campaign_id, contact_id, attempt_id, seq);

        tracing::info!(
            campaign_id = %campaign_id,
            contact_id = %contact_id,
            attempt_id = %attempt_id,
            seq = seq,
            phone = %phone,
            "Dialing contact"
        );

        let telephony = self.telephony.clone();
        let orchestrator = self.orchestrator.clone();
        let internal_tx = self.internal_tx.clone();
        let caller_id = self.config.caller_id.clone();

        tokio::spawn(async move {
            let request = PlaceCallRequest {
                phone,
                caller_id,
                metadata,
            };
            let resolution = match telephony.place_call(request).await {
                Ok(handle) => {
                    let (session_id, outcome) = orchestrator
                        .run_session(handle, agent, Some(campaign_id), Some(attempt_id))
                        .await;
                    AttemptResolution::Session {
                        session_id,
                        outcome,
                    }
                }
                Err(e) => AttemptResolution::Dial(e),
            };
            let _ = internal_tx
                .send(InternalEvent::AttemptResolved {
                    campaign_id,
                    contact_id,
                    resolution,
                    permit,
                })
                .await;
        });
    }

    async fn handle_internal(&mut self, evt: InternalEvent) {
        match evt {
            InternalEvent::RetryDue {
                campaign_id,
                contact_id,
            } => {
                let Some(runtime) = self.campaigns.get_mut(&campaign_id) else {
                    return;
                };
                runtime.retries_pending = runtime.retries_pending.saturating_sub(1);
                // 只有仍然待拨的联系人才重新排队（活动可能已取消/联系人已终结）
                let still_pending = runtime
                    .campaign
                    .contact(contact_id)
                    .map(|c| *c.disposition() == ContactDisposition::Pending)
                    .unwrap_or(false);
                if still_pending {
                    runtime.queue.push_back(contact_id);
                }
                self.maybe_finish(campaign_id).await;
            }

            InternalEvent::AttemptResolved {
                campaign_id,
                contact_id,
                resolution,
                permit,
            } => {
                self.resolve_attempt(campaign_id, contact_id, resolution)
                    .await;
                // 容量在结果记录点恰好释放一次：
                // 全局额度随 permit 丢弃归还，活动计数已在 resolve 中递减
                drop(permit);
                self.maybe_finish(campaign_id).await;
            }
        }
    }

    /// 记录尝试结果并决定联系人去向（完成/重试/失败/取消）
    async fn resolve_attempt(
        &mut self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        resolution: AttemptResolution,
    ) {
        // ---- 阶段 1：取出尝试、递减在途（同步，短借用） ----
        let Some(runtime) = self.campaigns.get_mut(&campaign_id) else {
            return;
        };
        let Some(mut attempt) = runtime.pending_attempts.remove(&contact_id) else {
            tracing::error!(contact_id = %contact_id, "Resolution without pending attempt");
            return;
        };
        runtime.in_flight.fetch_sub(1, Ordering::SeqCst);
        let policy = *runtime.campaign.retry_policy();
        let campaign_running = runtime.campaign.status() == CampaignStatus::Running;

        // ---- 阶段 2：结果映射 ----
        // (尝试结局, 失败原因, 是否可重试, 联系人是否就此终结)
        enum ContactFate {
            Completed,
            Cancelled,
            FailedNow,
            MaybeRetry,
        }
        let (outcome, reason, fate) = match resolution {
            AttemptResolution::Dial(e) => {
                let outcome = match &e {
                    DialError::Busy => AttemptOutcome::Busy,
                    DialError::NoAnswer => AttemptOutcome::NoAnswer,
                    _ => AttemptOutcome::Failed,
                };
                let fate = if e.retryable() {
                    ContactFate::MaybeRetry
                } else {
                    ContactFate::FailedNow
                };
                (outcome, Some(e.to_string()), fate)
            }
            AttemptResolution::Session {
                session_id,
                outcome: session_outcome,
            } => {
                attempt.bind_session(session_id);
                match session_outcome {
                    SessionOutcome::Completed | SessionOutcome::IdleTimeout => {
                        (AttemptOutcome::Connected, None, ContactFate::Completed)
                    }
                    SessionOutcome::ProviderFailure => (
                        AttemptOutcome::Connected,
                        Some("provider failure".to_string()),
                        ContactFate::MaybeRetry,
                    ),
                    SessionOutcome::MediaLost => (
                        AttemptOutcome::Connected,
                        Some("media lost".to_string()),
                        ContactFate::FailedNow,
                    ),
                    SessionOutcome::LedgerFailure => (
                        AttemptOutcome::Connected,
                        Some("ledger write failure".to_string()),
                        ContactFate::FailedNow,
                    ),
                    SessionOutcome::Cancelled => {
                        (AttemptOutcome::Cancelled, None, ContactFate::Cancelled)
                    }
                    SessionOutcome::Orphaned => (
                        AttemptOutcome::Failed,
                        Some("orphaned".to_string()),
                        ContactFate::FailedNow,
                    ),
                }
            }
            AttemptResolution::LedgerFailed => (
                AttemptOutcome::Failed,
                Some("ledger write failure".to_string()),
                ContactFate::FailedNow,
            ),
        };

        if let Err(e) = attempt.record_outcome(outcome, reason.clone()) {
            tracing::error!(attempt_id = %attempt.id(), error = %e, "Outcome already recorded");
        }

        // ---- 阶段 3：持久化尝试结果 + 账本 ----
        if let Err(e) = self.attempt_repo.update(campaign_id, &attempt).await {
            tracing::error!(attempt_id = %attempt.id(), error = %e, "Attempt persist failed");
        }
        self.append_campaign_event(
            campaign_id,
            EventKind::AttemptFinished {
                attempt_id: attempt.id(),
                outcome,
                reason: reason.clone(),
            },
        )
        .await;
        self.events
            .publish_attempt_finished(campaign_id, attempt.id(), outcome, reason.clone());

        tracing::info!(
            campaign_id = %campaign_id,
            contact_id = %contact_id,
            attempt_id = %attempt.id(),
            outcome = %outcome.as_str(),
            "Attempt resolved"
        );

        // ---- 阶段 4：联系人去向（同步，短借用） ----
        let Some(runtime) = self.campaigns.get_mut(&campaign_id) else {
            return;
        };
        let Ok(contact) = runtime.campaign.contact_mut(contact_id) else {
            return;
        };

        let mut schedule_retry = None;
        if !contact.disposition().is_resolved() {
            match fate {
                ContactFate::Completed => contact.mark_completed(),
                ContactFate::Cancelled => contact.mark_cancelled(),
                ContactFate::FailedNow => {
                    contact.mark_failed(reason.unwrap_or_else(|| "failed".to_string()));
                }
                ContactFate::MaybeRetry => {
                    if campaign_running && contact.has_attempts_left(&policy) {
                        contact.back_to_pending();
                        let backoff = policy.backoff_after(attempt.seq());
                        let jitter = if self.config.retry_jitter_ms == 0 {
                            Duration::ZERO
                        } else {
                            Duration::from_millis(
                                rand::thread_rng().gen_range(0..=self.config.retry_jitter_ms),
                            )
                        };
                        schedule_retry = Some((backoff + jitter, contact.attempts() + 1));
                        runtime.retries_pending += 1;
                    } else {
                        contact.mark_failed(
                            reason.unwrap_or_else(|| "retries exhausted".to_string()),
                        );
                    }
                }
            }
        }
        let Some(contact_snapshot) = runtime.campaign.contact(contact_id).cloned() else {
            return;
        };

        // ---- 阶段 5：联系人状态持久化 + 重试排定 ----
        if let Err(e) = self
            .campaign_repo
            .update_contact(campaign_id, &contact_snapshot)
            .await
        {
            tracing::error!(contact_id = %contact_id, error = %e, "Contact persist failed");
        }

        match schedule_retry {
            Some((delay, next_seq)) => {
                self.append_campaign_event(
                    campaign_id,
                    EventKind::RetryScheduled {
                        contact_id,
                        next_seq,
                        delay_ms: delay.as_millis() as u64,
                    },
                )
                .await;
                tracing::info!(
                    campaign_id = %campaign_id,
                    contact_id = %contact_id,
                    next_seq = next_seq,
                    delay_ms = delay.as_millis() as u64,
                    "Retry scheduled"
                );
                let internal_tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = internal_tx
                        .send(InternalEvent::RetryDue {
                            campaign_id,
                            contact_id,
                        })
                        .await;
                });
            }
            None => {
                if contact_snapshot.disposition().is_resolved() {
                    self.append_campaign_event(
                        campaign_id,
                        EventKind::ContactResolved {
                            contact_id,
                            disposition: contact_snapshot.disposition().as_str().to_string(),
                        },
                    )
                    .await;
                }
            }
        }
    }

    /// 活动收尾检查：全部联系人终结且无在途/待重试
    async fn maybe_finish(&mut self, campaign_id: CampaignId) {
        let Some(runtime) = self.campaigns.get_mut(&campaign_id) else {
            return;
        };
        let drained = runtime.in_flight.load(Ordering::SeqCst) == 0
            && runtime.retries_pending == 0
            && runtime.queue.is_empty();
        if !drained {
            return;
        }

        match runtime.campaign.status() {
            CampaignStatus::Running if runtime.campaign.all_contacts_resolved() => {
                if let Err(e) = runtime.campaign.complete() {
                    tracing::error!(campaign_id = %campaign_id, error = %e, "Cannot complete");
                }
                if let Err(e) = self
                    .campaign_repo
                    .update_status(campaign_id, CampaignStatus::Completed)
                    .await
                {
                    tracing::error!(campaign_id = %campaign_id, error = %e, "Status persist failed");
                }
                self.append_campaign_event(campaign_id, EventKind::CampaignCompleted)
                    .await;
                self.events.publish_campaign_status(campaign_id, "completed");
                self.events.unregister_campaign(campaign_id);
                self.campaigns.remove(&campaign_id);
                tracing::info!(campaign_id = %campaign_id, "Campaign completed");
            }
            CampaignStatus::Cancelled => {
                self.events.unregister_campaign(campaign_id);
                self.campaigns.remove(&campaign_id);
                tracing::info!(campaign_id = %campaign_id, "Campaign drained after cancel");
            }
            _ => {}
        }
    }
}
