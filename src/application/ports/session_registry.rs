//! Session Registry Port - 活动会话登记
//!
//! 登记进程内所有在途会话及其取消句柄，供 Dispatcher 的
//! cancel / forceEnd 在亚秒内打断任何阶段的等待。

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::campaign::{AttemptId, CampaignId};
use crate::domain::session::{CallId, SessionId};

/// Registry 错误
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session already registered: {0}")]
    AlreadyRegistered(SessionId),
}

/// 在途会话登记项
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub session_id: SessionId,
    pub call_id: CallId,
    /// 呼出会话归属的活动（入站会话为 None）
    pub campaign_id: Option<CampaignId>,
    pub attempt_id: Option<AttemptId>,
    /// 取消令牌：触发后管线在下一个等待点退出
    pub cancel: CancellationToken,
    pub started_at: DateTime<Utc>,
}

impl ActiveSession {
    pub fn new(
        session_id: SessionId,
        call_id: CallId,
        campaign_id: Option<CampaignId>,
        attempt_id: Option<AttemptId>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            call_id,
            campaign_id,
            attempt_id,
            cancel,
            started_at: Utc::now(),
        }
    }
}

/// Session Registry Port
///
/// 管理在途会话的登记与强制终止，所有状态存储在内存中
pub trait SessionRegistryPort: Send + Sync {
    /// 登记会话
    fn register(&self, session: ActiveSession) -> Result<(), RegistryError>;

    /// 注销会话（终态迁移时调用）
    fn remove(&self, id: &SessionId) -> Option<ActiveSession>;

    /// 强制终止单个会话，返回是否找到
    fn force_end(&self, id: &SessionId) -> bool;

    /// 强制终止一个活动的全部在途会话，返回终止数量
    fn force_end_campaign(&self, campaign_id: CampaignId) -> usize;

    /// 会话是否在途
    fn is_active(&self, id: &SessionId) -> bool;

    /// 在途会话数
    fn active_count(&self) -> usize;

    /// 全部在途会话 ID
    fn list_all(&self) -> Vec<SessionId>;
}
