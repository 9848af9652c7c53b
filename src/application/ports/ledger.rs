//! Call Ledger Port - 追加式事件账本
//!
//! 会话/活动的全部状态迁移先写账本、后生效（write-ahead）。
//! append 失败必须升级，绝不静默吞掉——丢事件会破坏可恢复性。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::campaign::{
    AttemptId, AttemptOutcome, CampaignId, ContactId,
};
use crate::domain::session::{CallId, PipelineState, SessionId, SessionOutcome, Turn};

/// 账本错误
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger storage error: {0}")]
    Storage(String),

    #[error("ledger serialization error: {0}")]
    Serialization(String),
}

/// 事件归属范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerScope {
    Session(SessionId),
    Campaign(CampaignId),
}

impl LedgerScope {
    /// 范围前缀键（存储层按此前缀做有序扫描）
    pub fn key(&self) -> String {
        match self {
            LedgerScope::Session(id) => format!("session/{}", id),
            LedgerScope::Campaign(id) => format!("campaign/{}", id),
        }
    }
}

impl std::fmt::Display for LedgerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// 事件类型与载荷
///
/// 注意: 账本行以 bincode 编码，此处不可使用 serde 的
/// tag/flatten/skip 属性（bincode 不支持自描述格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventKind {
    // ---- Campaign 范围 ----
    CampaignSubmitted {
        name: String,
        contact_count: usize,
    },
    CampaignStarted,
    CampaignPaused,
    CampaignResumed,
    CampaignCancelled,
    CampaignCompleted,
    CampaignFailed {
        reason: String,
    },
    AttemptStarted {
        attempt_id: AttemptId,
        contact_id: ContactId,
        seq: u32,
    },
    AttemptFinished {
        attempt_id: AttemptId,
        outcome: AttemptOutcome,
        reason: Option<String>,
    },
    RetryScheduled {
        contact_id: ContactId,
        next_seq: u32,
        delay_ms: u64,
    },
    ContactResolved {
        contact_id: ContactId,
        disposition: String,
    },

    // ---- Session 范围 ----
    SessionStarted {
        attempt_id: Option<AttemptId>,
        call_id: CallId,
    },
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },
    TurnCommitted {
        turn: Turn,
    },
    SessionEnded {
        outcome: SessionOutcome,
    },
}

impl EventKind {
    /// 是否为会话终态事件
    pub fn is_session_terminal(&self) -> bool {
        matches!(self, EventKind::SessionEnded { .. })
    }
}

/// 账本事件
///
/// 同一范围内由 (seq, timestamp) 全序；seq 由账本实现单调分配
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub scope: LedgerScope,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

/// Call Ledger Port
///
/// 持久化追加式账本的抽象接口
#[async_trait]
pub trait LedgerPort: Send + Sync {
    /// 追加事件，返回分配的序号
    ///
    /// 失败时调用方必须升级处理（终止会话/标记失败），不得忽略
    async fn append(&self, scope: LedgerScope, kind: EventKind) -> Result<u64, LedgerError>;

    /// 按序回放一个范围的全部事件
    async fn replay(&self, scope: LedgerScope) -> Result<Vec<LedgerEvent>, LedgerError>;

    /// 列出没有终态事件的会话（进程重启后的孤儿识别）
    async fn open_sessions(&self) -> Result<Vec<SessionId>, LedgerError>;
}
