//! Session Context - Value Objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 会话唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 通话（媒体句柄）唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 发言方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Caller,
    Agent,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Caller => "caller",
            Speaker::Agent => "agent",
        }
    }
}

/// 音频管线状态
///
/// 每个会话同一时刻只有一个阶段处于活动状态；
/// 唯一的例外是 Speaking 期间并发的打断检测（barge-in）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// 缓冲来电方音频，等待静音边界
    Listening,
    /// 向语音识别服务流式提交音频
    Transcribing,
    /// 等待语言模型生成回复
    Thinking,
    /// 向来电方播放合成音频，同时监听打断
    Speaking,
    /// 来电方打断，正在取消在途合成
    Interrupted,
    /// 终态
    Ended,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Listening => "listening",
            PipelineState::Transcribing => "transcribing",
            PipelineState::Thinking => "thinking",
            PipelineState::Speaking => "speaking",
            PipelineState::Interrupted => "interrupted",
            PipelineState::Ended => "ended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "listening" => Some(PipelineState::Listening),
            "transcribing" => Some(PipelineState::Transcribing),
            "thinking" => Some(PipelineState::Thinking),
            "speaking" => Some(PipelineState::Speaking),
            "interrupted" => Some(PipelineState::Interrupted),
            "ended" => Some(PipelineState::Ended),
            _ => None,
        }
    }

    /// 合法状态迁移表
    ///
    /// 任何状态都可以进入 Ended（挂断/致命错误/超时）。
    /// Listening -> Speaking 用于开场白（agent 先开口）；
    /// Transcribing -> Listening 用于空转写回到聆听；
    /// Thinking -> Listening 用于空回复回到聆听。
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        if next == PipelineState::Ended {
            return *self != PipelineState::Ended;
        }
        matches!(
            (self, next),
            (PipelineState::Listening, PipelineState::Transcribing)
                | (PipelineState::Listening, PipelineState::Speaking)
                | (PipelineState::Transcribing, PipelineState::Thinking)
                | (PipelineState::Transcribing, PipelineState::Listening)
                | (PipelineState::Thinking, PipelineState::Speaking)
                | (PipelineState::Thinking, PipelineState::Listening)
                | (PipelineState::Speaking, PipelineState::Interrupted)
                | (PipelineState::Speaking, PipelineState::Listening)
                | (PipelineState::Interrupted, PipelineState::Listening)
        )
    }
}

/// 会话终态结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// 正常结束（来电方挂断或对话自然完成）
    Completed,
    /// 提供商重试耗尽
    ProviderFailure,
    /// 媒体句柄丢失/帧流异常关闭
    MediaLost,
    /// 空闲超时
    IdleTimeout,
    /// 被调度器强制终止（活动取消）
    Cancelled,
    /// 账本写入失败（升级为终态，威胁可恢复性）
    LedgerFailure,
    /// 进程重启后发现的孤儿会话
    Orphaned,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::ProviderFailure => "provider_failure",
            SessionOutcome::MediaLost => "media_lost",
            SessionOutcome::IdleTimeout => "idle_timeout",
            SessionOutcome::Cancelled => "cancelled",
            SessionOutcome::LedgerFailure => "ledger_failure",
            SessionOutcome::Orphaned => "orphaned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(SessionOutcome::Completed),
            "provider_failure" => Some(SessionOutcome::ProviderFailure),
            "media_lost" => Some(SessionOutcome::MediaLost),
            "idle_timeout" => Some(SessionOutcome::IdleTimeout),
            "cancelled" => Some(SessionOutcome::Cancelled),
            "ledger_failure" => Some(SessionOutcome::LedgerFailure),
            "orphaned" => Some(SessionOutcome::Orphaned),
            _ => None,
        }
    }
}

/// 一轮发言
///
/// 会话内 append-only，由管线在轮次结束时提交
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// 发言方
    pub speaker: Speaker,
    /// 转写文本（agent 轮为生成文本）
    pub transcript: String,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 结束时间
    pub ended_at: DateTime<Utc>,
    /// 是否被打断
    pub interrupted: bool,
}

impl Turn {
    pub fn new(speaker: Speaker, transcript: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            speaker,
            transcript: transcript.into(),
            started_at: now,
            ended_at: now,
            interrupted: false,
        }
    }

    pub fn with_span(
        speaker: Speaker,
        transcript: impl Into<String>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        Self {
            speaker,
            transcript: transcript.into(),
            started_at,
            ended_at,
            interrupted: false,
        }
    }

    pub fn interrupted(mut self) -> Self {
        self.interrupted = true;
        self
    }
}
