//! Recording Sink Port - 录音外发抽象
//!
//! 核心按 Turn 产出原始 PCM 字节，由外部存储协作方落盘/上传；
//! 核心不管理存储介质与访问 URL。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::session::{SessionId, Speaker};

/// Recording 错误
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("io error: {0}")]
    Io(String),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// 一轮发言的录音
#[derive(Debug, Clone)]
pub struct TurnRecording {
    pub session_id: SessionId,
    /// 轮次序号（会话内从 0 递增）
    pub turn_index: usize,
    pub speaker: Speaker,
    /// 小端 i16 PCM 字节
    pub audio: Vec<u8>,
    pub sample_rate: u32,
}

/// Recording Sink Port
#[async_trait]
pub trait RecordingSinkPort: Send + Sync {
    /// 存储一轮录音
    ///
    /// 失败只记日志，不影响通话
    async fn store_turn(&self, recording: TurnRecording) -> Result<(), RecordingError>;
}
