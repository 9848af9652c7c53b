//! Session Queries - 会话查询定义

use crate::domain::session::{SessionId, SessionOutcome, Turn};

/// 会话转写查询（从账本回放重建）
#[derive(Debug, Clone)]
pub struct SessionTranscriptQuery {
    pub session_id: SessionId,
}

/// 会话转写
#[derive(Debug, Clone)]
pub struct SessionTranscript {
    pub session_id: SessionId,
    pub outcome: Option<SessionOutcome>,
    pub turns: Vec<Turn>,
}
