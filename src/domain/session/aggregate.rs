//! Session Context - Aggregate Root

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::campaign::AttemptId;

use super::{PipelineState, SessionError, SessionId, SessionOutcome, Turn};

/// Session 聚合根
///
/// 不变量:
/// - 同一会话恰好经历一次终态迁移，outcome 只设置一次
/// - Turn 序列 append-only，终态后不可追加
/// - 仅反向持有 CallAttempt 的 id，不持有实体（避免环）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    attempt_id: Option<AttemptId>,
    state: PipelineState,
    turns: Vec<Turn>,
    outcome: Option<SessionOutcome>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// 创建新会话（呼出：绑定触发它的 CallAttempt）
    pub fn new(attempt_id: Option<AttemptId>) -> Self {
        Self {
            id: SessionId::new(),
            attempt_id,
            state: PipelineState::Listening,
            turns: Vec::new(),
            outcome: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// 以既有 id 重建会话（Ledger 回放用）
    pub fn with_id(id: SessionId, attempt_id: Option<AttemptId>) -> Self {
        Self {
            id,
            attempt_id,
            state: PipelineState::Listening,
            turns: Vec::new(),
            outcome: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// 管线状态迁移（非终态）
    pub fn transition(&mut self, to: PipelineState) -> Result<(), SessionError> {
        if let Some(outcome) = self.outcome {
            return Err(SessionError::AlreadyEnded(outcome));
        }
        if !self.state.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// 追加一轮发言
    pub fn push_turn(&mut self, turn: Turn) -> Result<(), SessionError> {
        if let Some(outcome) = self.outcome {
            return Err(SessionError::AlreadyEnded(outcome));
        }
        self.turns.push(turn);
        Ok(())
    }

    /// 终态迁移（恰好一次）
    pub fn end(&mut self, outcome: SessionOutcome) -> Result<(), SessionError> {
        if let Some(existing) = self.outcome {
            return Err(SessionError::AlreadyEnded(existing));
        }
        self.state = PipelineState::Ended;
        self.outcome = Some(outcome);
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    // Getters
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.attempt_id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::Speaker;

    #[test]
    fn test_full_turn_cycle() {
        let mut session = Session::new(None);
        assert_eq!(session.state(), PipelineState::Listening);

        session.transition(PipelineState::Transcribing).unwrap();
        session.transition(PipelineState::Thinking).unwrap();
        session.transition(PipelineState::Speaking).unwrap();
        session
            .push_turn(Turn::new(Speaker::Caller, "hello"))
            .unwrap();
        session.transition(PipelineState::Listening).unwrap();

        assert_eq!(session.turns().len(), 1);
        assert!(!session.is_terminal());
    }

    #[test]
    fn test_barge_in_path() {
        let mut session = Session::new(None);
        session.transition(PipelineState::Transcribing).unwrap();
        session.transition(PipelineState::Thinking).unwrap();
        session.transition(PipelineState::Speaking).unwrap();
        session.transition(PipelineState::Interrupted).unwrap();
        session.transition(PipelineState::Listening).unwrap();
        assert_eq!(session.state(), PipelineState::Listening);
    }

    #[test]
    fn test_exactly_one_terminal_transition() {
        let mut session = Session::new(None);
        session.end(SessionOutcome::IdleTimeout).unwrap();
        assert!(session.is_terminal());
        assert_eq!(session.state(), PipelineState::Ended);

        // 第二次终态迁移被拒绝
        assert_eq!(
            session.end(SessionOutcome::Completed),
            Err(SessionError::AlreadyEnded(SessionOutcome::IdleTimeout))
        );
        // 终态后禁止任何活动
        assert!(session.transition(PipelineState::Listening).is_err());
        assert!(session
            .push_turn(Turn::new(Speaker::Agent, "late"))
            .is_err());
    }

    #[test]
    fn test_illegal_skip_rejected() {
        let mut session = Session::new(None);
        assert_eq!(
            session.transition(PipelineState::Speaking),
            Err(SessionError::InvalidTransition {
                from: PipelineState::Listening,
                to: PipelineState::Speaking,
            })
        );
    }
}
