//! Session Query Handlers
//!
//! 从账本回放重建会话状态。回放与在线执行收敛到同一
//! 终态是核心的可恢复性保证。

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{EventKind, LedgerEvent, LedgerPort, LedgerScope};
use crate::application::queries::session_queries::*;
use crate::domain::session::{Session, SessionId};

/// 将账本事件序列回放为 Session 聚合
///
/// 事件序列必须以 SessionStarted 开头；任何在线执行产生的
/// 合法序列都能无损重建
pub fn rebuild_session(
    session_id: SessionId,
    events: &[LedgerEvent],
) -> Result<Session, ApplicationError> {
    let mut iter = events.iter();

    let first = iter.next().ok_or_else(|| {
        ApplicationError::invalid_state(format!("no events for session {}", session_id))
    })?;
    let mut session = match &first.kind {
        EventKind::SessionStarted { attempt_id, .. } => {
            Session::with_id(session_id, *attempt_id)
        }
        other => {
            return Err(ApplicationError::invalid_state(format!(
                "session log must start with SessionStarted, got {:?}",
                other
            )))
        }
    };

    for event in iter {
        match &event.kind {
            EventKind::StateChanged { to, .. } => {
                session
                    .transition(*to)
                    .map_err(|e| ApplicationError::invalid_state(e.to_string()))?;
            }
            EventKind::TurnCommitted { turn } => {
                session
                    .push_turn(turn.clone())
                    .map_err(|e| ApplicationError::invalid_state(e.to_string()))?;
            }
            EventKind::SessionEnded { outcome } => {
                session
                    .end(*outcome)
                    .map_err(|e| ApplicationError::invalid_state(e.to_string()))?;
            }
            other => {
                return Err(ApplicationError::invalid_state(format!(
                    "unexpected event in session log: {:?}",
                    other
                )))
            }
        }
    }

    Ok(session)
}

/// Transcript Handler - 会话转写回放
pub struct SessionTranscriptHandler {
    ledger: Arc<dyn LedgerPort>,
}

impl SessionTranscriptHandler {
    pub fn new(ledger: Arc<dyn LedgerPort>) -> Self {
        Self { ledger }
    }

    pub async fn handle(
        &self,
        query: SessionTranscriptQuery,
    ) -> Result<SessionTranscript, ApplicationError> {
        let events = self
            .ledger
            .replay(LedgerScope::Session(query.session_id))
            .await?;
        if events.is_empty() {
            return Err(ApplicationError::not_found("Session", query.session_id));
        }

        let session = rebuild_session(query.session_id, &events)?;

        Ok(SessionTranscript {
            session_id: session.id(),
            outcome: session.outcome(),
            turns: session.turns().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{
        CallId, PipelineState, SessionOutcome, Speaker, Turn,
    };
    use crate::infrastructure::memory::InMemoryLedger;

    /// 在线执行一个双轮会话，再回放比对终态
    #[tokio::test]
    async fn test_replay_matches_live_execution() {
        let ledger = Arc::new(InMemoryLedger::new());
        let session_id = SessionId::new();
        let scope = LedgerScope::Session(session_id);

        // 在线执行：与账本同步推进一个领域聚合
        let mut live = Session::with_id(session_id, None);
        ledger
            .append(
                scope,
                EventKind::SessionStarted {
                    attempt_id: None,
                    call_id: CallId::new(),
                },
            )
            .await
            .unwrap();

        let steps = [
            PipelineState::Transcribing,
            PipelineState::Thinking,
            PipelineState::Speaking,
        ];
        for to in steps {
            let from = live.state();
            ledger
                .append(scope, EventKind::StateChanged { from, to })
                .await
                .unwrap();
            live.transition(to).unwrap();
        }

        let turn = Turn::new(Speaker::Caller, "hello there");
        ledger
            .append(scope, EventKind::TurnCommitted { turn: turn.clone() })
            .await
            .unwrap();
        live.push_turn(turn).unwrap();

        ledger
            .append(
                scope,
                EventKind::SessionEnded {
                    outcome: SessionOutcome::Completed,
                },
            )
            .await
            .unwrap();
        live.end(SessionOutcome::Completed).unwrap();

        // 回放
        let events = ledger.replay(scope).await.unwrap();
        let rebuilt = rebuild_session(session_id, &events).unwrap();

        assert_eq!(rebuilt.state(), live.state());
        assert_eq!(rebuilt.outcome(), live.outcome());
        assert_eq!(rebuilt.turns(), live.turns());

        // 查询面走同一条回放路径
        let handler = SessionTranscriptHandler::new(ledger);
        let transcript = handler
            .handle(SessionTranscriptQuery { session_id })
            .await
            .unwrap();
        assert_eq!(transcript.outcome, Some(SessionOutcome::Completed));
        assert_eq!(transcript.turns, live.turns().to_vec());
    }

    #[tokio::test]
    async fn test_replay_without_start_event_rejected() {
        let session_id = SessionId::new();
        let event = LedgerEvent {
            scope: LedgerScope::Session(session_id),
            seq: 0,
            timestamp: chrono::Utc::now(),
            kind: EventKind::SessionEnded {
                outcome: SessionOutcome::Completed,
            },
        };
        assert!(rebuild_session(session_id, &[event]).is_err());
    }
}
