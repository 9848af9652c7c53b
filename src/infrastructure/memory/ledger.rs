//! In-Memory Ledger Implementation
//!
//! 无持久化的账本实现，用于测试与仿真运行。
//! 语义与 SledEventLedger 一致：单调序号、范围内全序。

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::ports::{
    EventKind, LedgerError, LedgerEvent, LedgerPort, LedgerScope,
};
use crate::domain::session::SessionId;

/// 内存账本
pub struct InMemoryLedger {
    /// scope key -> 有序事件列表
    events: DashMap<String, Vec<LedgerEvent>>,
    /// 全局单调序号
    next_seq: AtomicU64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 全部事件数（测试用）
    pub fn total_events(&self) -> usize {
        self.events.iter().map(|e| e.value().len()).sum()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerPort for InMemoryLedger {
    async fn append(&self, scope: LedgerScope, kind: EventKind) -> Result<u64, LedgerError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let event = LedgerEvent {
            scope,
            seq,
            timestamp: Utc::now(),
            kind,
        };
        self.events.entry(scope.key()).or_default().push(event);
        Ok(seq)
    }

    async fn replay(&self, scope: LedgerScope) -> Result<Vec<LedgerEvent>, LedgerError> {
        Ok(self
            .events
            .get(&scope.key())
            .map(|e| e.clone())
            .unwrap_or_default())
    }

    async fn open_sessions(&self) -> Result<Vec<SessionId>, LedgerError> {
        let mut open = Vec::new();
        for entry in self.events.iter() {
            let Some(LedgerScope::Session(session_id)) =
                entry.value().first().map(|e| e.scope)
            else {
                continue;
            };
            let terminal = entry.value().iter().any(|e| e.kind.is_session_terminal());
            if !terminal {
                open.push(session_id);
            }
        }
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{CallId, SessionOutcome};

    #[tokio::test]
    async fn test_append_is_ordered_per_scope() {
        let ledger = InMemoryLedger::new();
        let scope = LedgerScope::Session(SessionId::new());

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
        ledger
            .append(
                scope,
                EventKind::SessionEnded {
                    outcome: SessionOutcome::Completed,
                },
            )
            .await
            .unwrap();

        let events = ledger.replay(scope).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].seq < events[1].seq);
    }

    #[tokio::test]
    async fn test_open_sessions_only_without_terminal() {
        let ledger = InMemoryLedger::new();
        let open_id = SessionId::new();
        let closed_id = SessionId::new();

        for id in [open_id, closed_id] {
            ledger
                .append(
                    LedgerScope::Session(id),
                    EventKind::SessionStarted {
                        attempt_id: None,
                        call_id: CallId::new(),
                    },
                )
                .await
                .unwrap();
        }
        ledger
            .append(
                LedgerScope::Session(closed_id),
                EventKind::SessionEnded {
                    outcome: SessionOutcome::Completed,
                },
            )
            .await
            .unwrap();

        let open = ledger.open_sessions().await.unwrap();
        assert_eq!(open, vec![open_id]);
    }
}
