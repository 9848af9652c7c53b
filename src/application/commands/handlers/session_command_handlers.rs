//! Session Command Handlers

use std::sync::Arc;

use crate::application::commands::session_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{EventKind, LedgerPort, LedgerScope};
use crate::domain::session::SessionOutcome;

/// Recover Handler - 孤儿会话回收
///
/// 启动时调用：账本中没有终态事件的会话，其媒体句柄
/// 已随旧进程消亡，补记 `orphaned` 终态以恢复一致性
pub struct RecoverOrphanSessionsHandler {
    ledger: Arc<dyn LedgerPort>,
}

impl RecoverOrphanSessionsHandler {
    pub fn new(ledger: Arc<dyn LedgerPort>) -> Self {
        Self { ledger }
    }

    pub async fn handle(
        &self,
        _cmd: RecoverOrphanSessionsCommand,
    ) -> Result<RecoverOrphanSessionsResponse, ApplicationError> {
        let orphans = self.ledger.open_sessions().await?;

        let mut recovered = Vec::with_capacity(orphans.len());
        for session_id in orphans {
            self.ledger
                .append(
                    LedgerScope::Session(session_id),
                    EventKind::SessionEnded {
                        outcome: SessionOutcome::Orphaned,
                    },
                )
                .await?;
            tracing::warn!(session_id = %session_id, "Orphaned session force-terminated");
            recovered.push(session_id);
        }

        if !recovered.is_empty() {
            tracing::info!(count = recovered.len(), "Orphan recovery completed");
        }

        Ok(RecoverOrphanSessionsResponse { recovered })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{CallId, SessionId};
    use crate::infrastructure::memory::InMemoryLedger;

    #[tokio::test]
    async fn test_orphans_get_terminal_event() {
        let ledger = Arc::new(InMemoryLedger::new());
        let orphan = SessionId::new();
        let finished = SessionId::new();

        // 一个孤儿、一个正常终结的会话
        for id in [orphan, finished] {
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
                LedgerScope::Session(finished),
                EventKind::SessionEnded {
                    outcome: SessionOutcome::Completed,
                },
            )
            .await
            .unwrap();

        let handler = RecoverOrphanSessionsHandler::new(ledger.clone());
        let response = handler
            .handle(RecoverOrphanSessionsCommand)
            .await
            .unwrap();

        assert_eq!(response.recovered, vec![orphan]);

        // 回收后不再有孤儿
        assert!(ledger.open_sessions().await.unwrap().is_empty());
    }
}
