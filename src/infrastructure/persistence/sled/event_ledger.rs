//! Sled-based Event Ledger Implementation
//!
//! 追加式账本的持久化实现。键为 `{scope}/{seq:020}`，
//! sled 的字典序前缀扫描即按序回放；seq 全局单调，
//! 打开时从既有最大值恢复。

use async_trait::async_trait;
use chrono::Utc;
use sled::Db;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::ports::{
    EventKind, LedgerError, LedgerEvent, LedgerPort, LedgerScope,
};
use crate::domain::session::SessionId;

/// Sled 账本配置
#[derive(Debug, Clone)]
pub struct SledLedgerConfig {
    /// 数据库路径
    pub db_path: String,
}

impl Default for SledLedgerConfig {
    fn default() -> Self {
        Self {
            db_path: "data/ledger.sled".to_string(),
        }
    }
}

/// Sled 事件账本
pub struct SledEventLedger {
    db: Db,
    next_seq: AtomicU64,
}

impl SledEventLedger {
    /// 打开（或创建）账本
    pub fn new(config: &SledLedgerConfig) -> Result<Self, LedgerError> {
        let db = sled::open(&config.db_path).map_err(|e| LedgerError::Storage(e.to_string()))?;

        // 从既有事件恢复单调序号
        let mut max_seq = 0u64;
        for item in db.iter() {
            let (_, value) = item.map_err(|e| LedgerError::Storage(e.to_string()))?;
            let event: LedgerEvent = bincode::deserialize(&value)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            max_seq = max_seq.max(event.seq + 1);
        }

        tracing::info!(
            db_path = %config.db_path,
            next_seq = max_seq,
            "SledEventLedger opened"
        );

        Ok(Self {
            db,
            next_seq: AtomicU64::new(max_seq),
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 组合存储键：范围前缀 + 零填充序号，保证字典序 == 数值序
    fn storage_key(scope: &LedgerScope, seq: u64) -> String {
        format!("{}/{:020}", scope.key(), seq)
    }
}

#[async_trait]
impl LedgerPort for SledEventLedger {
    async fn append(&self, scope: LedgerScope, kind: EventKind) -> Result<u64, LedgerError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let event = LedgerEvent {
            scope,
            seq,
            timestamp: Utc::now(),
            kind,
        };

        let bytes = bincode::serialize(&event)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let key = Self::storage_key(&scope, seq);

        self.db
            .insert(key.as_bytes(), bytes)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        // 账本是 write-ahead 依据，逐条落盘
        self.db
            .flush_async()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(seq)
    }

    async fn replay(&self, scope: LedgerScope) -> Result<Vec<LedgerEvent>, LedgerError> {
        let prefix = format!("{}/", scope.key());
        let mut events = Vec::new();

        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item.map_err(|e| LedgerError::Storage(e.to_string()))?;
            let event: LedgerEvent = bincode::deserialize(&value)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            events.push(event);
        }

        Ok(events)
    }

    async fn open_sessions(&self) -> Result<Vec<SessionId>, LedgerError> {
        let mut terminal: HashMap<SessionId, bool> = HashMap::new();

        for item in self.db.scan_prefix(b"session/") {
            let (_, value) = item.map_err(|e| LedgerError::Storage(e.to_string()))?;
            let event: LedgerEvent = bincode::deserialize(&value)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            let LedgerScope::Session(session_id) = event.scope else {
                continue;
            };
            let entry = terminal.entry(session_id).or_insert(false);
            if event.kind.is_session_terminal() {
                *entry = true;
            }
        }

        Ok(terminal
            .into_iter()
            .filter_map(|(id, has_terminal)| (!has_terminal).then_some(id))
            .collect())
    }
}
