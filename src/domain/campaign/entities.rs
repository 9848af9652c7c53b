//! Campaign Context - Entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::session::SessionId;

use super::{AttemptId, AttemptOutcome, ContactDisposition, ContactId, PhoneNumber, RetryPolicy};

/// 联系人
///
/// 归属于唯一一个 Campaign；attempts 只增不减
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    id: ContactId,
    phone: PhoneNumber,
    display_name: Option<String>,
    /// 每联系人自定义变量（随呼叫传递给 agent）
    metadata: HashMap<String, String>,
    attempts: u32,
    disposition: ContactDisposition,
}

impl Contact {
    pub fn new(phone: PhoneNumber) -> Self {
        Self {
            id: ContactId::new(),
            phone,
            display_name: None,
            metadata: HashMap::new(),
            attempts: 0,
            disposition: ContactDisposition::Pending,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// 从持久化快照重建（仅供仓储层使用）
    pub fn restore(
        id: ContactId,
        phone: PhoneNumber,
        display_name: Option<String>,
        metadata: HashMap<String, String>,
        attempts: u32,
        disposition: ContactDisposition,
    ) -> Self {
        Self {
            id,
            phone,
            display_name,
            metadata,
            attempts,
            disposition,
        }
    }

    /// 记录一次新的拨号尝试，返回该尝试的序号（从 1 开始）
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.disposition = ContactDisposition::InFlight;
        self.attempts
    }

    /// 尝试结束但联系人尚未终结（等待重试）
    pub fn back_to_pending(&mut self) {
        if !self.disposition.is_resolved() {
            self.disposition = ContactDisposition::Pending;
        }
    }

    pub fn mark_completed(&mut self) {
        self.disposition = ContactDisposition::Completed;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.disposition = ContactDisposition::Failed {
            reason: reason.into(),
        };
    }

    pub fn mark_cancelled(&mut self) {
        self.disposition = ContactDisposition::Cancelled;
    }

    /// 按重试策略判断是否还有尝试配额
    pub fn has_attempts_left(&self, policy: &RetryPolicy) -> bool {
        self.attempts < policy.max_attempts
    }

    // Getters
    pub fn id(&self) -> ContactId {
        self.id
    }

    pub fn phone(&self) -> &PhoneNumber {
        &self.phone
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn disposition(&self) -> &ContactDisposition {
        &self.disposition
    }
}

/// 一次具体的拨号尝试
///
/// 不变量:
/// - outcome 只能被设置一次
/// - 重试永远创建新的 CallAttempt（seq+1），不复用旧记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAttempt {
    id: AttemptId,
    contact_id: ContactId,
    /// 尝试序号，从 1 开始
    seq: u32,
    started_at: DateTime<Utc>,
    outcome: Option<AttemptOutcome>,
    /// 失败原因（outcome 为 Failed 时有值）
    failure_reason: Option<String>,
    /// 接通后关联的会话（仅保存 id，不持有会话）
    session_id: Option<SessionId>,
}

impl CallAttempt {
    pub fn new(contact_id: ContactId, seq: u32) -> Self {
        Self {
            id: AttemptId::new(),
            contact_id,
            seq,
            started_at: Utc::now(),
            outcome: None,
            failure_reason: None,
            session_id: None,
        }
    }

    /// 从持久化快照重建（仅供仓储层使用）
    pub fn restore(
        id: AttemptId,
        contact_id: ContactId,
        seq: u32,
        started_at: DateTime<Utc>,
        outcome: Option<AttemptOutcome>,
        failure_reason: Option<String>,
        session_id: Option<SessionId>,
    ) -> Self {
        Self {
            id,
            contact_id,
            seq,
            started_at,
            outcome,
            failure_reason,
            session_id,
        }
    }

    /// 接通时绑定会话 id
    pub fn bind_session(&mut self, session_id: SessionId) {
        self.session_id = Some(session_id);
    }

    /// 记录尝试结果（恰好一次）
    pub fn record_outcome(
        &mut self,
        outcome: AttemptOutcome,
        reason: Option<String>,
    ) -> Result<(), &'static str> {
        if self.outcome.is_some() {
            return Err("attempt outcome already recorded");
        }
        self.outcome = Some(outcome);
        self.failure_reason = reason;
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    // Getters
    pub fn id(&self) -> AttemptId {
        self.id
    }

    pub fn contact_id(&self) -> ContactId {
        self.contact_id
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn outcome(&self) -> Option<AttemptOutcome> {
        self.outcome
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Contact {
        Contact::new(PhoneNumber::new("+919148227303").unwrap())
    }

    #[test]
    fn test_contact_attempt_counting() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        };
        let mut contact = contact();

        assert!(contact.has_attempts_left(&policy));
        assert_eq!(contact.begin_attempt(), 1);
        assert_eq!(*contact.disposition(), ContactDisposition::InFlight);

        contact.back_to_pending();
        assert!(contact.has_attempts_left(&policy));
        assert_eq!(contact.begin_attempt(), 2);
        assert!(!contact.has_attempts_left(&policy));
    }

    #[test]
    fn test_resolved_contact_stays_resolved() {
        let mut contact = contact();
        contact.begin_attempt();
        contact.mark_completed();
        contact.back_to_pending();
        assert_eq!(*contact.disposition(), ContactDisposition::Completed);
    }

    #[test]
    fn test_attempt_outcome_recorded_once() {
        let contact = contact();
        let mut attempt = CallAttempt::new(contact.id(), 1);
        assert!(!attempt.is_resolved());

        assert!(attempt.record_outcome(AttemptOutcome::Busy, None).is_ok());
        assert!(attempt.is_resolved());

        // 第二次记录被拒绝
        let second = attempt.record_outcome(AttemptOutcome::Connected, None);
        assert!(second.is_err());
        assert_eq!(attempt.outcome(), Some(AttemptOutcome::Busy));
    }
}
