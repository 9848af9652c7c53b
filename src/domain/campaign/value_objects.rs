//! Campaign Context - Value Objects

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// 活动唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(Uuid);

impl CampaignId {
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

impl Default for CampaignId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CampaignId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 联系人唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(Uuid);

impl ContactId {
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

impl Default for ContactId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 呼叫尝试唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(Uuid);

impl AttemptId {
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

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 电话号码（E.164 格式）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// 创建并验证电话号码
    ///
    /// 要求 E.164 格式: `+` 前缀 + 8~15 位数字
    pub fn new(number: impl Into<String>) -> Result<Self, &'static str> {
        let number = number.into();
        let Some(digits) = number.strip_prefix('+') else {
            return Err("phone number must start with '+' (E.164)");
        };
        if digits.len() < 8 || digits.len() > 15 {
            return Err("phone number must have 8 to 15 digits");
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err("phone number may contain only digits after '+'");
        }
        Ok(Self(number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 重试策略
///
/// 不变量:
/// - max_attempts >= 1
/// - 退避时长单调不减，封顶于 backoff_cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 每个联系人的最大尝试次数
    pub max_attempts: u32,
    /// 退避基准时长（毫秒）
    pub backoff_base_ms: u64,
    /// 退避封顶时长（毫秒）
    pub backoff_cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 2_000,
            backoff_cap_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1");
        }
        if self.backoff_base_ms == 0 {
            return Err("backoff_base_ms must be positive");
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err("backoff_cap_ms must not be below backoff_base_ms");
        }
        Ok(())
    }

    /// 计算第 `attempt` 次尝试之后的退避时长
    ///
    /// `backoff = min(base * 2^(attempt-1), cap)`，attempt 从 1 开始计数。
    /// 抖动由调用方（Dispatcher）另行叠加。
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let backoff = self
            .backoff_base_ms
            .saturating_mul(1u64 << shift)
            .min(self.backoff_cap_ms);
        Duration::from_millis(backoff)
    }
}

/// 活动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// 已提交，等待调度
    Pending,
    /// 调度中
    Running,
    /// 已暂停（不再发起新呼叫）
    Paused,
    /// 全部联系人已终结
    Completed,
    /// 已取消
    Cancelled,
    /// 活动级失败
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Pending => "pending",
            CampaignStatus::Running => "running",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Cancelled => "cancelled",
            CampaignStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CampaignStatus::Pending),
            "running" => Some(CampaignStatus::Running),
            "paused" => Some(CampaignStatus::Paused),
            "completed" => Some(CampaignStatus::Completed),
            "cancelled" => Some(CampaignStatus::Cancelled),
            "failed" => Some(CampaignStatus::Failed),
            _ => None,
        }
    }

    /// 是否为终态（终态活动不可再变更）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CampaignStatus::Completed | CampaignStatus::Cancelled | CampaignStatus::Failed
        )
    }
}

/// 单次呼叫尝试的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// 已接通（会话已创建）
    Connected,
    /// 无人接听
    NoAnswer,
    /// 占线
    Busy,
    /// 失败（含不可重试错误与会话级失败）
    Failed,
    /// 被取消
    Cancelled,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Connected => "connected",
            AttemptOutcome::NoAnswer => "no_answer",
            AttemptOutcome::Busy => "busy",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "connected" => Some(AttemptOutcome::Connected),
            "no_answer" => Some(AttemptOutcome::NoAnswer),
            "busy" => Some(AttemptOutcome::Busy),
            "failed" => Some(AttemptOutcome::Failed),
            "cancelled" => Some(AttemptOutcome::Cancelled),
            _ => None,
        }
    }
}

/// 联系人最终处置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactDisposition {
    /// 等待拨号
    Pending,
    /// 呼叫进行中
    InFlight,
    /// 会话完成
    Completed,
    /// 永久失败
    Failed { reason: String },
    /// 活动取消
    Cancelled,
}

impl ContactDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactDisposition::Pending => "pending",
            ContactDisposition::InFlight => "in_flight",
            ContactDisposition::Completed => "completed",
            ContactDisposition::Failed { .. } => "failed",
            ContactDisposition::Cancelled => "cancelled",
        }
    }

    /// 是否已终结（不再产生新的尝试）
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            ContactDisposition::Completed
                | ContactDisposition::Failed { .. }
                | ContactDisposition::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_number_validation() {
        assert!(PhoneNumber::new("+919148227303").is_ok());
        assert!(PhoneNumber::new("919148227303").is_err());
        assert!(PhoneNumber::new("+91abc").is_err());
        assert!(PhoneNumber::new("+12").is_err());
    }

    #[test]
    fn test_backoff_monotone_up_to_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 8_000,
        };

        let mut previous = Duration::ZERO;
        for attempt in 1..=10 {
            let backoff = policy.backoff_after(attempt);
            assert!(backoff >= previous, "backoff must be non-decreasing");
            assert!(backoff <= Duration::from_millis(8_000));
            previous = backoff;
        }
        assert_eq!(policy.backoff_after(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_after(4), Duration::from_millis(8_000));
        assert_eq!(policy.backoff_after(5), Duration::from_millis(8_000));
    }

    #[test]
    fn test_backoff_shift_overflow() {
        let policy = RetryPolicy::default();
        // 大 attempt 不应溢出
        assert_eq!(
            policy.backoff_after(u32::MAX),
            Duration::from_millis(policy.backoff_cap_ms)
        );
    }

    #[test]
    fn test_retry_policy_validation() {
        assert!(RetryPolicy::default().validate().is_ok());
        let invalid = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
        let invalid = RetryPolicy {
            backoff_base_ms: 5_000,
            backoff_cap_ms: 1_000,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            CampaignStatus::Pending,
            CampaignStatus::Running,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
            CampaignStatus::Cancelled,
            CampaignStatus::Failed,
        ] {
            assert_eq!(CampaignStatus::from_str(status.as_str()), Some(status));
        }
    }
}
