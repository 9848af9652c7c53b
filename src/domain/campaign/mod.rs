//! Campaign Context - 外呼活动限界上下文
//!
//! 职责:
//! - 活动聚合与状态管理
//! - 联系人与呼叫尝试实体
//! - 重试策略

mod aggregate;
mod entities;
mod errors;
mod value_objects;

pub use aggregate::Campaign;
pub use entities::{CallAttempt, Contact};
pub use errors::CampaignError;
pub use value_objects::{
    AttemptId, AttemptOutcome, CampaignId, CampaignStatus, ContactDisposition, ContactId,
    PhoneNumber, RetryPolicy,
};
