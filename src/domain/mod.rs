//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Campaign Context: 外呼活动与联系人
//! - Session Context: 通话会话与管线状态机

pub mod campaign;
pub mod session;

// 共享的 agent 画像
mod agent_profile;

pub use agent_profile::AgentProfile;
