//! Session Context - 会话限界上下文
//!
//! 职责:
//! - 会话聚合与管线状态机
//! - 轮次（Turn）序列
//! - 终态结果

mod aggregate;
mod errors;
mod value_objects;

pub use aggregate::Session;
pub use errors::SessionError;
pub use value_objects::{CallId, PipelineState, SessionId, SessionOutcome, Speaker, Turn};
