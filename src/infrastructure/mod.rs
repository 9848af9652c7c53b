//! Infrastructure Layer - 基础设施层
//!
//! - Adapters: 电话网关与三个 AI 提供商的客户端、录音外发
//! - Memory: 会话登记表与内存账本
//! - Persistence: SQLite 仓储 + Sled 事件账本
//! - Worker: 调度器、会话编排、对话管线、入站路由
//! - Events: 生命周期事件广播

pub mod adapters;
pub mod events;
pub mod memory;
pub mod persistence;
pub mod worker;
