//! Voxdial - 外呼活动与实时语音对话编排引擎
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Campaign Context: 外呼活动、联系人、呼叫尝试
//! - Session Context: 通话会话、管线状态机、轮次
//!
//! 应用层 (application/):
//! - Ports: 端口定义（Telephony, Stt/Llm/Tts, Ledger, Repositories,
//!   SessionRegistry, RecordingSink）
//! - Commands: 活动提交/暂停/恢复/取消、孤儿会话回收
//! - Queries: 活动进度、会话转写回放
//!
//! 基础设施层 (infrastructure/):
//! - Worker: CampaignDispatcher 调度循环、SessionOrchestrator、
//!   PipelineCoordinator 实时管线、InboundRouter
//! - Adapters: HTTP/Sim 网关与提供商客户端、文件录音外发
//! - Memory: 会话登记表、内存账本
//! - Persistence: SQLite 仓储 + Sled 事件账本
//! - Events: 生命周期事件广播

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
