//! Workers - 核心执行单元
//!
//! - CampaignDispatcher: 活动调度循环
//! - SessionOrchestrator: 会话生命周期
//! - PipelineCoordinator: 每会话实时对话管线
//! - InboundRouter: 入站呼叫路由

mod dispatcher;
mod inbound;
mod orchestrator;
mod pipeline;

pub use dispatcher::{
    CampaignDispatcher, DispatchError, DispatcherConfig, DispatcherHandle, DispatcherProbe,
};
pub use inbound::InboundRouter;
pub use orchestrator::SessionOrchestrator;
pub use pipeline::{PipelineConfig, PipelineCoordinator, PipelineDeps};
