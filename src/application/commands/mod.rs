//! Application Commands - CQRS 命令侧

pub mod campaign_commands;
pub mod handlers;
pub mod session_commands;

pub use campaign_commands::{
    CancelCampaignCommand, ContactSpec, PauseCampaignCommand, ResumeCampaignCommand,
    SubmitCampaignCommand, SubmitCampaignResponse,
};
pub use session_commands::{RecoverOrphanSessionsCommand, RecoverOrphanSessionsResponse};
