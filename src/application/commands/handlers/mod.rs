//! Command Handlers

mod campaign_command_handlers;
mod session_command_handlers;

pub use campaign_command_handlers::{
    CancelCampaignHandler, PauseCampaignHandler, ResumeCampaignHandler, SubmitCampaignHandler,
};
pub use session_command_handlers::RecoverOrphanSessionsHandler;
