//! Query Handlers

mod campaign_query_handlers;
mod session_query_handlers;

pub use campaign_query_handlers::CampaignProgressHandler;
pub use session_query_handlers::{rebuild_session, SessionTranscriptHandler};
