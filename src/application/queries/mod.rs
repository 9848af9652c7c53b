//! Application Queries - CQRS 查询侧

pub mod campaign_queries;
pub mod handlers;
pub mod session_queries;

pub use campaign_queries::{CampaignProgress, CampaignProgressQuery};
pub use session_queries::{SessionTranscript, SessionTranscriptQuery};
