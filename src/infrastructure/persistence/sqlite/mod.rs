//! SQLite Persistence - 活动/尝试仓储

mod attempt_repo;
mod campaign_repo;
mod database;

pub use attempt_repo::SqliteAttemptRepository;
pub use campaign_repo::SqliteCampaignRepository;
pub use database::{create_pool, run_migrations, DatabaseConfig, DbPool};
