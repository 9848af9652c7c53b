//! Repository Ports - 持久化抽象
//!
//! 定义活动/尝试持久化的抽象接口，具体实现在 infrastructure/persistence 层

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::campaign::{
    CallAttempt, Campaign, CampaignId, CampaignStatus, Contact, ContactId,
};

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::Database(err.to_string())
    }
}

/// Campaign Repository Port
#[async_trait]
pub trait CampaignRepositoryPort: Send + Sync {
    /// 持久化新活动（含全部联系人）
    async fn insert(&self, campaign: &Campaign) -> Result<(), RepositoryError>;

    /// 更新活动状态
    async fn update_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<(), RepositoryError>;

    /// 更新单个联系人（处置/尝试计数）
    async fn update_contact(
        &self,
        campaign_id: CampaignId,
        contact: &Contact,
    ) -> Result<(), RepositoryError>;

    /// 查找活动（含联系人）
    async fn find_by_id(&self, id: CampaignId) -> Result<Option<Campaign>, RepositoryError>;

    /// 按状态列出活动
    async fn list_by_status(
        &self,
        status: CampaignStatus,
    ) -> Result<Vec<Campaign>, RepositoryError>;
}

/// Attempt Repository Port
#[async_trait]
pub trait AttemptRepositoryPort: Send + Sync {
    /// 持久化新尝试
    async fn insert(
        &self,
        campaign_id: CampaignId,
        attempt: &CallAttempt,
    ) -> Result<(), RepositoryError>;

    /// 更新尝试（记录结果/绑定会话）
    async fn update(
        &self,
        campaign_id: CampaignId,
        attempt: &CallAttempt,
    ) -> Result<(), RepositoryError>;

    /// 列出活动的全部尝试
    async fn list_by_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<CallAttempt>, RepositoryError>;

    /// 列出联系人的全部尝试（按 seq 升序）
    async fn list_by_contact(
        &self,
        contact_id: ContactId,
    ) -> Result<Vec<CallAttempt>, RepositoryError>;
}
