//! Campaign Queries - 活动查询定义

use crate::domain::campaign::{CampaignId, CampaignStatus};

/// 活动进度查询
#[derive(Debug, Clone)]
pub struct CampaignProgressQuery {
    pub campaign_id: CampaignId,
}

/// 活动进度
#[derive(Debug, Clone)]
pub struct CampaignProgress {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    pub total_contacts: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// 已发起的尝试总数
    pub total_attempts: usize,
}
