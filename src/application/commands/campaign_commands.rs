//! Campaign Commands - 活动指令定义

use std::collections::HashMap;

use crate::domain::campaign::{CampaignId, RetryPolicy};
use crate::domain::AgentProfile;

/// 提交活动
#[derive(Debug, Clone)]
pub struct SubmitCampaignCommand {
    pub name: String,
    pub contacts: Vec<ContactSpec>,
    /// 活动内并发上限
    pub concurrency_cap: usize,
    pub retry_policy: RetryPolicy,
    /// 本活动所有会话使用的 agent 画像
    pub agent: AgentProfile,
}

/// 联系人描述（由外部摄取协作方产出）
#[derive(Debug, Clone)]
pub struct ContactSpec {
    /// E.164 号码
    pub phone_number: String,
    pub display_name: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// 提交活动响应
#[derive(Debug, Clone)]
pub struct SubmitCampaignResponse {
    pub campaign_id: CampaignId,
    pub contact_count: usize,
}

/// 暂停活动：停止新呼叫，在途会话继续
#[derive(Debug, Clone)]
pub struct PauseCampaignCommand {
    pub campaign_id: CampaignId,
}

/// 恢复活动
#[derive(Debug, Clone)]
pub struct ResumeCampaignCommand {
    pub campaign_id: CampaignId,
}

/// 取消活动：停止新呼叫并强制终止在途会话
#[derive(Debug, Clone)]
pub struct CancelCampaignCommand {
    pub campaign_id: CampaignId,
}
