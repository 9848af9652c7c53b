//! Event Publisher Implementation
//!
//! 活动/会话生命周期事件的广播推送，供核心之外的
//! 展示面（dashboard/webhook 协作方）订阅

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::domain::campaign::{AttemptId, AttemptOutcome, CampaignId, ContactId};
use crate::domain::session::{SessionId, SessionOutcome};

/// 生命周期事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum LifecycleEvent {
    /// 活动状态变更
    CampaignStatusChanged {
        campaign_id: CampaignId,
        status: String,
    },
    /// 尝试发起
    AttemptStarted {
        campaign_id: CampaignId,
        contact_id: ContactId,
        attempt_id: AttemptId,
        seq: u32,
    },
    /// 尝试终结
    AttemptFinished {
        campaign_id: CampaignId,
        attempt_id: AttemptId,
        outcome: AttemptOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// 会话创建
    SessionStarted {
        session_id: SessionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        campaign_id: Option<CampaignId>,
    },
    /// 会话终结
    SessionEnded {
        session_id: SessionId,
        outcome: SessionOutcome,
    },
}

/// 事件发布器
pub struct EventPublisher {
    /// campaign_id -> broadcast sender（活动维度订阅）
    campaign_channels: DashMap<CampaignId, broadcast::Sender<LifecycleEvent>>,
    /// 全局广播
    global_channel: broadcast::Sender<LifecycleEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (global_tx, _) = broadcast::channel(256);
        Self {
            campaign_channels: DashMap::new(),
            global_channel: global_tx,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅全局事件
    pub fn subscribe_global(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.global_channel.subscribe()
    }

    /// 订阅单个活动的事件
    pub fn subscribe_campaign(&self, campaign_id: CampaignId) -> broadcast::Receiver<LifecycleEvent> {
        if let Some(sender) = self.campaign_channels.get(&campaign_id) {
            return sender.subscribe();
        }
        let (tx, rx) = broadcast::channel(256);
        self.campaign_channels.insert(campaign_id, tx);
        rx
    }

    /// 取消活动的事件通道（活动终结后清理）
    pub fn unregister_campaign(&self, campaign_id: CampaignId) {
        self.campaign_channels.remove(&campaign_id);
    }

    /// 发布活动状态变更
    pub fn publish_campaign_status(&self, campaign_id: CampaignId, status: &str) {
        self.publish(
            Some(campaign_id),
            LifecycleEvent::CampaignStatusChanged {
                campaign_id,
                status: status.to_string(),
            },
        );
    }

    /// 发布尝试发起
    pub fn publish_attempt_started(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        attempt_id: AttemptId,
        seq: u32,
    ) {
        self.publish(
            Some(campaign_id),
            LifecycleEvent::AttemptStarted {
                campaign_id,
                contact_id,
                attempt_id,
                seq,
            },
        );
    }

    /// 发布尝试终结
    pub fn publish_attempt_finished(
        &self,
        campaign_id: CampaignId,
        attempt_id: AttemptId,
        outcome: AttemptOutcome,
        reason: Option<String>,
    ) {
        self.publish(
            Some(campaign_id),
            LifecycleEvent::AttemptFinished {
                campaign_id,
                attempt_id,
                outcome,
                reason,
            },
        );
    }

    /// 发布会话创建
    pub fn publish_session_started(
        &self,
        session_id: SessionId,
        campaign_id: Option<CampaignId>,
    ) {
        self.publish(
            campaign_id,
            LifecycleEvent::SessionStarted {
                session_id,
                campaign_id,
            },
        );
    }

    /// 发布会话终结
    pub fn publish_session_ended(
        &self,
        session_id: SessionId,
        campaign_id: Option<CampaignId>,
        outcome: SessionOutcome,
    ) {
        self.publish(
            campaign_id,
            LifecycleEvent::SessionEnded {
                session_id,
                outcome,
            },
        );
    }

    /// 发布到活动通道 + 全局通道
    fn publish(&self, campaign_id: Option<CampaignId>, event: LifecycleEvent) {
        if let Some(campaign_id) = campaign_id {
            if let Some(sender) = self.campaign_channels.get(&campaign_id) {
                let _ = sender.send(event.clone()); // 无订阅者不是错误
            }
        }
        if let Err(e) = self.global_channel.send(event) {
            tracing::trace!(error = %e, "No global event subscribers");
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_campaign_scoped_subscription() {
        let publisher = EventPublisher::new();
        let campaign_id = CampaignId::new();
        let mut rx = publisher.subscribe_campaign(campaign_id);

        publisher.publish_campaign_status(campaign_id, "running");
        // 其他活动的事件不会进入此通道
        publisher.publish_campaign_status(CampaignId::new(), "running");

        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event,
            LifecycleEvent::CampaignStatusChanged { campaign_id: id, .. } if id == campaign_id
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_global_sees_everything() {
        let publisher = EventPublisher::new();
        let mut rx = publisher.subscribe_global();

        publisher.publish_session_started(SessionId::new(), None);
        publisher.publish_session_ended(SessionId::new(), None, SessionOutcome::Completed);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }
}
