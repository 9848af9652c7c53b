//! Campaign Context - Aggregate Root

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    CampaignError, CampaignId, CampaignStatus, Contact, ContactId, RetryPolicy,
};

/// Campaign 聚合根
///
/// 不变量:
/// - 联系人列表非空且有序，创建后不增删
/// - 状态迁移只经由聚合方法，终态后不可变更
/// - 并发上限 >= 1，由 Dispatcher 负责执行期约束
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    id: CampaignId,
    name: String,
    contacts: Vec<Contact>,
    concurrency_cap: usize,
    retry_policy: RetryPolicy,
    status: CampaignStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Campaign {
    /// 创建新活动
    pub fn new(
        name: impl Into<String>,
        contacts: Vec<Contact>,
        concurrency_cap: usize,
        retry_policy: RetryPolicy,
    ) -> Result<Self, CampaignError> {
        if contacts.is_empty() {
            return Err(CampaignError::EmptyContactList);
        }
        if concurrency_cap == 0 {
            return Err(CampaignError::InvalidConcurrencyCap);
        }
        retry_policy
            .validate()
            .map_err(CampaignError::InvalidRetryPolicy)?;

        let now = Utc::now();
        Ok(Self {
            id: CampaignId::new(),
            name: name.into(),
            contacts,
            concurrency_cap,
            retry_policy,
            status: CampaignStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// 从持久化快照重建（仅供仓储层使用，不做校验）
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: CampaignId,
        name: String,
        contacts: Vec<Contact>,
        concurrency_cap: usize,
        retry_policy: RetryPolicy,
        status: CampaignStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            contacts,
            concurrency_cap,
            retry_policy,
            status,
            created_at,
            updated_at,
        }
    }

    fn transition(&mut self, to: CampaignStatus) -> Result<(), CampaignError> {
        use CampaignStatus::*;

        if self.status.is_terminal() {
            return Err(CampaignError::Terminal);
        }
        let legal = matches!(
            (self.status, to),
            (Pending, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Pending, Cancelled)
                | (Running, Cancelled)
                | (Paused, Cancelled)
                | (Paused, Failed)
        );
        if !legal {
            return Err(CampaignError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 开始调度
    pub fn start(&mut self) -> Result<(), CampaignError> {
        self.transition(CampaignStatus::Running)
    }

    /// 暂停：停止新呼叫，不影响在途会话
    pub fn pause(&mut self) -> Result<(), CampaignError> {
        self.transition(CampaignStatus::Paused)
    }

    /// 恢复调度
    pub fn resume(&mut self) -> Result<(), CampaignError> {
        self.transition(CampaignStatus::Running)
    }

    /// 全部联系人终结后收尾
    pub fn complete(&mut self) -> Result<(), CampaignError> {
        self.transition(CampaignStatus::Completed)
    }

    /// 取消：未拨联系人标记为 cancelled
    pub fn cancel(&mut self) -> Result<(), CampaignError> {
        self.transition(CampaignStatus::Cancelled)?;
        for contact in &mut self.contacts {
            if !contact.disposition().is_resolved() {
                contact.mark_cancelled();
            }
        }
        Ok(())
    }

    /// 活动级失败
    pub fn fail(&mut self) -> Result<(), CampaignError> {
        self.transition(CampaignStatus::Failed)
    }

    /// 是否所有联系人都已终结
    pub fn all_contacts_resolved(&self) -> bool {
        self.contacts.iter().all(|c| c.disposition().is_resolved())
    }

    pub fn contact(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id() == id)
    }

    pub fn contact_mut(&mut self, id: ContactId) -> Result<&mut Contact, CampaignError> {
        self.contacts
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or(CampaignError::ContactNotFound(id))
    }

    // Getters
    pub fn id(&self) -> CampaignId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn concurrency_cap(&self) -> usize {
        self.concurrency_cap
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn status(&self) -> CampaignStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::campaign::PhoneNumber;

    fn campaign(cap: usize) -> Campaign {
        let contacts = vec![
            Contact::new(PhoneNumber::new("+919148227303").unwrap()),
            Contact::new(PhoneNumber::new("+912271264303").unwrap()),
        ];
        Campaign::new("test", contacts, cap, RetryPolicy::default()).unwrap()
    }

    #[test]
    fn test_campaign_creation_validation() {
        assert!(matches!(
            Campaign::new("empty", vec![], 1, RetryPolicy::default()),
            Err(CampaignError::EmptyContactList)
        ));
        let contacts = vec![Contact::new(PhoneNumber::new("+919148227303").unwrap())];
        assert!(matches!(
            Campaign::new("zero-cap", contacts, 0, RetryPolicy::default()),
            Err(CampaignError::InvalidConcurrencyCap)
        ));
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut campaign = campaign(1);
        assert_eq!(campaign.status(), CampaignStatus::Pending);

        campaign.start().unwrap();
        campaign.pause().unwrap();
        campaign.resume().unwrap();
        campaign.complete().unwrap();

        // Completed 之后不可变更
        assert!(matches!(campaign.resume(), Err(CampaignError::Terminal)));
    }

    #[test]
    fn test_illegal_transition() {
        let mut campaign = campaign(1);
        // Pending -> Paused 不合法
        assert!(matches!(
            campaign.pause(),
            Err(CampaignError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cancel_marks_unresolved_contacts() {
        let mut campaign = campaign(2);
        campaign.start().unwrap();

        let first = campaign.contacts()[0].id();
        campaign.contact_mut(first).unwrap().begin_attempt();
        campaign.contact_mut(first).unwrap().mark_completed();

        campaign.cancel().unwrap();

        let contacts = campaign.contacts();
        assert!(contacts[0].disposition().is_resolved());
        assert_eq!(
            *contacts[1].disposition(),
            crate::domain::campaign::ContactDisposition::Cancelled
        );
    }

    #[test]
    fn test_all_contacts_resolved() {
        let mut campaign = campaign(2);
        assert!(!campaign.all_contacts_resolved());

        let ids: Vec<_> = campaign.contacts().iter().map(|c| c.id()).collect();
        for id in ids {
            campaign.contact_mut(id).unwrap().mark_completed();
        }
        assert!(campaign.all_contacts_resolved());
    }
}
