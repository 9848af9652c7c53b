//! In-Memory Session Registry Implementation

use dashmap::DashMap;
use std::sync::Arc;

use crate::application::ports::{ActiveSession, RegistryError, SessionRegistryPort};
use crate::domain::campaign::CampaignId;
use crate::domain::session::SessionId;

/// 内存会话登记表
pub struct InMemorySessionRegistry {
    sessions: DashMap<SessionId, ActiveSession>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for InMemorySessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistryPort for InMemorySessionRegistry {
    fn register(&self, session: ActiveSession) -> Result<(), RegistryError> {
        let session_id = session.session_id;
        if self.sessions.contains_key(&session_id) {
            return Err(RegistryError::AlreadyRegistered(session_id));
        }
        self.sessions.insert(session_id, session);
        tracing::debug!(session_id = %session_id, "Session registered");
        Ok(())
    }

    fn remove(&self, id: &SessionId) -> Option<ActiveSession> {
        self.sessions.remove(id).map(|(_, session)| {
            tracing::debug!(session_id = %id, "Session removed from registry");
            session
        })
    }

    fn force_end(&self, id: &SessionId) -> bool {
        match self.sessions.get(id) {
            Some(session) => {
                session.cancel.cancel();
                tracing::info!(session_id = %id, "Session force-end signalled");
                true
            }
            None => false,
        }
    }

    fn force_end_campaign(&self, campaign_id: CampaignId) -> usize {
        let mut count = 0;
        for entry in self.sessions.iter() {
            if entry.campaign_id == Some(campaign_id) {
                entry.cancel.cancel();
                count += 1;
            }
        }
        if count > 0 {
            tracing::info!(
                campaign_id = %campaign_id,
                count = count,
                "Campaign sessions force-end signalled"
            );
        }
        count
    }

    fn is_active(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    fn active_count(&self) -> usize {
        self.sessions.len()
    }

    fn list_all(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::campaign::AttemptId;
    use crate::domain::session::CallId;
    use tokio_util::sync::CancellationToken;

    fn active(campaign_id: Option<CampaignId>) -> ActiveSession {
        ActiveSession::new(
            SessionId::new(),
            CallId::new(),
            campaign_id,
            Some(AttemptId::new()),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_register_and_remove() {
        let registry = InMemorySessionRegistry::new();
        let session = active(None);
        let id = session.session_id;

        registry.register(session).unwrap();
        assert!(registry.is_active(&id));
        assert_eq!(registry.active_count(), 1);

        let removed = registry.remove(&id);
        assert!(removed.is_some());
        assert!(!registry.is_active(&id));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = InMemorySessionRegistry::new();
        let session = active(None);
        let dup = session.clone();

        registry.register(session).unwrap();
        assert!(matches!(
            registry.register(dup),
            Err(RegistryError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_force_end_cancels_token() {
        let registry = InMemorySessionRegistry::new();
        let session = active(None);
        let id = session.session_id;
        let token = session.cancel.clone();

        registry.register(session).unwrap();
        assert!(!token.is_cancelled());
        assert!(registry.force_end(&id));
        assert!(token.is_cancelled());

        // 未登记的会话
        assert!(!registry.force_end(&SessionId::new()));
    }

    #[test]
    fn test_force_end_campaign_scoped() {
        let registry = InMemorySessionRegistry::new();
        let campaign_id = CampaignId::new();

        let in_campaign = active(Some(campaign_id));
        let other = active(Some(CampaignId::new()));
        let inbound = active(None);

        let in_token = in_campaign.cancel.clone();
        let other_token = other.cancel.clone();
        let inbound_token = inbound.cancel.clone();

        registry.register(in_campaign).unwrap();
        registry.register(other).unwrap();
        registry.register(inbound).unwrap();

        assert_eq!(registry.force_end_campaign(campaign_id), 1);
        assert!(in_token.is_cancelled());
        assert!(!other_token.is_cancelled());
        assert!(!inbound_token.is_cancelled());
    }
}
