//! Campaign Context - Domain Errors

use thiserror::Error;

use super::{CampaignStatus, ContactId};

/// Campaign 领域错误
#[derive(Debug, Error, PartialEq)]
pub enum CampaignError {
    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },

    #[error("campaign must have at least one contact")]
    EmptyContactList,

    #[error("concurrency cap must be at least 1")]
    InvalidConcurrencyCap,

    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(&'static str),

    #[error("contact not found: {0}")]
    ContactNotFound(ContactId),

    #[error("campaign is terminal and immutable")]
    Terminal,
}
