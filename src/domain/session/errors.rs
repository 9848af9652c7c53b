//! Session Context - Domain Errors

use thiserror::Error;

use super::{PipelineState, SessionOutcome};

/// Session 领域错误
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("invalid pipeline transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: PipelineState,
        to: PipelineState,
    },

    #[error("session already ended with outcome {0:?}")]
    AlreadyEnded(SessionOutcome),

    #[error("session has not reached a terminal state")]
    NotTerminal,
}
