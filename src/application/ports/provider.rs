//! Provider Port 共享类型
//!
//! 三个 AI 提供商端口（STT/LLM/TTS）共用的错误分类。
//! 瞬时错误（超时、网络、5xx）由管线按退避策略重试；
//! 致命错误直接升级为会话终态。

use thiserror::Error;

/// 提供商错误
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timeout")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("service error (HTTP {status}): {message}")]
    Service { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request cancelled")]
    Cancelled,
}

impl ProviderError {
    /// 是否为瞬时错误（可按退避策略重试）
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout | ProviderError::Network(_) => true,
            ProviderError::Service { status, .. } => *status >= 500,
            ProviderError::InvalidResponse(_) | ProviderError::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Timeout.is_transient());
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::Service {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(!ProviderError::Service {
            status: 401,
            message: "unauthorized".into()
        }
        .is_transient());
        assert!(!ProviderError::InvalidResponse("bad json".into()).is_transient());
        assert!(!ProviderError::Cancelled.is_transient());
    }
}
