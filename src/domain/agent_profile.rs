//! Agent Profile - 两个上下文共享的 agent 画像
//!
//! 描述一次通话中 AI agent 的行为：系统指令、开场白、音色。
//! 由活动配置或入站路由配置提供，Session 创建时固定。

use serde::{Deserialize, Serialize};

/// Agent 画像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// 语言模型的系统指令
    pub instructions: String,
    /// 接通后由 agent 先说的开场白；为空则等待来电方先开口
    pub first_message: Option<String>,
    /// 合成音色 id（具体含义由 TTS 提供商解释）
    pub voice_id: String,
    /// 会话语言（BCP-47）
    pub language: String,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            instructions: "You are a helpful voice assistant. Be concise: your replies \
                           are spoken aloud."
                .to_string(),
            first_message: None,
            voice_id: "default".to_string(),
            language: "en-US".to_string(),
        }
    }
}

impl AgentProfile {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.instructions.is_empty() {
            return Err("agent instructions cannot be empty");
        }
        if self.voice_id.is_empty() {
            return Err("voice_id cannot be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_valid() {
        assert!(AgentProfile::default().validate().is_ok());
    }

    #[test]
    fn test_empty_instructions_rejected() {
        let profile = AgentProfile {
            instructions: String::new(),
            ..Default::default()
        };
        assert!(profile.validate().is_err());
    }
}
