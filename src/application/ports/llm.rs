//! LLM Port - 语言模型抽象
//!
//! 定义流式补全的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::session::Speaker;

use super::provider::ProviderError;

/// 对话历史中的一条消息
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// 一次补全请求的完整上下文
#[derive(Debug, Clone)]
pub struct ConversationContext {
    /// 系统指令（来自 agent 画像）
    pub instructions: String,
    /// 既往轮次，时间序
    pub history: Vec<ChatTurn>,
    /// 回复语言
    pub language: String,
}

/// 补全片段
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionChunk {
    /// 增量文本
    pub text: String,
    /// 是否为最后一个片段
    pub is_final: bool,
}

/// 补全流
pub type CompletionStream = BoxStream<'static, Result<CompletionChunk, ProviderError>>;

/// LLM Port
///
/// 外部语言模型服务的抽象接口
#[async_trait]
pub trait LlmPort: Send + Sync {
    /// 提交转写与历史，流式返回补全
    async fn complete(&self, context: ConversationContext)
        -> Result<CompletionStream, ProviderError>;

    /// 检查服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
