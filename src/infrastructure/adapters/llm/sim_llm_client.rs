//! Sim LLM Client - 用于测试的语言模型客户端
//!
//! 返回脚本化回复，按词切片、带节奏地流式吐出，
//! 便于测试打断与取消路径

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::application::ports::{
    CompletionChunk, CompletionStream, ConversationContext, LlmPort, ProviderError,
};

/// Sim LLM 客户端配置
#[derive(Debug, Clone)]
pub struct SimLlmClientConfig {
    /// 脚本耗尽后的兜底回复
    pub fallback_reply: String,
    /// 相邻片段之间的间隔（毫秒）
    pub chunk_delay_ms: u64,
}

impl Default for SimLlmClientConfig {
    fn default() -> Self {
        Self {
            fallback_reply: "Thanks for calling, goodbye.".to_string(),
            chunk_delay_ms: 2,
        }
    }
}

/// Sim LLM 客户端
pub struct SimLlmClient {
    config: SimLlmClientConfig,
    /// 待消费的脚本化回复
    scripted: Mutex<VecDeque<Result<String, ProviderError>>>,
}

impl SimLlmClient {
    pub fn new(config: SimLlmClientConfig) -> Self {
        Self {
            config,
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SimLlmClientConfig::default())
    }

    /// 追加脚本化回复
    pub fn push_reply(&self, text: impl Into<String>) {
        self.scripted.lock().unwrap().push_back(Ok(text.into()));
    }

    /// 追加脚本化错误（测试重试路径）
    pub fn push_error(&self, error: ProviderError) {
        self.scripted.lock().unwrap().push_back(Err(error));
    }
}

#[async_trait]
impl LlmPort for SimLlmClient {
    async fn complete(
        &self,
        context: ConversationContext,
    ) -> Result<CompletionStream, ProviderError> {
        let next = self.scripted.lock().unwrap().pop_front();
        let reply = match next {
            Some(Ok(text)) => text,
            Some(Err(error)) => return Err(error),
            None => self.config.fallback_reply.clone(),
        };

        tracing::debug!(
            history_len = context.history.len(),
            reply = %reply,
            "SimLlmClient: streaming scripted reply"
        );

        // 按词切片，最后一片带 is_final
        let words: Vec<String> = reply.split_whitespace().map(String::from).collect();
        let total = words.len().max(1);
        let delay = Duration::from_millis(self.config.chunk_delay_ms);

        let stream = futures_util::stream::unfold(
            (words.into_iter().enumerate(), total, delay),
            |(mut words, total, delay)| async move {
                let (index, word) = words.next()?;
                tokio::time::sleep(delay).await;
                let chunk = CompletionChunk {
                    text: if index == 0 { word } else { format!(" {}", word) },
                    is_final: index + 1 == total,
                };
                Some((Ok(chunk), (words, total, delay)))
            },
        );

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn context() -> ConversationContext {
        ConversationContext {
            instructions: "be brief".to_string(),
            history: Vec::new(),
            language: "en-US".to_string(),
        }
    }

    #[tokio::test]
    async fn test_reply_streamed_by_word() {
        let llm = SimLlmClient::with_defaults();
        llm.push_reply("one two three");

        let stream = llm.complete(context()).await.unwrap();
        let chunks: Vec<CompletionChunk> = stream.map(|c| c.unwrap()).collect().await;

        let text: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(text, "one two three");
        assert!(chunks.last().unwrap().is_final);
        assert!(chunks[..chunks.len() - 1].iter().all(|c| !c.is_final));
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let llm = SimLlmClient::with_defaults();
        llm.push_error(ProviderError::Service {
            status: 503,
            message: "overloaded".to_string(),
        });
        assert!(llm.complete(context()).await.is_err());
    }
}
