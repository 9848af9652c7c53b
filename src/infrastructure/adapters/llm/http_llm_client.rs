//! HTTP LLM Client - 调用外部语言模型服务
//!
//! 实现 LlmPort trait，流式读取 NDJSON 补全
//!
//! 外部 LLM API:
//! POST {base}/api/llm/complete
//! Request: {"model": "...", "instructions": "...", "messages": [...]}  (JSON)
//! Response: NDJSON 行流，每行 {"delta": "...", "done": false}

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::application::ports::{
    CompletionChunk, CompletionStream, ConversationContext, LlmPort, ProviderError,
};
use crate::domain::session::Speaker;

/// 补全请求体 (JSON)
#[derive(Debug, Serialize)]
struct CompleteHttpRequest {
    model: String,
    instructions: String,
    messages: Vec<HttpChatMessage>,
    max_tokens: u32,
    language: String,
}

#[derive(Debug, Serialize)]
struct HttpChatMessage {
    role: &'static str,
    content: String,
}

/// 流中的一行 (NDJSON)
#[derive(Debug, Deserialize)]
struct CompletionLine {
    #[serde(default)]
    delta: String,
    #[serde(default)]
    done: bool,
}

/// 行缓冲状态
struct LineState {
    bytes: futures_util::stream::BoxStream<'static, Result<Vec<u8>, ProviderError>>,
    buffer: String,
    ready: VecDeque<Result<CompletionChunk, ProviderError>>,
    done: bool,
}

fn parse_line(line: &str) -> Result<CompletionChunk, ProviderError> {
    serde_json::from_str::<CompletionLine>(line)
        .map(|parsed| CompletionChunk {
            text: parsed.delta,
            is_final: parsed.done,
        })
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

/// HTTP LLM 客户端配置
#[derive(Debug, Clone)]
pub struct HttpLlmClientConfig {
    /// LLM 服务基础 URL
    pub base_url: String,
    /// 生成模型
    pub model: String,
    /// 最大生成 token 数
    pub max_tokens: u32,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpLlmClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 256,
            timeout_secs: 30,
        }
    }
}

/// HTTP LLM 客户端
pub struct HttpLlmClient {
    client: Client,
    config: HttpLlmClientConfig,
}

impl HttpLlmClient {
    /// 创建新的 HTTP LLM 客户端
    pub fn new(config: HttpLlmClientConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn complete_url(&self) -> String {
        format!("{}/api/llm/complete", self.config.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url)
    }
}

#[async_trait]
impl LlmPort for HttpLlmClient {
    async fn complete(
        &self,
        context: ConversationContext,
    ) -> Result<CompletionStream, ProviderError> {
        let messages = context
            .history
            .iter()
            .map(|turn| HttpChatMessage {
                role: match turn.speaker {
                    Speaker::Caller => "user",
                    Speaker::Agent => "assistant",
                },
                content: turn.text.clone(),
            })
            .collect();

        let body = CompleteHttpRequest {
            model: self.config.model.clone(),
            instructions: context.instructions.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            language: context.language.clone(),
        };

        tracing::debug!(
            url = %self.complete_url(),
            history_len = context.history.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(self.complete_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Service {
                status: status.as_u16(),
                message,
            });
        }

        // 把字节流按行缓冲成 NDJSON（一行可能跨多个网络分片）
        let byte_stream = response.bytes_stream().map(|result| {
            result.map(|chunk| chunk.to_vec()).map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Network(e.to_string())
                }
            })
        });
        let chunk_stream = futures_util::stream::unfold(
            LineState {
                bytes: Box::pin(byte_stream),
                buffer: String::new(),
                ready: VecDeque::new(),
                done: false,
            },
            |mut state| async move {
                loop {
                    if let Some(item) = state.ready.pop_front() {
                        return Some((item, state));
                    }
                    if state.done {
                        return None;
                    }
                    match state.bytes.next().await {
                        Some(Ok(chunk)) => {
                            state.buffer.push_str(&String::from_utf8_lossy(&chunk));
                            while let Some(pos) = state.buffer.find('\n') {
                                let line = state.buffer[..pos].trim().to_string();
                                state.buffer.drain(..=pos);
                                if !line.is_empty() {
                                    state.ready.push_back(parse_line(&line));
                                }
                            }
                        }
                        Some(Err(e)) => {
                            state.ready.push_back(Err(e));
                            state.done = true;
                        }
                        None => {
                            let tail = state.buffer.trim().to_string();
                            if !tail.is_empty() {
                                state.ready.push_back(parse_line(&tail));
                            }
                            state.buffer.clear();
                            state.done = true;
                        }
                    }
                }
            },
        );

        Ok(Box::pin(chunk_stream))
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = HttpLlmClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8002");
        assert_eq!(config.max_tokens, 256);
    }

    #[test]
    fn test_completion_line_parsing() {
        let line: CompletionLine = serde_json::from_str(r#"{"delta": "Hi", "done": false}"#).unwrap();
        assert_eq!(line.delta, "Hi");
        assert!(!line.done);

        let line: CompletionLine = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert_eq!(line.delta, "");
        assert!(line.done);
    }
}
