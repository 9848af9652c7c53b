//! HTTP STT Client - 调用外部语音识别服务
//!
//! 实现 SttPort trait，通过 HTTP 提交 PCM 并取回转写
//!
//! 外部 STT API:
//! POST {base}/api/stt/transcribe?model=...&language=...
//! Request: audio/pcm binary (LE i16)
//! Response: {"text": "..."} (JSON)

use async_trait::async_trait;
use futures_util::stream;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::application::ports::{
    ProviderError, SttPort, TranscriptPart, TranscriptStream, Utterance,
};

/// 转写响应 (JSON)
#[derive(Debug, Deserialize)]
struct TranscribeHttpResponse {
    text: String,
}

/// HTTP STT 客户端配置
#[derive(Debug, Clone)]
pub struct HttpSttClientConfig {
    /// STT 服务基础 URL
    pub base_url: String,
    /// 识别模型
    pub model: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpSttClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            model: "whisper-1".to_string(),
            timeout_secs: 30,
        }
    }
}

/// HTTP STT 客户端
pub struct HttpSttClient {
    client: Client,
    config: HttpSttClientConfig,
}

impl HttpSttClient {
    /// 创建新的 HTTP STT 客户端
    pub fn new(config: HttpSttClientConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn transcribe_url(&self, language: &str) -> String {
        format!(
            "{}/api/stt/transcribe?model={}&language={}",
            self.config.base_url, self.config.model, language
        )
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url)
    }
}

fn map_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl SttPort for HttpSttClient {
    async fn transcribe(&self, utterance: Utterance) -> Result<TranscriptStream, ProviderError> {
        let mut pcm = Vec::with_capacity(utterance.total_samples() * 2);
        for frame in &utterance.frames {
            pcm.extend_from_slice(&frame.to_le_bytes());
        }

        tracing::debug!(
            url = %self.transcribe_url(&utterance.language),
            samples = utterance.total_samples(),
            "Sending transcription request"
        );

        let response = self
            .client
            .post(self.transcribe_url(&utterance.language))
            .header("Content-Type", "audio/pcm")
            .header("X-Sample-Rate", utterance.sample_rate)
            .body(pcm)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let body: TranscribeHttpResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        tracing::debug!(text_len = body.text.len(), "Transcription completed");

        // 定稿转写作为单元素流返回
        Ok(Box::pin(stream::iter([Ok(TranscriptPart {
            text: body.text,
            is_final: true,
        })])))
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
    fn test_transcribe_url() {
        let client = HttpSttClient::new(HttpSttClientConfig::default()).unwrap();
        assert_eq!(
            client.transcribe_url("en-US"),
            "http://localhost:8001/api/stt/transcribe?model=whisper-1&language=en-US"
        );
    }
}
