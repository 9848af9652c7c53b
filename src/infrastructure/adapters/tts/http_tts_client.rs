//! HTTP TTS Client - 调用外部语音合成服务
//!
//! 实现 TtsPort trait，取回 PCM 并按通话帧大小切片
//!
//! 外部 TTS API:
//! POST {base}/api/tts/synthesize
//! Request: {"text": "...", "voice_id": "...", "sample_rate": 16000}  (JSON)
//! Response: audio/pcm binary (LE i16), metadata in headers

use async_trait::async_trait;
use futures_util::stream;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::application::ports::{
    AudioFrame, ProviderError, SpeechRequest, SynthesisStream, TtsPort,
};

/// 合成请求体 (JSON)
#[derive(Debug, Serialize)]
struct SynthesizeHttpRequest {
    text: String,
    voice_id: String,
    sample_rate: u32,
}

/// HTTP TTS 客户端配置
#[derive(Debug, Clone)]
pub struct HttpTtsClientConfig {
    /// TTS 服务基础 URL
    pub base_url: String,
    /// 每帧采样数（与通话媒体一致）
    pub frame_samples: usize,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpTtsClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8003".to_string(),
            frame_samples: 320,
            timeout_secs: 30,
        }
    }
}

/// HTTP TTS 客户端
pub struct HttpTtsClient {
    client: Client,
    config: HttpTtsClientConfig,
}

impl HttpTtsClient {
    /// 创建新的 HTTP TTS 客户端
    pub fn new(config: HttpTtsClientConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn synthesize_url(&self) -> String {
        format!("{}/api/tts/synthesize", self.config.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url)
    }
}

#[async_trait]
impl TtsPort for HttpTtsClient {
    async fn synthesize(&self, request: SpeechRequest) -> Result<SynthesisStream, ProviderError> {
        let body = SynthesizeHttpRequest {
            text: request.text.clone(),
            voice_id: request.voice_id.clone(),
            sample_rate: request.sample_rate,
        };

        tracing::debug!(
            url = %self.synthesize_url(),
            text_len = request.text.len(),
            voice_id = %request.voice_id,
            "Sending synthesis request"
        );

        let response = self
            .client
            .post(self.synthesize_url())
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

        let pcm = response
            .bytes()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to read audio: {}", e)))?;

        if pcm.len() % 2 != 0 {
            return Err(ProviderError::InvalidResponse(
                "odd PCM byte length".to_string(),
            ));
        }

        let samples: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        tracing::debug!(
            samples = samples.len(),
            voice_id = %request.voice_id,
            "Synthesis completed"
        );

        // 按通话帧大小切片；尾帧补静音到定长
        let frame_samples = self.config.frame_samples;
        let frames: Vec<Result<AudioFrame, ProviderError>> = samples
            .chunks(frame_samples)
            .map(|chunk| {
                let mut frame = chunk.to_vec();
                frame.resize(frame_samples, 0);
                Ok(AudioFrame::new(frame))
            })
            .collect();

        Ok(Box::pin(stream::iter(frames)))
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
        let config = HttpTtsClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8003");
        assert_eq!(config.frame_samples, 320);
    }
}
