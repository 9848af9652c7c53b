//! Sim STT Client - 用于测试的语音识别客户端
//!
//! 按序返回脚本化转写，不实际调用识别服务

use async_trait::async_trait;
use futures_util::stream;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::application::ports::{
    ProviderError, SttPort, TranscriptPart, TranscriptStream, Utterance,
};

/// Sim STT 客户端配置
#[derive(Debug, Clone)]
pub struct SimSttClientConfig {
    /// 脚本耗尽后的兜底转写
    pub fallback_text: String,
    /// 模拟识别延迟（毫秒）
    pub latency_ms: u64,
}

impl Default for SimSttClientConfig {
    fn default() -> Self {
        Self {
            fallback_text: "hello".to_string(),
            latency_ms: 5,
        }
    }
}

/// Sim STT 客户端
pub struct SimSttClient {
    config: SimSttClientConfig,
    /// 待消费的脚本化转写（每次 transcribe 消费一条）
    scripted: Mutex<VecDeque<Result<String, ProviderError>>>,
}

impl SimSttClient {
    pub fn new(config: SimSttClientConfig) -> Self {
        Self {
            config,
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SimSttClientConfig::default())
    }

    /// 追加脚本化转写
    pub fn push_transcript(&self, text: impl Into<String>) {
        self.scripted
            .lock()
            .unwrap()
            .push_back(Ok(text.into()));
    }

    /// 追加脚本化错误（测试重试路径）
    pub fn push_error(&self, error: ProviderError) {
        self.scripted.lock().unwrap().push_back(Err(error));
    }
}

#[async_trait]
impl SttPort for SimSttClient {
    async fn transcribe(&self, utterance: Utterance) -> Result<TranscriptStream, ProviderError> {
        tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;

        let next = self.scripted.lock().unwrap().pop_front();
        let text = match next {
            Some(Ok(text)) => text,
            Some(Err(error)) => return Err(error),
            None => self.config.fallback_text.clone(),
        };

        tracing::debug!(
            samples = utterance.total_samples(),
            text = %text,
            "SimSttClient: returning scripted transcript"
        );

        Ok(Box::pin(stream::iter([Ok(TranscriptPart {
            text,
            is_final: true,
        })])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::AudioFrame;
    use futures_util::StreamExt;

    fn utterance() -> Utterance {
        Utterance {
            frames: vec![AudioFrame::silence(320)],
            sample_rate: 16_000,
            language: "en-US".to_string(),
        }
    }

    #[tokio::test]
    async fn test_scripted_then_fallback() {
        let stt = SimSttClient::with_defaults();
        stt.push_transcript("first");

        let mut stream = stt.transcribe(utterance()).await.unwrap();
        let part = stream.next().await.unwrap().unwrap();
        assert_eq!(part.text, "first");
        assert!(part.is_final);

        let mut stream = stt.transcribe(utterance()).await.unwrap();
        let part = stream.next().await.unwrap().unwrap();
        assert_eq!(part.text, "hello");
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let stt = SimSttClient::with_defaults();
        stt.push_error(ProviderError::Timeout);
        assert!(matches!(
            stt.transcribe(utterance()).await,
            Err(ProviderError::Timeout)
        ));
    }
}
