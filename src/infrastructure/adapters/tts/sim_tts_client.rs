//! Sim TTS Client - 用于测试的语音合成客户端
//!
//! 生成恒定振幅的 PCM 帧，带节奏地流式吐出，
//! 帧数与文本长度成正比，便于测试打断时机

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::application::ports::{
    AudioFrame, ProviderError, SpeechRequest, SynthesisStream, TtsPort,
};

/// Sim TTS 客户端配置
#[derive(Debug, Clone)]
pub struct SimTtsClientConfig {
    /// 每帧采样数
    pub frame_samples: usize,
    /// 每个词合成的帧数
    pub frames_per_word: usize,
    /// 合成帧振幅
    pub amplitude: i16,
    /// 相邻帧之间的间隔（毫秒）
    pub frame_delay_ms: u64,
}

impl Default for SimTtsClientConfig {
    fn default() -> Self {
        Self {
            frame_samples: 320,
            frames_per_word: 2,
            amplitude: 4_000,
            frame_delay_ms: 2,
        }
    }
}

/// Sim TTS 客户端
pub struct SimTtsClient {
    config: SimTtsClientConfig,
    /// 脚本化错误（耗尽后正常合成）
    scripted_errors: Mutex<VecDeque<ProviderError>>,
}

impl SimTtsClient {
    pub fn new(config: SimTtsClientConfig) -> Self {
        Self {
            config,
            scripted_errors: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SimTtsClientConfig::default())
    }

    /// 追加脚本化错误（测试重试路径）
    pub fn push_error(&self, error: ProviderError) {
        self.scripted_errors.lock().unwrap().push_back(error);
    }
}

#[async_trait]
impl TtsPort for SimTtsClient {
    async fn synthesize(&self, request: SpeechRequest) -> Result<SynthesisStream, ProviderError> {
        if let Some(error) = self.scripted_errors.lock().unwrap().pop_front() {
            return Err(error);
        }

        let words = request.text.split_whitespace().count().max(1);
        let total_frames = words * self.config.frames_per_word;
        let frame_samples = self.config.frame_samples;
        let amplitude = self.config.amplitude;
        let delay = Duration::from_millis(self.config.frame_delay_ms);

        tracing::debug!(
            text_len = request.text.len(),
            voice_id = %request.voice_id,
            total_frames = total_frames,
            "SimTtsClient: streaming synthetic frames"
        );

        let stream = futures_util::stream::unfold(0usize, move |emitted| async move {
            if emitted >= total_frames {
                return None;
            }
            tokio::time::sleep(delay).await;
            let frame = AudioFrame::new(vec![amplitude; frame_samples]);
            Some((Ok(frame), emitted + 1))
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_frame_count_scales_with_words() {
        let tts = SimTtsClient::with_defaults();
        let stream = tts
            .synthesize(SpeechRequest {
                text: "three word reply".to_string(),
                voice_id: "sim".to_string(),
                sample_rate: 16_000,
            })
            .await
            .unwrap();

        let frames: Vec<_> = stream.collect().await;
        assert_eq!(frames.len(), 6); // 3 词 * 2 帧
        assert!(frames.iter().all(|f| f.is_ok()));
    }

    #[tokio::test]
    async fn test_scripted_error_then_success() {
        let tts = SimTtsClient::with_defaults();
        tts.push_error(ProviderError::Timeout);

        let request = SpeechRequest {
            text: "hi".to_string(),
            voice_id: "sim".to_string(),
            sample_rate: 16_000,
        };
        assert!(matches!(
            tts.synthesize(request.clone()).await,
            Err(ProviderError::Timeout)
        ));
        assert!(tts.synthesize(request).await.is_ok());
    }
}
