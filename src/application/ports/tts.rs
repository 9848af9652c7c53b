//! TTS Port - 语音合成抽象
//!
//! 定义流式合成的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::provider::ProviderError;
use super::telephony::AudioFrame;

/// 合成请求
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    /// 要合成的文本
    pub text: String,
    /// 音色 id（具体含义由提供商解释）
    pub voice_id: String,
    /// 目标采样率（Hz）
    pub sample_rate: u32,
}

/// 合成音频帧流
pub type SynthesisStream = BoxStream<'static, Result<AudioFrame, ProviderError>>;

/// TTS Port
///
/// 外部语音合成服务的抽象接口
#[async_trait]
pub trait TtsPort: Send + Sync {
    /// 流式合成，帧大小与采样率须与通话媒体一致
    async fn synthesize(&self, request: SpeechRequest) -> Result<SynthesisStream, ProviderError>;

    /// 检查服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
