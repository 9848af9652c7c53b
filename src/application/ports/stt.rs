//! STT Port - 语音识别抽象
//!
//! 定义流式语音识别的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::provider::ProviderError;
use super::telephony::AudioFrame;

/// 待转写的一段话音
#[derive(Debug, Clone)]
pub struct Utterance {
    /// 缓冲的音频帧
    pub frames: Vec<AudioFrame>,
    /// 采样率（Hz）
    pub sample_rate: u32,
    /// 语言（BCP-47）
    pub language: String,
}

impl Utterance {
    /// 总采样数
    pub fn total_samples(&self) -> usize {
        self.frames.iter().map(|f| f.samples.len()).sum()
    }

    /// 是否为空（无任何采样）
    pub fn is_empty(&self) -> bool {
        self.total_samples() == 0
    }
}

/// 转写片段
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptPart {
    /// 片段文本
    pub text: String,
    /// 是否为定稿（is_final 之后流结束）
    pub is_final: bool,
}

/// 转写结果流
pub type TranscriptStream = BoxStream<'static, Result<TranscriptPart, ProviderError>>;

/// STT Port
///
/// 外部语音识别服务的抽象接口
#[async_trait]
pub trait SttPort: Send + Sync {
    /// 提交一段话音，返回部分转写结果流
    async fn transcribe(&self, utterance: Utterance) -> Result<TranscriptStream, ProviderError>;

    /// 检查服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
