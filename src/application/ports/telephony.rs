//! Telephony Gateway Port - 电话信令与媒体抽象
//!
//! 定义呼出/呼入信令及媒体帧流的抽象接口，具体实现在 infrastructure/adapters 层。
//! 上游电话/媒体服务（SIP trunk、媒体房间）位于核心范围之外。

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::campaign::PhoneNumber;
use crate::domain::session::CallId;

/// 拨号错误
///
/// Dispatcher 依据变体判断重试资格
#[derive(Debug, Error)]
pub enum DialError {
    #[error("line busy")]
    Busy,

    #[error("no answer")]
    NoAnswer,

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("telephony provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl DialError {
    /// 是否允许重试
    ///
    /// busy / no-answer / provider-unavailable 可重试；invalid-number 永久失败
    pub fn retryable(&self) -> bool {
        !matches!(self, DialError::InvalidNumber(_))
    }
}

/// 媒体错误
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media handle lost: {0}")]
    HandleLost(CallId),

    #[error("frame stream closed unexpectedly")]
    StreamClosed,
}

/// 固定大小的 PCM 音频帧（单声道 i16）
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// PCM 采样
    pub samples: Vec<i16>,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// 静音帧
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![0; len],
        }
    }

    /// 均方根能量（打断/静音检测用）
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let s = s as f64;
                s * s
            })
            .sum();
        (sum / self.samples.len() as f64).sqrt()
    }

    /// 序列化为小端字节（录音边界用）
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

/// 呼出请求
#[derive(Debug, Clone)]
pub struct PlaceCallRequest {
    /// 被叫号码
    pub phone: PhoneNumber,
    /// 主叫显示号码
    pub caller_id: Option<String>,
    /// 随呼叫传递的自定义变量
    pub metadata: HashMap<String, String>,
}

impl PlaceCallRequest {
    pub fn new(phone: PhoneNumber) -> Self {
        Self {
            phone,
            caller_id: None,
            metadata: HashMap::new(),
        }
    }
}

/// 入站呼叫信令
#[derive(Debug, Clone)]
pub struct InboundSignal {
    /// 上游信令引用（trunk/room 标识）
    pub call_ref: String,
    /// 主叫号码（若上游提供）
    pub from: Option<PhoneNumber>,
}

/// 通话句柄
///
/// 由恰好一个 Session 在其生命周期内独占持有；
/// 句柄释放 = 调用 `TelephonyPort::terminate`（幂等）。
pub struct CallHandle {
    /// 通话标识
    pub call_id: CallId,
    /// 来电方音频帧流
    pub caller_audio: mpsc::Receiver<AudioFrame>,
    /// 播放给来电方的帧发送端
    pub playback: mpsc::Sender<AudioFrame>,
    /// 挂断信号（上游挂断时触发）
    pub hangup: CancellationToken,
    /// 采样率（Hz）
    pub sample_rate: u32,
    /// 每帧采样数
    pub frame_samples: usize,
}

impl std::fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandle")
            .field("call_id", &self.call_id)
            .field("sample_rate", &self.sample_rate)
            .field("frame_samples", &self.frame_samples)
            .finish()
    }
}

/// Telephony Gateway Port
///
/// 外部电话/媒体服务的抽象接口
#[async_trait]
pub trait TelephonyPort: Send + Sync {
    /// 发起呼出，接通后返回媒体句柄
    async fn place_call(&self, request: PlaceCallRequest) -> Result<CallHandle, DialError>;

    /// 应答入站呼叫
    async fn accept_inbound(&self, signal: InboundSignal) -> Result<CallHandle, DialError>;

    /// 终止通话
    ///
    /// 幂等：对已终止/未知的通话调用是 no-op，不是错误
    async fn terminate(&self, call_id: &CallId);

    /// 检查上游服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_error_retry_classification() {
        assert!(DialError::Busy.retryable());
        assert!(DialError::NoAnswer.retryable());
        assert!(DialError::ProviderUnavailable("down".into()).retryable());
        assert!(!DialError::InvalidNumber("+0".into()).retryable());
    }

    #[test]
    fn test_frame_rms() {
        assert_eq!(AudioFrame::silence(160).rms(), 0.0);
        let loud = AudioFrame::new(vec![10_000; 160]);
        assert!((loud.rms() - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_frame_le_bytes() {
        let frame = AudioFrame::new(vec![1, -1]);
        assert_eq!(frame.to_le_bytes(), vec![0x01, 0x00, 0xFF, 0xFF]);
    }
}
