//! Sim Telephony Gateway - 进程内仿真网关
//!
//! 按号码脚本化拨号结果，媒体帧走内存通道；
//! 用于测试与无真实线路的演练运行。

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AudioFrame, CallHandle, DialError, InboundSignal, PlaceCallRequest, TelephonyPort,
};
use crate::domain::session::CallId;

/// 单次拨号的脚本化结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimDialOutcome {
    /// 接通
    Answer,
    Busy,
    NoAnswer,
    InvalidNumber,
    ProviderUnavailable,
}

/// Sim 网关配置
#[derive(Debug, Clone)]
pub struct SimGatewayConfig {
    /// 媒体采样率（Hz）
    pub sample_rate: u32,
    /// 每帧采样数
    pub frame_samples: usize,
    /// 接通前的信令延迟（毫秒）
    pub answer_delay_ms: u64,
}

impl Default for SimGatewayConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_samples: 320,
            answer_delay_ms: 5,
        }
    }
}

/// 测试侧通话驱动
///
/// 注入来电方音频、观察播放帧、模拟挂断
pub struct SimCallDriver {
    pub call_id: CallId,
    /// 注入来电方音频帧
    pub caller_tx: mpsc::Sender<AudioFrame>,
    /// 观察播放给来电方的帧
    pub played_rx: mpsc::Receiver<AudioFrame>,
    /// 触发即模拟来电方挂断
    pub hangup: CancellationToken,
}

struct SimActiveCall {
    driver: Option<SimCallDriver>,
    hangup: CancellationToken,
}

/// 仿真电话网关
pub struct SimTelephonyGateway {
    config: SimGatewayConfig,
    /// phone -> 待消费的脚本结果队列
    scripts: DashMap<String, VecDeque<SimDialOutcome>>,
    /// 在途通话
    calls: DashMap<CallId, SimActiveCall>,
    /// call_id -> terminate 调用次数（测试断言释放恰好一次）
    terminations: DashMap<CallId, Arc<AtomicU32>>,
}

impl SimTelephonyGateway {
    pub fn new(config: SimGatewayConfig) -> Self {
        Self {
            config,
            scripts: DashMap::new(),
            calls: DashMap::new(),
            terminations: DashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SimGatewayConfig::default())
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 为号码设置脚本化拨号结果（按序消费，耗尽后默认接通）
    pub fn script(&self, phone: &str, outcomes: Vec<SimDialOutcome>) {
        self.scripts
            .insert(phone.to_string(), outcomes.into_iter().collect());
    }

    /// 取出测试侧驱动（每通电话只能取一次）
    pub fn take_driver(&self, call_id: &CallId) -> Option<SimCallDriver> {
        self.calls
            .get_mut(call_id)
            .and_then(|mut call| call.driver.take())
    }

    /// terminate 被调用的次数
    pub fn terminate_count(&self, call_id: &CallId) -> u32 {
        self.terminations
            .get(call_id)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// 在途通话数
    pub fn active_calls(&self) -> usize {
        self.calls.len()
    }

    fn next_outcome(&self, phone: &str) -> SimDialOutcome {
        self.scripts
            .get_mut(phone)
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(SimDialOutcome::Answer)
    }

    fn open_call(&self) -> CallHandle {
        let call_id = CallId::new();
        let (caller_tx, caller_rx) = mpsc::channel(1024);
        let (played_tx, played_rx) = mpsc::channel(1024);
        let hangup = CancellationToken::new();

        let driver = SimCallDriver {
            call_id,
            caller_tx,
            played_rx,
            hangup: hangup.clone(),
        };
        self.calls.insert(
            call_id,
            SimActiveCall {
                driver: Some(driver),
                hangup: hangup.clone(),
            },
        );
        self.terminations
            .insert(call_id, Arc::new(AtomicU32::new(0)));

        CallHandle {
            call_id,
            caller_audio: caller_rx,
            playback: played_tx,
            hangup,
            sample_rate: self.config.sample_rate,
            frame_samples: self.config.frame_samples,
        }
    }
}

#[async_trait]
impl TelephonyPort for SimTelephonyGateway {
    async fn place_call(&self, request: PlaceCallRequest) -> Result<CallHandle, DialError> {
        // 模拟信令往返
        tokio::time::sleep(tokio::time::Duration::from_millis(
            self.config.answer_delay_ms,
        ))
        .await;

        let phone = request.phone.as_str();
        match self.next_outcome(phone) {
            SimDialOutcome::Answer => {
                let handle = self.open_call();
                tracing::debug!(
                    call_id = %handle.call_id,
                    phone = %phone,
                    "Sim call answered"
                );
                Ok(handle)
            }
            SimDialOutcome::Busy => Err(DialError::Busy),
            SimDialOutcome::NoAnswer => Err(DialError::NoAnswer),
            SimDialOutcome::InvalidNumber => Err(DialError::InvalidNumber(phone.to_string())),
            SimDialOutcome::ProviderUnavailable => {
                Err(DialError::ProviderUnavailable("sim outage".to_string()))
            }
        }
    }

    async fn accept_inbound(&self, signal: InboundSignal) -> Result<CallHandle, DialError> {
        let handle = self.open_call();
        tracing::debug!(
            call_id = %handle.call_id,
            call_ref = %signal.call_ref,
            "Sim inbound accepted"
        );
        Ok(handle)
    }

    async fn terminate(&self, call_id: &CallId) {
        if let Some(counter) = self.terminations.get(call_id) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        // 幂等：重复终止只是 no-op
        if let Some((_, call)) = self.calls.remove(call_id) {
            call.hangup.cancel();
            tracing::debug!(call_id = %call_id, "Sim call terminated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::campaign::PhoneNumber;

    fn request(phone: &str) -> PlaceCallRequest {
        PlaceCallRequest::new(PhoneNumber::new(phone).unwrap())
    }

    #[tokio::test]
    async fn test_scripted_outcomes_consumed_in_order() {
        let gateway = SimTelephonyGateway::with_defaults();
        gateway.script(
            "+919148227303",
            vec![SimDialOutcome::Busy, SimDialOutcome::Answer],
        );

        let first = gateway.place_call(request("+919148227303")).await;
        assert!(matches!(first, Err(DialError::Busy)));

        let second = gateway.place_call(request("+919148227303")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let gateway = SimTelephonyGateway::with_defaults();
        let handle = gateway.place_call(request("+919148227303")).await.unwrap();
        let call_id = handle.call_id;

        gateway.terminate(&call_id).await;
        gateway.terminate(&call_id).await;

        assert_eq!(gateway.active_calls(), 0);
        assert_eq!(gateway.terminate_count(&call_id), 2);
        assert!(handle.hangup.is_cancelled());
    }

    #[tokio::test]
    async fn test_driver_frame_loopback() {
        let gateway = SimTelephonyGateway::with_defaults();
        let mut handle = gateway.place_call(request("+919148227303")).await.unwrap();
        let mut driver = gateway.take_driver(&handle.call_id).unwrap();

        // 来电方 -> 管线
        driver
            .caller_tx
            .send(AudioFrame::new(vec![42; 320]))
            .await
            .unwrap();
        let frame = handle.caller_audio.recv().await.unwrap();
        assert_eq!(frame.samples[0], 42);

        // 管线 -> 来电方
        handle.playback.send(AudioFrame::silence(320)).await.unwrap();
        let played = driver.played_rx.recv().await.unwrap();
        assert_eq!(played.samples.len(), 320);

        // 驱动只能取一次
        assert!(gateway.take_driver(&handle.call_id).is_none());
    }
}
