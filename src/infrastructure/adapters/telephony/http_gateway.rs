//! HTTP Telephony Gateway - 外部媒体房间服务集成
//!
//! 信令走 REST（发起/应答/终止），媒体走服务返回的 PCM 桥接
//! 端口（定长帧的 TCP 流）。上游电话服务自行对接 SIP trunk。
//!
//! 外部信令 API:
//! POST {base}/api/calls            发起呼出
//! POST {base}/api/inbound/accept   应答入站
//! DELETE {base}/api/calls/{id}     终止
//! Response: {"call_id": "...", "outcome": "answered", "media_addr": "host:port"}

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use dashmap::DashMap;
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::{
    AudioFrame, CallHandle, DialError, InboundSignal, PlaceCallRequest, TelephonyPort,
};
use crate::domain::session::CallId;

/// 呼出请求体 (JSON)
#[derive(Debug, Serialize)]
struct PlaceCallHttpRequest {
    phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    caller_id: Option<String>,
    metadata: HashMap<String, String>,
    sample_rate: u32,
    frame_samples: usize,
}

/// 应答请求体 (JSON)
#[derive(Debug, Serialize)]
struct AcceptInboundHttpRequest {
    call_ref: String,
    sample_rate: u32,
    frame_samples: usize,
}

/// 信令响应 (JSON)
#[derive(Debug, Deserialize)]
struct CallHttpResponse {
    call_id: String,
    outcome: String,
    media_addr: Option<String>,
}

/// HTTP 网关配置
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// 信令服务基础 URL
    pub base_url: String,
    /// 信令请求超时时间（秒）
    pub timeout_secs: u64,
    /// 媒体采样率（Hz）
    pub sample_rate: u32,
    /// 每帧采样数
    pub frame_samples: usize,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7880".to_string(),
            timeout_secs: 30,
            sample_rate: 16_000,
            frame_samples: 320,
        }
    }
}

struct ActiveMedia {
    /// 终止媒体泵任务
    stop: CancellationToken,
}

/// HTTP 电话网关
pub struct HttpTelephonyGateway {
    client: Client,
    config: HttpGatewayConfig,
    calls: DashMap<CallId, ActiveMedia>,
}

impl HttpTelephonyGateway {
    /// 创建新的 HTTP 网关
    pub fn new(config: HttpGatewayConfig) -> Result<Self, DialError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DialError::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            config,
            calls: DashMap::new(),
        })
    }

    fn calls_url(&self) -> String {
        format!("{}/api/calls", self.config.base_url)
    }

    fn accept_url(&self) -> String {
        format!("{}/api/inbound/accept", self.config.base_url)
    }

    fn terminate_url(&self, call_id: &CallId) -> String {
        format!("{}/api/calls/{}", self.config.base_url, call_id)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url)
    }

    /// 解析信令响应并接通媒体桥
    async fn open_media(&self, response: CallHttpResponse) -> Result<CallHandle, DialError> {
        match response.outcome.as_str() {
            "answered" => {}
            "busy" => return Err(DialError::Busy),
            "no_answer" => return Err(DialError::NoAnswer),
            "invalid_number" => return Err(DialError::InvalidNumber(response.call_id)),
            other => {
                return Err(DialError::ProviderUnavailable(format!(
                    "unexpected outcome: {}",
                    other
                )))
            }
        }

        let call_id = Uuid::parse_str(&response.call_id)
            .map(CallId::from_uuid)
            .map_err(|e| DialError::ProviderUnavailable(format!("bad call id: {}", e)))?;
        let media_addr = response.media_addr.ok_or_else(|| {
            DialError::ProviderUnavailable("answered call without media_addr".to_string())
        })?;

        let stream = TcpStream::connect(&media_addr)
            .await
            .map_err(|e| DialError::ProviderUnavailable(format!("media connect: {}", e)))?;
        let (mut read_half, mut write_half) = stream.into_split();

        let (caller_tx, caller_rx) = mpsc::channel::<AudioFrame>(1024);
        let (playback_tx, mut playback_rx) = mpsc::channel::<AudioFrame>(1024);
        let hangup = CancellationToken::new();
        let stop = CancellationToken::new();

        let frame_bytes = self.config.frame_samples * 2;

        // 读泵：媒体桥 -> 管线；EOF/错误视为挂断
        let read_hangup = hangup.clone();
        let read_stop = stop.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; frame_bytes];
            loop {
                tokio::select! {
                    _ = read_stop.cancelled() => break,
                    result = read_half.read_exact(&mut buf) => {
                        if result.is_err() {
                            read_hangup.cancel();
                            break;
                        }
                        let samples = buf
                            .chunks_exact(2)
                            .map(|b| i16::from_le_bytes([b[0], b[1]]))
                            .collect();
                        if caller_tx.send(AudioFrame::new(samples)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // 写泵：管线 -> 媒体桥
        let write_stop = stop.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = write_stop.cancelled() => break,
                    frame = playback_rx.recv() => {
                        let Some(frame) = frame else { break };
                        if write_half.write_all(&frame.to_le_bytes()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        self.calls.insert(call_id, ActiveMedia { stop });

        Ok(CallHandle {
            call_id,
            caller_audio: caller_rx,
            playback: playback_tx,
            hangup,
            sample_rate: self.config.sample_rate,
            frame_samples: self.config.frame_samples,
        })
    }

    async fn post_signal<T: Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<CallHttpResponse, DialError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DialError::NoAnswer
                } else {
                    DialError::ProviderUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DialError::ProviderUnavailable(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        response
            .json::<CallHttpResponse>()
            .await
            .map_err(|e| DialError::ProviderUnavailable(format!("bad response: {}", e)))
    }
}

#[async_trait]
impl TelephonyPort for HttpTelephonyGateway {
    async fn place_call(&self, request: PlaceCallRequest) -> Result<CallHandle, DialError> {
        let body = PlaceCallHttpRequest {
            phone_number: request.phone.as_str().to_string(),
            caller_id: request.caller_id.clone(),
            metadata: request.metadata.clone(),
            sample_rate: self.config.sample_rate,
            frame_samples: self.config.frame_samples,
        };

        tracing::debug!(
            url = %self.calls_url(),
            phone = %request.phone,
            "Placing outbound call"
        );

        let response = self.post_signal(&self.calls_url(), &body).await?;
        let handle = self.open_media(response).await?;

        tracing::info!(
            call_id = %handle.call_id,
            phone = %request.phone,
            "Outbound call answered"
        );
        Ok(handle)
    }

    async fn accept_inbound(&self, signal: InboundSignal) -> Result<CallHandle, DialError> {
        let body = AcceptInboundHttpRequest {
            call_ref: signal.call_ref.clone(),
            sample_rate: self.config.sample_rate,
            frame_samples: self.config.frame_samples,
        };

        let response = self.post_signal(&self.accept_url(), &body).await?;
        let handle = self.open_media(response).await?;

        tracing::info!(
            call_id = %handle.call_id,
            call_ref = %signal.call_ref,
            "Inbound call accepted"
        );
        Ok(handle)
    }

    async fn terminate(&self, call_id: &CallId) {
        // 幂等：只有首次移除时才发远端终止
        let Some((_, media)) = self.calls.remove(call_id) else {
            return;
        };
        media.stop.cancel();

        if let Err(e) = self
            .client
            .delete(self.terminate_url(call_id))
            .send()
            .await
        {
            // 远端失败不重试：媒体泵已停，上游会按超时回收
            tracing::warn!(call_id = %call_id, error = %e, "Remote terminate failed");
        } else {
            tracing::debug!(call_id = %call_id, "Call terminated");
        }
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
