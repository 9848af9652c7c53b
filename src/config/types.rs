//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::AgentProfile;

/// 应用主配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// 电话网关配置
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// 语音识别配置
    #[serde(default)]
    pub stt: SttConfig,

    /// 语言模型配置
    #[serde(default)]
    pub llm: LlmConfig,

    /// 语音合成配置
    #[serde(default)]
    pub tts: TtsConfig,

    /// 管线配置
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// 调度器配置
    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    /// 入站路由配置
    #[serde(default)]
    pub inbound: InboundConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 账本配置
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// 录音外发配置
    #[serde(default)]
    pub recording: RecordingConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telephony: TelephonyConfig::default(),
            stt: SttConfig::default(),
            llm: LlmConfig::default(),
            tts: TtsConfig::default(),
            pipeline: PipelineSettings::default(),
            dispatcher: DispatcherSettings::default(),
            inbound: InboundConfig::default(),
            database: DatabaseConfig::default(),
            ledger: LedgerConfig::default(),
            recording: RecordingConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// 电话网关实现选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelephonyVendor {
    /// 外部媒体房间服务（HTTP 信令）
    Http,
    /// 进程内仿真网关（测试/演练）
    Sim,
}

/// 电话网关配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelephonyConfig {
    /// 网关实现
    #[serde(default = "default_telephony_vendor")]
    pub vendor: TelephonyVendor,

    /// 信令服务基础 URL
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// 信令请求超时时间（秒）
    #[serde(default = "default_signal_timeout")]
    pub timeout_secs: u64,

    /// 主叫显示号码
    #[serde(default)]
    pub caller_id: Option<String>,

    /// 媒体采样率（Hz）
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// 每帧采样数（16kHz 下 320 = 20ms）
    #[serde(default = "default_frame_samples")]
    pub frame_samples: usize,
}

fn default_telephony_vendor() -> TelephonyVendor {
    TelephonyVendor::Sim
}

fn default_gateway_url() -> String {
    "http://localhost:7880".to_string()
}

fn default_signal_timeout() -> u64 {
    30
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_frame_samples() -> usize {
    320
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            vendor: default_telephony_vendor(),
            gateway_url: default_gateway_url(),
            timeout_secs: default_signal_timeout(),
            caller_id: None,
            sample_rate: default_sample_rate(),
            frame_samples: default_frame_samples(),
        }
    }
}

/// STT 提供商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SttVendor {
    OpenAi,
    Deepgram,
    Sim,
}

/// 语音识别配置
#[derive(Debug, Clone, Deserialize)]
pub struct SttConfig {
    /// 提供商
    #[serde(default = "default_stt_vendor")]
    pub vendor: SttVendor,

    /// 服务基础 URL
    #[serde(default = "default_stt_url")]
    pub url: String,

    /// 识别模型
    #[serde(default = "default_stt_model")]
    pub model: String,

    /// 识别语言（BCP-47）
    #[serde(default = "default_language")]
    pub language: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_stt_vendor() -> SttVendor {
    SttVendor::Sim
}

fn default_stt_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            vendor: default_stt_vendor(),
            url: default_stt_url(),
            model: default_stt_model(),
            language: default_language(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

/// LLM 提供商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmVendor {
    OpenAi,
    Anthropic,
    Sim,
}

/// 语言模型配置
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// 提供商
    #[serde(default = "default_llm_vendor")]
    pub vendor: LlmVendor,

    /// 服务基础 URL
    #[serde(default = "default_llm_url")]
    pub url: String,

    /// 生成模型
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// 最大生成 token 数
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// 请求超时时间（秒）
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_vendor() -> LlmVendor {
    LlmVendor::Sim
}

fn default_llm_url() -> String {
    "http://localhost:8002".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    256
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            vendor: default_llm_vendor(),
            url: default_llm_url(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

/// TTS 提供商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsVendor {
    OpenAi,
    ElevenLabs,
    Sim,
}

/// 语音合成配置
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    /// 提供商
    #[serde(default = "default_tts_vendor")]
    pub vendor: TtsVendor,

    /// 服务基础 URL
    #[serde(default = "default_tts_url")]
    pub url: String,

    /// 默认音色 id（可被 agent 画像覆盖）
    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_tts_vendor() -> TtsVendor {
    TtsVendor::Sim
}

fn default_tts_url() -> String {
    "http://localhost:8003".to_string()
}

fn default_voice_id() -> String {
    "alloy".to_string()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            vendor: default_tts_vendor(),
            url: default_tts_url(),
            voice_id: default_voice_id(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

/// 管线配置
///
/// 静音阈值与打断能量阈值是策略常量，只通过配置暴露，
/// 不在使用点硬编码
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// 判定话音结束的静音时长（毫秒）
    #[serde(default = "default_silence_ms")]
    pub silence_ms: u64,

    /// 打断检测的 RMS 能量阈值（i16 采样）
    #[serde(default = "default_barge_in_rms")]
    pub barge_in_rms: f64,

    /// 单个管线阶段的超时时间（秒），超时按瞬时错误处理
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    /// 单次提供商调用的最大重试次数
    #[serde(default = "default_provider_max_retries")]
    pub provider_max_retries: u32,

    /// 提供商重试退避基准（毫秒）
    #[serde(default = "default_provider_backoff_ms")]
    pub provider_backoff_ms: u64,

    /// 会话空闲超时（秒），双方均无活动则终止
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_silence_ms() -> u64 {
    700
}

fn default_barge_in_rms() -> f64 {
    1_500.0
}

fn default_stage_timeout() -> u64 {
    15
}

fn default_provider_max_retries() -> u32 {
    2
}

fn default_provider_backoff_ms() -> u64 {
    500
}

fn default_idle_timeout() -> u64 {
    30
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            silence_ms: default_silence_ms(),
            barge_in_rms: default_barge_in_rms(),
            stage_timeout_secs: default_stage_timeout(),
            provider_max_retries: default_provider_max_retries(),
            provider_backoff_ms: default_provider_backoff_ms(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

/// 调度器配置
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherSettings {
    /// 跨活动全局并发上限（保护上游电话/提供商限额）
    #[serde(default = "default_global_max_concurrent")]
    pub global_max_concurrent: usize,

    /// 控制通道容量
    #[serde(default = "default_control_capacity")]
    pub control_capacity: usize,

    /// 重试退避抖动上限（毫秒）
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,
}

fn default_global_max_concurrent() -> usize {
    10
}

fn default_control_capacity() -> usize {
    1_000
}

fn default_retry_jitter_ms() -> u64 {
    250
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            global_max_concurrent: default_global_max_concurrent(),
            control_capacity: default_control_capacity(),
            retry_jitter_ms: default_retry_jitter_ms(),
        }
    }
}

/// 入站路由配置
#[derive(Debug, Clone, Deserialize)]
pub struct InboundConfig {
    /// 是否接听入站呼叫
    #[serde(default)]
    pub enabled: bool,

    /// 入站会话使用的 agent 画像
    #[serde(default)]
    pub agent: AgentProfile,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            agent: AgentProfile::default(),
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/voxdial.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// 获取数据库 URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path)
    }
}

/// 账本配置
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// 账本存储路径
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

fn default_ledger_path() -> String {
    "data/ledger.sled".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// 录音外发配置
#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    /// 是否外发每轮录音
    #[serde(default = "default_recording_enabled")]
    pub enabled: bool,

    /// 外发目录（文件型 sink）
    #[serde(default = "default_recording_dir")]
    pub dir: PathBuf,
}

fn default_recording_enabled() -> bool {
    true
}

fn default_recording_dir() -> PathBuf {
    PathBuf::from("data/recordings")
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: default_recording_enabled(),
            dir: default_recording_dir(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.telephony.sample_rate, 16_000);
        assert_eq!(config.telephony.frame_samples, 320);
        assert_eq!(config.pipeline.silence_ms, 700);
        assert_eq!(config.dispatcher.global_max_concurrent, 10);
        assert_eq!(config.database.path, "data/voxdial.db");
        assert_eq!(config.stt.vendor, SttVendor::Sim);
    }

    #[test]
    fn test_database_url() {
        let config = DatabaseConfig::default();
        assert_eq!(config.database_url(), "sqlite:data/voxdial.db?mode=rwc");
    }
}
