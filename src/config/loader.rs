//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `VOXDIAL_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `VOXDIAL_TELEPHONY__GATEWAY_URL=http://media-room:7880`
/// - `VOXDIAL_DISPATCHER__GLOBAL_MAX_CONCURRENT=20`
/// - `VOXDIAL_PIPELINE__SILENCE_MS=500`
/// - `VOXDIAL_DATABASE__PATH=/data/voxdial.db`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 首先设置默认值（最低优先级）
    builder = builder
        .set_default("telephony.vendor", "sim")?
        .set_default("telephony.gateway_url", "http://localhost:7880")?
        .set_default("telephony.timeout_secs", 30)?
        .set_default("telephony.sample_rate", 16_000)?
        .set_default("telephony.frame_samples", 320)?
        .set_default("stt.vendor", "sim")?
        .set_default("stt.url", "http://localhost:8001")?
        .set_default("stt.model", "whisper-1")?
        .set_default("stt.language", "en-US")?
        .set_default("stt.timeout_secs", 30)?
        .set_default("llm.vendor", "sim")?
        .set_default("llm.url", "http://localhost:8002")?
        .set_default("llm.model", "gpt-4o-mini")?
        .set_default("llm.max_tokens", 256)?
        .set_default("llm.timeout_secs", 30)?
        .set_default("tts.vendor", "sim")?
        .set_default("tts.url", "http://localhost:8003")?
        .set_default("tts.voice_id", "alloy")?
        .set_default("tts.timeout_secs", 30)?
        .set_default("pipeline.silence_ms", 700)?
        .set_default("pipeline.barge_in_rms", 1_500.0)?
        .set_default("pipeline.stage_timeout_secs", 15)?
        .set_default("pipeline.provider_max_retries", 2)?
        .set_default("pipeline.provider_backoff_ms", 500)?
        .set_default("pipeline.idle_timeout_secs", 30)?
        .set_default("dispatcher.global_max_concurrent", 10)?
        .set_default("dispatcher.control_capacity", 1_000)?
        .set_default("dispatcher.retry_jitter_ms", 250)?
        .set_default("inbound.enabled", false)?
        .set_default("database.path", "data/voxdial.db")?
        .set_default("database.max_connections", 5)?
        .set_default("ledger.path", "data/ledger.sled")?
        .set_default("recording.enabled", true)?
        .set_default("recording.dir", "data/recordings")?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 添加配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        // 搜索默认配置文件
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 添加环境变量（最高优先级）
    // 前缀: VOXDIAL_
    // 层级分隔符: __ (双下划线)
    // 例如: VOXDIAL_TELEPHONY__GATEWAY_URL=http://media-room:7880
    builder = builder.add_source(
        Environment::with_prefix("VOXDIAL")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    // 4. 构建配置
    let config = builder.build()?;

    // 5. 反序列化为 AppConfig
    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::ParseError(format!("Failed to deserialize config: {}", e)))?;

    // 6. 验证配置
    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.telephony.gateway_url.is_empty() {
        return Err(ConfigError::ValidationError(
            "Telephony gateway URL cannot be empty".to_string(),
        ));
    }

    if config.telephony.sample_rate == 0 {
        return Err(ConfigError::ValidationError(
            "Sample rate cannot be 0".to_string(),
        ));
    }

    if config.telephony.frame_samples == 0 {
        return Err(ConfigError::ValidationError(
            "Frame size cannot be 0".to_string(),
        ));
    }

    if config.pipeline.silence_ms == 0 {
        return Err(ConfigError::ValidationError(
            "Silence threshold cannot be 0".to_string(),
        ));
    }

    if config.pipeline.barge_in_rms <= 0.0 {
        return Err(ConfigError::ValidationError(
            "Barge-in RMS threshold must be positive".to_string(),
        ));
    }

    if config.pipeline.stage_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Stage timeout cannot be 0".to_string(),
        ));
    }

    if config.dispatcher.global_max_concurrent == 0 {
        return Err(ConfigError::ValidationError(
            "Global concurrency bound cannot be 0".to_string(),
        ));
    }

    if config.database.path.is_empty() {
        return Err(ConfigError::ValidationError(
            "Database path cannot be empty".to_string(),
        ));
    }

    if config.ledger.path.is_empty() {
        return Err(ConfigError::ValidationError(
            "Ledger path cannot be empty".to_string(),
        ));
    }

    if config.inbound.enabled {
        config.inbound.agent.validate().map_err(|e| {
            ConfigError::ValidationError(format!("Inbound agent profile invalid: {}", e))
        })?;
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Telephony: {:?} @ {}", config.telephony.vendor, config.telephony.gateway_url);
    tracing::info!(
        "Media: {} Hz, {} samples/frame",
        config.telephony.sample_rate,
        config.telephony.frame_samples
    );
    tracing::info!("STT: {:?} ({})", config.stt.vendor, config.stt.model);
    tracing::info!("LLM: {:?} ({})", config.llm.vendor, config.llm.model);
    tracing::info!("TTS: {:?} (voice {})", config.tts.vendor, config.tts.voice_id);
    tracing::info!(
        "Pipeline: silence {}ms, barge-in RMS {}, stage timeout {}s, idle timeout {}s",
        config.pipeline.silence_ms,
        config.pipeline.barge_in_rms,
        config.pipeline.stage_timeout_secs,
        config.pipeline.idle_timeout_secs
    );
    tracing::info!(
        "Dispatcher: global cap {}, retry jitter {}ms",
        config.dispatcher.global_max_concurrent,
        config.dispatcher.retry_jitter_ms
    );
    tracing::info!("Inbound: enabled={}", config.inbound.enabled);
    tracing::info!("Database: {}", config.database.path);
    tracing::info!("Ledger: {}", config.ledger.path);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_sample_rate() {
        let mut config = AppConfig::default();
        config.telephony.sample_rate = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_global_cap() {
        let mut config = AppConfig::default();
        config.dispatcher.global_max_concurrent = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_ledger_path() {
        let mut config = AppConfig::default();
        config.ledger.path = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_bad_inbound_profile() {
        let mut config = AppConfig::default();
        config.inbound.enabled = true;
        config.inbound.agent.instructions = String::new();
        assert!(validate_config(&config).is_err());
    }
}
