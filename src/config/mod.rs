//! Configuration - 配置模块

mod loader;
mod types;

pub use loader::{load_config, load_config_from_path, print_config, ConfigError};
pub use types::{
    AppConfig, DatabaseConfig, DispatcherSettings, InboundConfig, LedgerConfig, LlmConfig,
    LlmVendor, LogConfig, PipelineSettings, RecordingConfig, SttConfig, SttVendor,
    TelephonyConfig, TelephonyVendor, TtsConfig, TtsVendor,
};
