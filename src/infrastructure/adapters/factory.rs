//! Provider Factory - 按配置装配提供商适配器
//!
//! 提供商多态在构造期一次性解析（配置变体 -> 具体适配器），
//! 运行期只面对端口 trait，不做类型探测。
//! OpenAI/Deepgram/ElevenLabs 走同一套 HTTP 网关协议，
//! 差异（模型、音色、路径约定）由网关侧配置消化。

use std::sync::Arc;

use crate::application::ports::{LlmPort, SttPort, TelephonyPort, TtsPort};
use crate::config::{
    AppConfig, LlmVendor, SttVendor, TelephonyVendor, TtsVendor,
};

use super::llm::{HttpLlmClient, HttpLlmClientConfig, SimLlmClient};
use super::stt::{HttpSttClient, HttpSttClientConfig, SimSttClient};
use super::telephony::{
    HttpGatewayConfig, HttpTelephonyGateway, SimGatewayConfig, SimTelephonyGateway,
};
use super::tts::{HttpTtsClient, HttpTtsClientConfig, SimTtsClient};

/// Factory 错误
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("failed to build telephony gateway: {0}")]
    Telephony(String),

    #[error("failed to build provider client: {0}")]
    Provider(String),
}

/// 构建电话网关
pub fn build_telephony(config: &AppConfig) -> Result<Arc<dyn TelephonyPort>, FactoryError> {
    match config.telephony.vendor {
        TelephonyVendor::Http => {
            let gateway = HttpTelephonyGateway::new(HttpGatewayConfig {
                base_url: config.telephony.gateway_url.clone(),
                timeout_secs: config.telephony.timeout_secs,
                sample_rate: config.telephony.sample_rate,
                frame_samples: config.telephony.frame_samples,
            })
            .map_err(|e| FactoryError::Telephony(e.to_string()))?;
            Ok(Arc::new(gateway))
        }
        TelephonyVendor::Sim => Ok(Arc::new(SimTelephonyGateway::new(SimGatewayConfig {
            sample_rate: config.telephony.sample_rate,
            frame_samples: config.telephony.frame_samples,
            ..SimGatewayConfig::default()
        }))),
    }
}

/// 构建语音识别客户端
pub fn build_stt(config: &AppConfig) -> Result<Arc<dyn SttPort>, FactoryError> {
    match config.stt.vendor {
        SttVendor::OpenAi | SttVendor::Deepgram => {
            let client = HttpSttClient::new(HttpSttClientConfig {
                base_url: config.stt.url.clone(),
                model: config.stt.model.clone(),
                timeout_secs: config.stt.timeout_secs,
            })
            .map_err(|e| FactoryError::Provider(e.to_string()))?;
            Ok(Arc::new(client))
        }
        SttVendor::Sim => Ok(Arc::new(SimSttClient::with_defaults())),
    }
}

/// 构建语言模型客户端
pub fn build_llm(config: &AppConfig) -> Result<Arc<dyn LlmPort>, FactoryError> {
    match config.llm.vendor {
        LlmVendor::OpenAi | LlmVendor::Anthropic => {
            let client = HttpLlmClient::new(HttpLlmClientConfig {
                base_url: config.llm.url.clone(),
                model: config.llm.model.clone(),
                max_tokens: config.llm.max_tokens,
                timeout_secs: config.llm.timeout_secs,
            })
            .map_err(|e| FactoryError::Provider(e.to_string()))?;
            Ok(Arc::new(client))
        }
        LlmVendor::Sim => Ok(Arc::new(SimLlmClient::with_defaults())),
    }
}

/// 构建语音合成客户端
pub fn build_tts(config: &AppConfig) -> Result<Arc<dyn TtsPort>, FactoryError> {
    match config.tts.vendor {
        TtsVendor::OpenAi | TtsVendor::ElevenLabs => {
            let client = HttpTtsClient::new(HttpTtsClientConfig {
                base_url: config.tts.url.clone(),
                frame_samples: config.telephony.frame_samples,
                timeout_secs: config.tts.timeout_secs,
            })
            .map_err(|e| FactoryError::Provider(e.to_string()))?;
            Ok(Arc::new(client))
        }
        TtsVendor::Sim => Ok(Arc::new(SimTtsClient::with_defaults())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_stack_builds() {
        let config = AppConfig::default();
        assert!(build_telephony(&config).is_ok());
        assert!(build_stt(&config).is_ok());
        assert!(build_llm(&config).is_ok());
        assert!(build_tts(&config).is_ok());
    }

    #[test]
    fn test_http_stack_builds() {
        let mut config = AppConfig::default();
        config.telephony.vendor = TelephonyVendor::Http;
        config.stt.vendor = SttVendor::Deepgram;
        config.llm.vendor = LlmVendor::OpenAi;
        config.tts.vendor = TtsVendor::ElevenLabs;

        assert!(build_telephony(&config).is_ok());
        assert!(build_stt(&config).is_ok());
        assert!(build_llm(&config).is_ok());
        assert!(build_tts(&config).is_ok());
    }
}
