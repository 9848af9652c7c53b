//! Infrastructure Adapters - 外部服务适配器

pub mod factory;
pub mod llm;
pub mod recording;
pub mod stt;
pub mod telephony;
pub mod tts;

pub use factory::{build_llm, build_stt, build_telephony, build_tts, FactoryError};
pub use llm::{HttpLlmClient, HttpLlmClientConfig, SimLlmClient, SimLlmClientConfig};
pub use recording::FileRecordingSink;
pub use stt::{HttpSttClient, HttpSttClientConfig, SimSttClient, SimSttClientConfig};
pub use telephony::{
    HttpGatewayConfig, HttpTelephonyGateway, SimCallDriver, SimDialOutcome, SimGatewayConfig,
    SimTelephonyGateway,
};
pub use tts::{HttpTtsClient, HttpTtsClientConfig, SimTtsClient, SimTtsClientConfig};
