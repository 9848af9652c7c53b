//! TTS Adapters - 语音合成客户端

mod http_tts_client;
mod sim_tts_client;

pub use http_tts_client::{HttpTtsClient, HttpTtsClientConfig};
pub use sim_tts_client::{SimTtsClient, SimTtsClientConfig};
