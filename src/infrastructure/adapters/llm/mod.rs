//! LLM Adapters - 语言模型客户端

mod http_llm_client;
mod sim_llm_client;

pub use http_llm_client::{HttpLlmClient, HttpLlmClientConfig};
pub use sim_llm_client::{SimLlmClient, SimLlmClientConfig};
