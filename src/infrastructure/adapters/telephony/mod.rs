//! Telephony Adapters - 电话网关实现

mod http_gateway;
mod sim_gateway;

pub use http_gateway::{HttpGatewayConfig, HttpTelephonyGateway};
pub use sim_gateway::{SimCallDriver, SimDialOutcome, SimGatewayConfig, SimTelephonyGateway};
