//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod ledger;
mod llm;
mod provider;
mod recording;
mod repositories;
mod session_registry;
mod stt;
mod telephony;
mod tts;

pub use ledger::{EventKind, LedgerError, LedgerEvent, LedgerPort, LedgerScope};
pub use llm::{ChatTurn, CompletionChunk, CompletionStream, ConversationContext, LlmPort};
pub use provider::ProviderError;
pub use recording::{RecordingError, RecordingSinkPort, TurnRecording};
pub use repositories::{AttemptRepositoryPort, CampaignRepositoryPort, RepositoryError};
pub use session_registry::{ActiveSession, RegistryError, SessionRegistryPort};
pub use stt::{SttPort, TranscriptPart, TranscriptStream, Utterance};
pub use telephony::{
    AudioFrame, CallHandle, DialError, InboundSignal, MediaError, PlaceCallRequest, TelephonyPort,
};
pub use tts::{SpeechRequest, SynthesisStream, TtsPort};
