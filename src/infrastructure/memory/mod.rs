//! In-Memory Implementations - 内存实现
//!
//! SessionRegistry 与 Ledger 的内存实现

mod ledger;
mod session_registry;

pub use ledger::InMemoryLedger;
pub use session_registry::InMemorySessionRegistry;
