//! Sled Persistence - 事件账本

mod event_ledger;

pub use event_ledger::{SledEventLedger, SledLedgerConfig};
