//! Events - 生命周期事件广播

mod publisher;

pub use publisher::{EventPublisher, LifecycleEvent};
