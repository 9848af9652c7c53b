//! Recording Adapters - 录音外发实现

mod file_recording_sink;

pub use file_recording_sink::FileRecordingSink;
