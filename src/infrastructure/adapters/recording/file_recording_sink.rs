//! File Recording Sink - 文件系统录音外发实现
//!
//! 把每轮 PCM 写到 {base_dir}/{session_id}/turn_{index}_{speaker}.pcm；
//! 真实部署中由对象存储协作方替换

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::application::ports::{RecordingError, RecordingSinkPort, TurnRecording};
use crate::domain::session::SessionId;

/// 文件录音 sink
pub struct FileRecordingSink {
    /// 存储根目录
    base_dir: PathBuf,
}

impl FileRecordingSink {
    /// 创建新的文件 sink
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self, RecordingError> {
        let base_dir = base_dir.as_ref().to_path_buf();

        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| RecordingError::Io(e.to_string()))?;

        Ok(Self { base_dir })
    }

    fn session_dir(&self, session_id: SessionId) -> PathBuf {
        self.base_dir.join(session_id.to_string())
    }

    fn turn_path(&self, recording: &TurnRecording) -> PathBuf {
        self.session_dir(recording.session_id).join(format!(
            "turn_{}_{}.pcm",
            recording.turn_index,
            recording.speaker.as_str()
        ))
    }
}

#[async_trait]
impl RecordingSinkPort for FileRecordingSink {
    async fn store_turn(&self, recording: TurnRecording) -> Result<(), RecordingError> {
        let session_dir = self.session_dir(recording.session_id);
        fs::create_dir_all(&session_dir)
            .await
            .map_err(|e| RecordingError::Io(e.to_string()))?;

        let path = self.turn_path(&recording);
        fs::write(&path, &recording.audio)
            .await
            .map_err(|e| RecordingError::Io(e.to_string()))?;

        tracing::debug!(
            session_id = %recording.session_id,
            turn_index = recording.turn_index,
            bytes = recording.audio.len(),
            "Turn recording stored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::Speaker;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_turn_writes_pcm() {
        let dir = TempDir::new().unwrap();
        let sink = FileRecordingSink::new(dir.path()).await.unwrap();

        let session_id = SessionId::new();
        sink.store_turn(TurnRecording {
            session_id,
            turn_index: 0,
            speaker: Speaker::Caller,
            audio: vec![1, 2, 3, 4],
            sample_rate: 16_000,
        })
        .await
        .unwrap();

        let path = dir
            .path()
            .join(session_id.to_string())
            .join("turn_0_caller.pcm");
        assert_eq!(std::fs::read(path).unwrap(), vec![1, 2, 3, 4]);
    }
}
