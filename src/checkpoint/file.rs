// src/checkpoint/file.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use super::{Checkpoint, CheckpointStore, StateCodec};

/// Checkpoint kept as a JSON document on local disk.
pub struct FileCheckpointStore {
    path: PathBuf,
    codec: StateCodec,
    initial: DateTime<Utc>,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            codec: StateCodec::default(),
            initial: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn with_codec(mut self, codec: StateCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Position reported when no state file exists yet.
    pub fn with_initial_position(mut self, initial: DateTime<Utc>) -> Self {
        self.initial = initial;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<Checkpoint> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => self
                .codec
                .decode(&bytes)
                .with_context(|| format!("decoding {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %self.path.display(),
                    initial = %self.initial,
                    "no state file yet, starting from initial position"
                );
                Ok(Checkpoint::initial(self.initial))
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let bytes = self.codec.encode(checkpoint)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || crate::atomic::write_atomically(&path, &bytes))
            .await
            .context("state writer task failed")??;
        tracing::debug!(
            path = %self.path.display(),
            next_start_time = %checkpoint.next_start_time,
            "checkpoint saved"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timefmt::TimestampFormat;
    use chrono::TimeZone;

    #[tokio::test]
    async fn missing_file_loads_initial_position() {
        let dir = tempfile::tempdir().unwrap();
        let start = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        let store =
            FileCheckpointStore::new(dir.path().join("state.json")).with_initial_position(start);
        let cp = store.load().await.unwrap();
        assert_eq!(cp, Checkpoint::initial(start));
    }

    #[tokio::test]
    async fn default_initial_position_is_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("state.json"));
        assert_eq!(
            store.load().await.unwrap().next_start_time,
            DateTime::<Utc>::UNIX_EPOCH
        );
    }

    #[tokio::test]
    async fn save_then_load_round_trips_with_configured_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileCheckpointStore::new(&path)
            .with_codec(StateCodec::new(TimestampFormat::pattern("%Y-%m-%dT%H:%M")));

        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let cp = Checkpoint::initial(DateTime::<Utc>::UNIX_EPOCH)
            .advanced(Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap(), now);
        store.save(&cp).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"2024-01-01T18:00\""));
        assert_eq!(store.load().await.unwrap(), cp);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ truncated").unwrap();
        let store = FileCheckpointStore::new(&path);
        assert!(store.load().await.is_err());
    }
}
