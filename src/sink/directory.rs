// src/sink/directory.rs
use anyhow::{Context, Result};
use std::path::PathBuf;

use super::{Artifact, TableFormat};
use crate::harvest::types::{Batch, SinkUploader};

/// Stores artifacts as files in a local directory. Re-uploading a batch
/// overwrites the file of the same name.
pub struct DirectoryUploader {
    root: PathBuf,
    table_format: TableFormat,
}

impl DirectoryUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            table_format: TableFormat::Csv,
        }
    }

    pub fn with_table_format(mut self, table_format: TableFormat) -> Self {
        self.table_format = table_format;
        self
    }
}

#[async_trait::async_trait]
impl SinkUploader for DirectoryUploader {
    async fn upload(&self, batch: &Batch) -> Result<()> {
        let artifact = Artifact::encode(batch, self.table_format)?;
        let path = self.root.join(&artifact.name);
        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            crate::atomic::write_atomically(&target, &artifact.bytes)
        })
        .await
        .context("artifact writer task failed")?
        .with_context(|| format!("storing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "artifact stored");
        Ok(())
    }

    fn name(&self) -> &str {
        "directory"
    }
}
