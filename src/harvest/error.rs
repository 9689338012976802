// src/harvest/error.rs
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::window::{Window, WindowError};

/// Every variant aborts the run. Nothing here is retried by the engine; the
/// caller decides whether to invoke another run later.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("loading checkpoint failed")]
    CheckpointLoad(#[source] anyhow::Error),

    #[error("fetch failed for window {window}")]
    Fetch {
        window: Window,
        #[source]
        source: anyhow::Error,
    },

    #[error("source made no progress in window {window}: reported end {actual_end} is not after the window start")]
    NoProgress {
        window: Window,
        actual_end: DateTime<Utc>,
    },

    #[error("upload of batch {batch:?} failed in window {window}; position stays at window start {}", window.start)]
    Upload {
        window: Window,
        batch: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("saving checkpoint {position} failed after window {window} was uploaded")]
    CheckpointSave {
        window: Window,
        position: DateTime<Utc>,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Window(#[from] WindowError),
}

impl HarvestError {
    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            HarvestError::CheckpointLoad(_) => "checkpoint_load",
            HarvestError::Fetch { .. } => "fetch",
            HarvestError::NoProgress { .. } => "no_progress",
            HarvestError::Upload { .. } => "upload",
            HarvestError::CheckpointSave { .. } => "checkpoint_save",
            HarvestError::Window(_) => "window",
        }
    }

    /// The window that was in flight when the run aborted, if any.
    pub fn window(&self) -> Option<Window> {
        match self {
            HarvestError::Fetch { window, .. }
            | HarvestError::NoProgress { window, .. }
            | HarvestError::Upload { window, .. }
            | HarvestError::CheckpointSave { window, .. } => Some(*window),
            HarvestError::CheckpointLoad(_) | HarvestError::Window(_) => None,
        }
    }
}
