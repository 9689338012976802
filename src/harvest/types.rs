// src/harvest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::window::Window;

/// Content of one batch, before it is encoded into a storable artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Header + rows of string cells (encoded as CSV).
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// Structured records (encoded as a JSON array).
    Records(Vec<serde_json::Value>),
    /// Pre-encoded bytes, stored as-is under the given file extension.
    Raw { bytes: Vec<u8>, extension: String },
}

impl Payload {
    /// Number of rows/records; raw payloads count as one unit.
    pub fn len(&self) -> usize {
        match self {
            Payload::Table { rows, .. } => rows.len(),
            Payload::Records(r) => r.len(),
            Payload::Raw { .. } => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Storage identifier (artifact name without extension).
    pub name: String,
    pub payload: Payload,
    /// Source-confirmed end of the data this batch covers (exclusive).
    pub covered_until: DateTime<Utc>,
}

/// What a source returned for one requested window.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Data {
        batches: Vec<Batch>,
        /// True coverage end of everything returned; may precede the window end.
        actual_end: DateTime<Utc>,
    },
    NoData,
}

impl FetchOutcome {
    /// Builds an outcome from batches gathered from one or more endpoints.
    /// Coverage only extends as far as the batch that ends first.
    pub fn from_batches(batches: Vec<Batch>) -> Self {
        match batches.iter().map(|b| b.covered_until).min() {
            Some(actual_end) => FetchOutcome::Data {
                batches,
                actual_end,
            },
            None => FetchOutcome::NoData,
        }
    }
}

#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Pull data for `window`. Must not mutate shared state; may be called again
    /// with an overlapping window after a failed run.
    async fn fetch(&self, window: &Window) -> Result<FetchOutcome>;
    fn name(&self) -> &str;
}

#[async_trait::async_trait]
pub trait SinkUploader: Send + Sync {
    /// Durably store one batch. Uploading the same batch name twice should be
    /// harmless: runs deliver at-least-once.
    async fn upload(&self, batch: &Batch) -> Result<()>;
    fn name(&self) -> &str;
}
