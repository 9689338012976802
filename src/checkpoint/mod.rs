// src/checkpoint/mod.rs
//! Resume checkpoints: the persisted position a recurring run starts from.
//!
//! Persisted shape:
//! `{ "next_start_time": "<ts>", "last_successful_run": "<ts>", ... }`.
//! Fields this crate does not know are carried through a load/save cycle
//! untouched.

pub mod file;
pub mod remote;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Mutex;

use crate::timefmt::{TimestampFormat, COMPACT_ISO};

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub next_start_time: DateTime<Utc>,
    pub last_successful_run: Option<DateTime<Utc>>,
    pub extra: Map<String, Value>,
}

impl Checkpoint {
    pub fn initial(position: DateTime<Utc>) -> Self {
        Self {
            next_start_time: position,
            last_successful_run: None,
            extra: Map::new(),
        }
    }

    /// Copy with the position moved forward and the success time stamped.
    pub fn advanced(&self, position: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            next_start_time: position,
            last_successful_run: Some(now),
            extra: self.extra.clone(),
        }
    }
}

#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The stored checkpoint, or the store's initial position if none exists yet.
    async fn load(&self) -> Result<Checkpoint>;
    /// Durable and atomic: once this returns `Ok`, a later `load` sees the whole
    /// checkpoint; before that it sees the previous one.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
    fn name(&self) -> &str;
}

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    #[serde(alias = "next_from_date")]
    next_start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_successful_run: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Converts checkpoints to and from the JSON state document.
/// `next_start_time` uses the deployment's configured format;
/// `last_successful_run` is always compact ISO.
#[derive(Debug, Clone, Default)]
pub struct StateCodec {
    date_format: TimestampFormat,
}

impl StateCodec {
    pub fn new(date_format: TimestampFormat) -> Self {
        Self { date_format }
    }

    pub fn encode(&self, cp: &Checkpoint) -> Result<Vec<u8>> {
        let doc = StateDocument {
            // A lossy format would move the position backwards on the next load.
            next_start_time: self
                .date_format
                .format_exact(cp.next_start_time)
                .context("encoding next_start_time")?,
            last_successful_run: cp
                .last_successful_run
                .map(|t| t.format(COMPACT_ISO).to_string()),
            extra: cp.extra.clone(),
        };
        serde_json::to_vec_pretty(&doc).context("serializing state document")
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Checkpoint> {
        let doc: StateDocument =
            serde_json::from_slice(bytes).context("parsing state document")?;
        let next_start_time = self
            .date_format
            .parse(&doc.next_start_time)
            .context("reading next_start_time")?;

        // Informational only; an unreadable value must not block the harvest.
        let last_successful_run = doc.last_successful_run.as_deref().and_then(|raw| {
            let parsed = TimestampFormat::pattern(COMPACT_ISO)
                .parse(raw)
                .or_else(|_| TimestampFormat::Rfc3339.parse(raw));
            match parsed {
                Ok(ts) => Some(ts),
                Err(e) => {
                    tracing::warn!(error = %e, value = raw, "ignoring unreadable last_successful_run");
                    None
                }
            }
        });

        Ok(Checkpoint {
            next_start_time,
            last_successful_run,
            extra: doc.extra,
        })
    }
}

/// In-process store. Keeps every saved checkpoint in order; used for dry runs
/// and as a test double.
#[derive(Debug)]
pub struct MemoryCheckpointStore {
    initial: DateTime<Utc>,
    current: Mutex<Option<Checkpoint>>,
    saves: Mutex<Vec<Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new(initial: DateTime<Utc>) -> Self {
        Self {
            initial,
            current: Mutex::new(None),
            saves: Mutex::new(Vec::new()),
        }
    }

    /// Pre-seeded with an already stored checkpoint.
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        let store = Self::new(checkpoint.next_start_time);
        *store.current.lock().expect("checkpoint mutex poisoned") = Some(checkpoint);
        store
    }

    pub fn current(&self) -> Option<Checkpoint> {
        self.current
            .lock()
            .expect("checkpoint mutex poisoned")
            .clone()
    }

    pub fn saves(&self) -> Vec<Checkpoint> {
        self.saves.lock().expect("checkpoint mutex poisoned").clone()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Checkpoint> {
        Ok(self
            .current()
            .unwrap_or_else(|| Checkpoint::initial(self.initial)))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        *self.current.lock().expect("checkpoint mutex poisoned") = Some(checkpoint.clone());
        self.saves
            .lock()
            .expect("checkpoint mutex poisoned")
            .push(checkpoint.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
