// src/config/harvest.rs
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::checkpoint::file::FileCheckpointStore;
use crate::checkpoint::remote::HttpCheckpointStore;
use crate::checkpoint::{CheckpointStore, StateCodec};
use crate::harvest::types::{SinkUploader, SourceFetcher};
use crate::sink::{DirectoryUploader, HttpUploader, TableFormat};
use crate::source::CsvFeedFetcher;
use crate::timefmt::{TimestampFormat, COMPACT_ISO};

pub const ENV_SINK_TOKEN: &str = "HARVEST_SINK_TOKEN";
pub const ENV_CHECKPOINT_TOKEN: &str = "HARVEST_CHECKPOINT_TOKEN";

fn default_filename_format() -> String {
    COMPACT_ISO.to_string()
}
fn default_artifact_format() -> TableFormat {
    TableFormat::Parquet
}
fn default_timestamp_column() -> String {
    "date".to_string()
}
fn default_feed_format() -> TimestampFormat {
    TimestampFormat::Flexible
}
fn default_resolution() -> Duration {
    Duration::from_secs(24 * 3600)
}
fn default_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_max_attempts() -> u8 {
    3
}
fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    pub harvest: HarvestSection,
    pub source: SourceSection,
    pub sink: SinkSection,
    pub checkpoint: CheckpointSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarvestSection {
    /// Longest window requested in one fetch, e.g. "1day" or "6h".
    #[serde(with = "humantime_serde")]
    pub max_interval: Duration,
    #[serde(default = "default_filename_format")]
    pub filename_time_format: String,
    /// Encoding of tabular batches: "parquet" (snappy) or "csv".
    #[serde(default = "default_artifact_format")]
    pub artifact_format: TableFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    pub url: Option<String>,
    /// Local CSV file read instead of `url` (dry runs, demos).
    pub fixture: Option<PathBuf>,
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    #[serde(default = "default_feed_format")]
    pub timestamp_format: TimestampFormat,
    #[serde(default = "default_resolution", with = "humantime_serde")]
    pub resolution: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Http,
    Directory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkSection {
    pub kind: SinkKind,
    pub url: Option<String>,
    pub dataset: Option<String>,
    /// Bearer token, or "ENV" to read `HARVEST_SINK_TOKEN`.
    pub token: Option<String>,
    pub directory: Option<PathBuf>,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    File,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointSection {
    pub kind: CheckpointKind,
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub dataset: Option<String>,
    /// Bearer token, or "ENV" to read `HARVEST_CHECKPOINT_TOKEN`.
    pub token: Option<String>,
    /// Encoding of `next_start_time` in the state document.
    #[serde(default)]
    pub date_format: TimestampFormat,
    /// Where a first run starts when no state exists (default: Unix epoch).
    pub initial_position: Option<String>,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Noisy targets capped at `warn`, e.g. ["hyper", "reqwest"].
    #[serde(default)]
    pub disable_logger_labels: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            disable_logger_labels: Vec::new(),
        }
    }
}

impl LoggingSection {
    /// `EnvFilter` directive string: base filter plus `<label>=warn` per label.
    pub fn directives(&self) -> String {
        let mut parts = vec![self.filter.trim().to_string()];
        for label in &self.disable_logger_labels {
            let label = label.trim();
            if !label.is_empty() {
                parts.push(format!("{label}=warn"));
            }
        }
        parts.retain(|p| !p.is_empty());
        parts.join(",")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSection {
    /// Prometheus textfile written at the end of each run.
    pub textfile: Option<PathBuf>,
}

/// Durations written the humantime way ("6h", "1day", "30s").
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// "ENV" means: read the token from `env_name`.
fn resolve_secret(raw: Option<&str>, env_name: &str) -> Result<Option<String>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("env") => std::env::var(env_name)
            .map(Some)
            .map_err(|_| anyhow!("Missing {env_name} env var")),
        Some(v) => Ok(Some(v.to_string())),
    }
}

fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{what} must be set"))
}

impl HarvestConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: HarvestConfig = toml::from_str(s).context("parsing harvest config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.harvest.max_interval.is_zero() {
            bail!("harvest.max_interval must be positive");
        }
        if self.source.url.is_none() && self.source.fixture.is_none() {
            bail!("source.url or source.fixture must be set");
        }
        match self.sink.kind {
            SinkKind::Http => {
                required(&self.sink.url, "sink.url")?;
                required(&self.sink.dataset, "sink.dataset")?;
            }
            SinkKind::Directory if self.sink.directory.is_none() => {
                bail!("sink.directory must be set for a directory sink")
            }
            SinkKind::Directory => {}
        }
        match self.checkpoint.kind {
            CheckpointKind::File if self.checkpoint.path.is_none() => {
                bail!("checkpoint.path must be set for a file checkpoint")
            }
            CheckpointKind::File => {}
            CheckpointKind::Http => {
                required(&self.checkpoint.url, "checkpoint.url")?;
                required(&self.checkpoint.dataset, "checkpoint.dataset")?;
            }
        }
        self.initial_position()?;
        Ok(())
    }

    pub fn max_span(&self) -> Result<TimeDelta> {
        TimeDelta::from_std(self.harvest.max_interval).context("harvest.max_interval out of range")
    }

    pub fn initial_position(&self) -> Result<DateTime<Utc>> {
        match &self.checkpoint.initial_position {
            Some(raw) => TimestampFormat::Flexible
                .parse(raw)
                .context("checkpoint.initial_position"),
            None => Ok(DateTime::<Utc>::UNIX_EPOCH),
        }
    }

    pub fn build_fetcher(&self) -> Result<Arc<dyn SourceFetcher>> {
        let s = &self.source;
        let fetcher = match (&s.fixture, &s.url) {
            (Some(path), _) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading fixture {}", path.display()))?;
                CsvFeedFetcher::from_fixture(&text)
            }
            (None, Some(url)) => CsvFeedFetcher::from_url(url),
            (None, None) => bail!("source.url or source.fixture must be set"),
        };
        let resolution =
            TimeDelta::from_std(s.resolution).context("source.resolution out of range")?;
        Ok(Arc::new(
            fetcher
                .with_timestamp_column(&s.timestamp_column)
                .with_timestamp_format(s.timestamp_format.clone())
                .with_resolution(resolution)
                .with_filename_format(&self.harvest.filename_time_format),
        ))
    }

    pub fn build_uploader(&self) -> Result<Arc<dyn SinkUploader>> {
        let s = &self.sink;
        Ok(match s.kind {
            SinkKind::Http => Arc::new(
                HttpUploader::new(required(&s.url, "sink.url")?, required(&s.dataset, "sink.dataset")?)
                    .with_token(resolve_secret(s.token.as_deref(), ENV_SINK_TOKEN)?)
                    .with_timeout(s.timeout)
                    .with_max_attempts(s.max_attempts)
                    .with_table_format(self.harvest.artifact_format),
            ),
            SinkKind::Directory => {
                let dir = s
                    .directory
                    .clone()
                    .ok_or_else(|| anyhow!("sink.directory must be set"))?;
                Arc::new(DirectoryUploader::new(dir).with_table_format(self.harvest.artifact_format))
            }
        })
    }

    pub fn build_checkpoint_store(&self) -> Result<Arc<dyn CheckpointStore>> {
        let c = &self.checkpoint;
        let codec = StateCodec::new(c.date_format.clone());
        let initial = self.initial_position()?;
        Ok(match c.kind {
            CheckpointKind::File => {
                let path = c
                    .path
                    .clone()
                    .ok_or_else(|| anyhow!("checkpoint.path must be set"))?;
                Arc::new(
                    FileCheckpointStore::new(path)
                        .with_codec(codec)
                        .with_initial_position(initial),
                )
            }
            CheckpointKind::Http => Arc::new(
                HttpCheckpointStore::new(
                    required(&c.url, "checkpoint.url")?,
                    required(&c.dataset, "checkpoint.dataset")?,
                )
                .with_token(resolve_secret(c.token.as_deref(), ENV_CHECKPOINT_TOKEN)?)
                .with_timeout(c.timeout)
                .with_codec(codec)
                .with_initial_position(initial),
            ),
        })
    }
}
