// src/source/csv_feed.rs
//! CSV time-series source: one row per observation, one column holding the
//! observation timestamp.
//!
//! Rows inside the requested window become a single tabular batch. Coverage
//! is the last observed timestamp plus the series resolution (the sampling
//! step), never past the window end. A window without rows is `NoData`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::harvest::types::{Batch, FetchOutcome, Payload, SourceFetcher};
use crate::timefmt::{TimestampFormat, COMPACT_ISO};
use crate::window::{interval_name, Window};

pub struct CsvFeedFetcher {
    mode: Mode,
    timestamp_column: String,
    timestamp_format: TimestampFormat,
    resolution: TimeDelta,
    filename_format: String,
}

enum Mode {
    // Own copy so callers can hand in decoded/loaded text.
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl CsvFeedFetcher {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            timestamp_column: "date".to_string(),
            timestamp_format: TimestampFormat::Flexible,
            resolution: TimeDelta::days(1),
            filename_format: COMPACT_ISO.to_string(),
        }
    }

    pub fn from_fixture(csv: &str) -> Self {
        Self::with_mode(Mode::Fixture(csv.to_string()))
    }

    pub fn from_url(url: &str) -> Self {
        Self::with_mode(Mode::Http {
            url: url.to_string(),
            client: reqwest::Client::new(),
        })
    }

    pub fn with_timestamp_column(mut self, column: &str) -> Self {
        self.timestamp_column = column.to_string();
        self
    }

    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    pub fn with_resolution(mut self, resolution: TimeDelta) -> Self {
        self.resolution = resolution;
        self
    }

    /// strftime pattern for the `<start>--<end>` batch name.
    pub fn with_filename_format(mut self, format: &str) -> Self {
        self.filename_format = format.to_string();
        self
    }

    async fn read_body(&self) -> Result<String> {
        match &self.mode {
            Mode::Fixture(s) => Ok(s.clone()),
            Mode::Http { url, client } => {
                let rsp = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("csv feed GET {url}"))?
                    .error_for_status()
                    .with_context(|| format!("csv feed GET {url}"))?;
                rsp.text().await.context("csv feed .text()")
            }
        }
    }

    fn select(&self, body: &str, window: &Window) -> Result<FetchOutcome> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(body.as_bytes());
        let headers = rdr.headers().context("reading csv header")?.clone();
        let ts_idx = headers
            .iter()
            .position(|h| h == self.timestamp_column)
            .ok_or_else(|| {
                anyhow!(
                    "timestamp column {:?} not found in feed header",
                    self.timestamp_column
                )
            })?;

        let mut rows = Vec::new();
        let mut latest: Option<DateTime<Utc>> = None;
        for (line, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("reading feed row {}", line + 1))?;
            let raw = record.get(ts_idx).unwrap_or_default();
            let ts = self
                .timestamp_format
                .parse(raw)
                .with_context(|| format!("feed row {}", line + 1))?;
            if !window.contains(ts) {
                continue;
            }
            latest = Some(latest.map_or(ts, |l| l.max(ts)));
            rows.push(record.iter().map(str::to_string).collect());
        }

        let Some(latest) = latest else {
            return Ok(FetchOutcome::NoData);
        };
        let covered_until = latest
            .checked_add_signed(self.resolution)
            .map_or(window.end, |t| t.min(window.end));

        tracing::debug!(
            %window,
            rows = rows.len(),
            covered_until = %covered_until,
            "csv feed rows selected"
        );

        Ok(FetchOutcome::from_batches(vec![Batch {
            name: interval_name(window.start, covered_until, &self.filename_format),
            payload: Payload::Table {
                columns: headers.iter().map(str::to_string).collect(),
                rows,
            },
            covered_until,
        }]))
    }
}

#[async_trait]
impl SourceFetcher for CsvFeedFetcher {
    async fn fetch(&self, window: &Window) -> Result<FetchOutcome> {
        let body = self.read_body().await?;
        self.select(&body, window)
    }

    fn name(&self) -> &str {
        match self.mode {
            Mode::Fixture(_) => "csv-fixture",
            Mode::Http { .. } => "csv-http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = "\
date,pollution,wnd_dir
2024-01-01 00:00:00,129,SE
2024-01-01 06:00:00,148,SE
2024-01-01 12:00:00,159,cv
2024-01-02 00:00:00,181,SE
";

    fn ts(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    fn fetcher() -> CsvFeedFetcher {
        CsvFeedFetcher::from_fixture(FEED)
            .with_resolution(TimeDelta::hours(6))
            .with_filename_format("%Y%m%dT%H")
    }

    #[tokio::test]
    async fn selects_rows_inside_half_open_window() {
        let w = Window {
            start: ts(1, 0),
            end: ts(2, 0),
        };
        let FetchOutcome::Data { batches, actual_end } = fetcher().fetch(&w).await.unwrap() else {
            panic!("expected data");
        };
        assert_eq!(actual_end, ts(1, 18));
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].name, "20240101T00--20240101T18");
        assert_eq!(batches[0].payload.len(), 3);
    }

    #[tokio::test]
    async fn coverage_never_passes_window_end() {
        let w = Window {
            start: ts(1, 6),
            end: ts(1, 14),
        };
        let FetchOutcome::Data { actual_end, .. } = fetcher().fetch(&w).await.unwrap() else {
            panic!("expected data");
        };
        assert_eq!(actual_end, ts(1, 14));
    }

    #[tokio::test]
    async fn cell_values_are_passed_through_untrimmed() {
        let feed = " date , note\n2024-01-01 06:00:00,  padded \n";
        let w = Window {
            start: ts(1, 0),
            end: ts(2, 0),
        };
        let out = CsvFeedFetcher::from_fixture(feed)
            .with_resolution(TimeDelta::hours(6))
            .fetch(&w)
            .await
            .unwrap();
        let FetchOutcome::Data { batches, .. } = out else {
            panic!("expected data");
        };
        let Payload::Table { columns, rows } = &batches[0].payload else {
            panic!("expected a table");
        };
        assert_eq!(columns, &vec!["date".to_string(), "note".to_string()]);
        assert_eq!(rows[0][1], "  padded ");
    }

    #[tokio::test]
    async fn empty_window_is_no_data() {
        let w = Window {
            start: ts(3, 0),
            end: ts(4, 0),
        };
        assert_eq!(fetcher().fetch(&w).await.unwrap(), FetchOutcome::NoData);
    }

    #[tokio::test]
    async fn missing_timestamp_column_is_an_error() {
        let f = fetcher().with_timestamp_column("timestamp");
        let w = Window {
            start: ts(1, 0),
            end: ts(2, 0),
        };
        let err = f.fetch(&w).await.unwrap_err();
        assert!(err.to_string().contains("timestamp"));
    }
}
