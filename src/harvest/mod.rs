// src/harvest/mod.rs
//! # Harvest orchestrator
//! One run: discover the resume position, then repeatedly plan a window,
//! fetch it, upload every batch, and only then advance (and in recurring mode
//! persist) the position.
//!
//! Ordering guarantee: a checkpoint is written strictly after all batches of
//! its window were uploaded, and it holds exactly that window's reported end.
//! A crash or error anywhere before the write leaves the previous checkpoint
//! in place, so the next run re-requests the same window (at-least-once).

pub mod error;
pub mod types;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::checkpoint::CheckpointStore;
use crate::window::Window;
use error::HarvestError;
use types::{FetchOutcome, SinkUploader, SourceFetcher};

/// One-time metrics registration (so series show up in the exposition).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("harvest_windows_total", "Windows fetched and fully uploaded.");
        describe_counter!(
            "harvest_batches_uploaded_total",
            "Batches accepted by the sink."
        );
        describe_counter!(
            "harvest_checkpoint_saves_total",
            "Checkpoints persisted after a successful window."
        );
        describe_counter!("harvest_errors_total", "Runs aborted, by error kind.");
        describe_histogram!("harvest_fetch_ms", "Source fetch time in milliseconds.");
        describe_gauge!(
            "harvest_position_ts",
            "Unix ts of the current harvest position."
        );
        describe_gauge!("harvest_last_run_ts", "Unix ts when a run last finished.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Start from the stored checkpoint, run up to "now", persist progress.
    Recurring,
    /// Backfill/replay a caller-chosen range; the checkpoint is never touched.
    Explicit {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Recurring => f.write_str("recurring"),
            RunMode::Explicit { .. } => f.write_str("explicit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Position reached (or passed) the target end.
    TargetReached,
    /// The source had nothing for the requested window.
    NoData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: RunMode,
    pub start_position: DateTime<Utc>,
    pub target_end: DateTime<Utc>,
    pub final_position: DateTime<Utc>,
    pub windows: usize,
    pub batches_uploaded: usize,
    pub checkpoints_saved: usize,
    pub stop: StopReason,
}

/// Composes a source, a sink and a checkpoint store into the windowed
/// ingestion loop. Strictly sequential: one window is fetched and fully
/// uploaded before the next is planned.
pub struct Harvester {
    fetcher: Arc<dyn SourceFetcher>,
    uploader: Arc<dyn SinkUploader>,
    checkpoints: Arc<dyn CheckpointStore>,
    max_span: TimeDelta,
    clock: fn() -> DateTime<Utc>,
}

impl Harvester {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        uploader: Arc<dyn SinkUploader>,
        checkpoints: Arc<dyn CheckpointStore>,
        max_span: TimeDelta,
    ) -> Self {
        Self {
            fetcher,
            uploader,
            checkpoints,
            max_span,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock (target end of recurring runs, `last_successful_run`).
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_span(&self) -> TimeDelta {
        self.max_span
    }

    /// Perform one full run.
    pub async fn run(&self, mode: RunMode) -> Result<RunSummary, HarvestError> {
        ensure_metrics_described();
        let result = self.run_inner(mode).await;
        gauge!("harvest_last_run_ts").set((self.clock)().timestamp() as f64);
        if let Err(e) = &result {
            counter!("harvest_errors_total", "kind" => e.kind()).increment(1);
        }
        result
    }

    async fn run_inner(&self, mode: RunMode) -> Result<RunSummary, HarvestError> {
        if self.max_span <= TimeDelta::zero() {
            return Err(crate::window::WindowError::NonPositiveSpan(self.max_span).into());
        }

        // 1) Resume point: explicit bounds bypass the store entirely.
        let (start, target_end, mut checkpoint) = match mode {
            RunMode::Explicit { start, end } => {
                if end < start {
                    warn!(target: "harvest", %start, %end, "explicit range ends before it starts, nothing to do");
                }
                (start, end, None)
            }
            RunMode::Recurring => {
                let cp = self
                    .checkpoints
                    .load()
                    .await
                    .map_err(HarvestError::CheckpointLoad)?;
                (cp.next_start_time, (self.clock)(), Some(cp))
            }
        };

        info!(
            target: "harvest",
            %mode,
            start = %start,
            target_end = %target_end,
            max_span_secs = self.max_span.num_seconds(),
            source = self.fetcher.name(),
            sink = self.uploader.name(),
            "harvest run starting"
        );

        let mut summary = RunSummary {
            mode,
            start_position: start,
            target_end,
            final_position: start,
            windows: 0,
            batches_uploaded: 0,
            checkpoints_saved: 0,
            stop: StopReason::TargetReached,
        };
        let mut position = start;

        // 2) Drain the range window by window.
        while position < target_end {
            let window = Window::next(position, target_end, self.max_span)?;

            let t0 = std::time::Instant::now();
            let outcome = self
                .fetcher
                .fetch(&window)
                .await
                .map_err(|source| HarvestError::Fetch { window, source })?;
            histogram!("harvest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            let (batches, actual_end) = match outcome {
                FetchOutcome::NoData => {
                    info!(target: "harvest", %window, "no data retrieved, stopping");
                    summary.stop = StopReason::NoData;
                    break;
                }
                FetchOutcome::Data {
                    batches,
                    actual_end,
                } => (batches, actual_end),
            };

            // Retrying the same window would spin forever.
            if actual_end <= position {
                return Err(HarvestError::NoProgress { window, actual_end });
            }
            if actual_end > window.end {
                warn!(
                    target: "harvest",
                    %window,
                    actual_end = %actual_end,
                    "source reported coverage beyond the requested window"
                );
            }

            // 3) Upload everything; the first failure aborts with the checkpoint untouched.
            for batch in &batches {
                self.uploader
                    .upload(batch)
                    .await
                    .map_err(|source| HarvestError::Upload {
                        window,
                        batch: batch.name.clone(),
                        source,
                    })?;
                counter!("harvest_batches_uploaded_total").increment(1);
                summary.batches_uploaded += 1;
                info!(
                    target: "harvest",
                    batch = %batch.name,
                    rows = batch.payload.len(),
                    "batch uploaded"
                );
            }

            // 4) Only now move the position, and persist it in recurring mode.
            position = actual_end;
            if let Some(cp) = checkpoint.as_mut() {
                let next = cp.advanced(position, (self.clock)());
                self.checkpoints.save(&next).await.map_err(|source| {
                    HarvestError::CheckpointSave {
                        window,
                        position,
                        source,
                    }
                })?;
                *cp = next;
                counter!("harvest_checkpoint_saves_total").increment(1);
                summary.checkpoints_saved += 1;
            }

            counter!("harvest_windows_total").increment(1);
            gauge!("harvest_position_ts").set(position.timestamp() as f64);
            summary.windows += 1;
            summary.final_position = position;

            info!(
                target: "harvest",
                %window,
                actual_end = %actual_end,
                batches = batches.len(),
                "window committed"
            );
        }

        info!(
            target: "harvest",
            windows = summary.windows,
            batches = summary.batches_uploaded,
            position = %summary.final_position,
            stop = ?summary.stop,
            "harvest run finished"
        );
        Ok(summary)
    }
}
