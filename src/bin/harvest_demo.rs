//! Demo that harvests the bundled air-quality fixture into a temp directory,
//! one six-hour window at a time, with an in-memory checkpoint.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use ingress_harvester::checkpoint::MemoryCheckpointStore;
use ingress_harvester::sink::DirectoryUploader;
use ingress_harvester::source::CsvFeedFetcher;
use ingress_harvester::{Harvester, RunMode};

fn demo_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0)
        .single()
        .expect("valid demo clock")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let feed = include_str!("../../tests/fixtures/air_quality.csv");
    let out = tempfile::tempdir()?;
    let checkpoints = Arc::new(MemoryCheckpointStore::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid demo start"),
    ));

    let harvester = Harvester::new(
        Arc::new(
            CsvFeedFetcher::from_fixture(feed)
                .with_resolution(TimeDelta::hours(6))
                .with_filename_format("%Y%m%dT%H%M"),
        ),
        Arc::new(DirectoryUploader::new(out.path())),
        checkpoints.clone(),
        TimeDelta::hours(12),
    )
    .with_clock(demo_now);

    let summary = harvester.run(RunMode::Recurring).await?;
    println!(
        "harvested {} windows / {} batches, position now {}",
        summary.windows, summary.batches_uploaded, summary.final_position
    );
    for entry in std::fs::read_dir(out.path())? {
        println!("  {}", entry?.file_name().to_string_lossy());
    }
    println!("checkpoints written: {}", checkpoints.saves().len());
    Ok(())
}
