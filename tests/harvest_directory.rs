// tests/harvest_directory.rs
//
// CSV fixture -> directory sink, with the checkpoint kept in a state file
// across several recurring runs.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use ingress_harvester::checkpoint::file::FileCheckpointStore;
use ingress_harvester::checkpoint::StateCodec;
use ingress_harvester::sink::{DirectoryUploader, TableFormat};
use ingress_harvester::source::CsvFeedFetcher;
use ingress_harvester::timefmt::TimestampFormat;
use ingress_harvester::{CheckpointStore, HarvestError, Harvester, RunMode, StopReason};

const FEED: &str = include_str!("fixtures/air_quality.csv");

fn jan(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
}

fn jan2() -> DateTime<Utc> {
    jan(2, 0)
}
fn jan3() -> DateTime<Utc> {
    jan(3, 0)
}
fn jan4() -> DateTime<Utc> {
    jan(4, 0)
}

fn harvester(out: &Path, state: &Path, clock: fn() -> DateTime<Utc>) -> Harvester {
    Harvester::new(
        Arc::new(
            CsvFeedFetcher::from_fixture(FEED)
                .with_resolution(TimeDelta::hours(6))
                .with_filename_format("%Y%m%dT%H"),
        ),
        Arc::new(DirectoryUploader::new(out)),
        Arc::new(FileCheckpointStore::new(state).with_initial_position(jan(1, 0))),
        TimeDelta::hours(12),
    )
    .with_clock(clock)
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn recurring_runs_resume_from_state_file() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let state = tmp.path().join("state.json");

    // Legacy key plus an operator-owned field that must survive rewrites.
    std::fs::write(
        &state,
        r#"{ "next_from_date": "2024-01-01T00:00:00Z", "owner": "ops" }"#,
    )
    .unwrap();

    let first = harvester(&out, &state, jan2)
        .run(RunMode::Recurring)
        .await
        .expect("first run");
    assert_eq!(first.windows, 2);
    assert_eq!(first.final_position, jan(2, 0));
    assert_eq!(
        listing(&out),
        vec![
            "20240101T00--20240101T12.csv",
            "20240101T12--20240102T00.csv"
        ]
    );

    let csv = std::fs::read_to_string(out.join("20240101T00--20240101T12.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "date,pollution,dew,temp,press,wnd_dir,wnd_spd");
    assert_eq!(lines.len(), 3, "header plus the 00:00 and 06:00 rows");
    assert!(lines[2].starts_with("2024-01-01 06:00:00,148"));

    let second = harvester(&out, &state, jan3)
        .run(RunMode::Recurring)
        .await
        .expect("second run");
    assert_eq!(second.start_position, jan(2, 0));
    assert_eq!(second.final_position, jan(3, 0));
    assert_eq!(listing(&out).len(), 4);

    let stored = FileCheckpointStore::new(&state).load().await.unwrap();
    assert_eq!(stored.next_start_time, jan(3, 0));
    assert_eq!(stored.last_successful_run, Some(jan3()));
    assert_eq!(stored.extra.get("owner"), Some(&serde_json::json!("ops")));
}

#[tokio::test]
async fn run_past_end_of_feed_stops_on_no_data() {
    let tmp = tempfile::tempdir().unwrap();
    let state = tmp.path().join("state.json");

    harvester(tmp.path(), &state, jan3)
        .run(RunMode::Recurring)
        .await
        .expect("catch-up run");
    let before = std::fs::read(&state).unwrap();

    let idle = harvester(tmp.path(), &state, jan4)
        .run(RunMode::Recurring)
        .await
        .expect("idle run");
    assert_eq!(idle.stop, StopReason::NoData);
    assert_eq!(idle.windows, 0);
    assert_eq!(idle.final_position, jan(3, 0));
    assert_eq!(std::fs::read(&state).unwrap(), before, "state untouched");
}

#[tokio::test]
async fn explicit_backfill_rewrites_same_artifact_names() {
    let tmp = tempfile::tempdir().unwrap();
    let state = tmp.path().join("state.json");

    harvester(tmp.path(), &state, jan2)
        .run(RunMode::Recurring)
        .await
        .expect("recurring run");
    let mut names = listing(tmp.path());
    let state_before = std::fs::read(&state).unwrap();

    let replay = harvester(tmp.path(), &state, jan4)
        .run(RunMode::Explicit {
            start: jan(1, 0),
            end: jan(2, 0),
        })
        .await
        .expect("backfill");
    assert_eq!(replay.windows, 2);
    assert_eq!(replay.checkpoints_saved, 0);

    // Same intervals, same names: the replay overwrote rather than duplicated.
    names.sort();
    assert_eq!(listing(tmp.path()), names);
    assert_eq!(std::fs::read(&state).unwrap(), state_before);
}

fn jan1_evening() -> DateTime<Utc> {
    jan(1, 20)
}

#[tokio::test]
async fn date_only_state_format_never_moves_position_backwards() {
    let tmp = tempfile::tempdir().unwrap();
    let state = tmp.path().join("state.json");
    let store = || {
        FileCheckpointStore::new(&state)
            .with_codec(StateCodec::new(TimestampFormat::pattern("%Y-%m-%d")))
            .with_initial_position(jan(1, 0))
    };
    let harvester = Harvester::new(
        Arc::new(
            CsvFeedFetcher::from_fixture(FEED)
                .with_resolution(TimeDelta::hours(6))
                .with_filename_format("%Y%m%dT%H"),
        ),
        Arc::new(DirectoryUploader::new(tmp.path())),
        Arc::new(store()),
        TimeDelta::hours(12),
    )
    .with_clock(jan1_evening);

    // First window ends at 12:00, which "%Y-%m-%d" would store as midnight.
    let err = harvester.run(RunMode::Recurring).await.unwrap_err();
    match &err {
        HarvestError::CheckpointSave { position, .. } => assert_eq!(*position, jan(1, 12)),
        other => panic!("expected CheckpointSave, got {other:?}"),
    }
    assert!(!state.exists(), "nothing lossy was persisted");
    assert_eq!(store().load().await.unwrap().next_start_time, jan(1, 0));
}

#[tokio::test]
async fn parquet_artifacts_land_in_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    std::fs::create_dir(&out).unwrap();

    let summary = Harvester::new(
        Arc::new(
            CsvFeedFetcher::from_fixture(FEED)
                .with_resolution(TimeDelta::hours(6))
                .with_filename_format("%Y%m%dT%H"),
        ),
        Arc::new(DirectoryUploader::new(&out).with_table_format(TableFormat::Parquet)),
        Arc::new(
            FileCheckpointStore::new(tmp.path().join("state.json"))
                .with_initial_position(jan(1, 0)),
        ),
        TimeDelta::hours(12),
    )
    .with_clock(jan2)
    .run(RunMode::Recurring)
    .await
    .expect("run ok");

    assert_eq!(summary.windows, 2);
    let names = listing(&out);
    assert_eq!(
        names,
        vec![
            "20240101T00--20240101T12.parquet",
            "20240101T12--20240102T00.parquet"
        ]
    );
    let bytes = std::fs::read(out.join(&names[0])).unwrap();
    assert_eq!(&bytes[..4], b"PAR1");
    assert_eq!(&bytes[bytes.len() - 4..], b"PAR1");
}
