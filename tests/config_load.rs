// tests/config_load.rs
//
// Config discovery and adapter wiring from TOML. These tests touch process
// env vars, so they run serially.

use std::path::PathBuf;

use chrono::{TimeDelta, TimeZone, Utc};
use serial_test::serial;

use ingress_harvester::config::{self, harvest::SinkKind, ENV_CONFIG_PATH};
use ingress_harvester::sink::TableFormat;
use ingress_harvester::timefmt::TimestampFormat;

fn sample_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/harvest.toml")
}

#[test]
#[serial]
fn bundled_sample_config_parses() {
    let cfg = config::load_from(&sample_path()).expect("sample config is valid");

    assert_eq!(cfg.max_span().unwrap(), TimeDelta::days(1));
    assert_eq!(cfg.sink.kind, SinkKind::Http);
    assert_eq!(cfg.harvest.artifact_format, TableFormat::Parquet);
    assert_eq!(
        cfg.source.timestamp_format,
        TimestampFormat::pattern("%Y-%m-%d %H:%M:%S")
    );
    assert_eq!(cfg.source.resolution.as_secs(), 3600);
    assert_eq!(
        cfg.initial_position().unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(
        cfg.logging.directives(),
        "info,hyper=warn,reqwest=warn,rustls=warn"
    );
}

#[test]
#[serial]
fn env_path_is_used_when_no_cli_paths_given() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harvest.toml");
    std::fs::copy(sample_path(), &path).unwrap();

    std::env::set_var(ENV_CONFIG_PATH, &path);
    let (_, used) = config::load(&[]).expect("env path resolves");
    assert_eq!(used, path);

    std::env::set_var(ENV_CONFIG_PATH, dir.path().join("missing.toml"));
    assert!(config::load(&[]).is_err());
    std::env::remove_var(ENV_CONFIG_PATH);
}

#[test]
#[serial]
fn cli_paths_take_precedence_over_env() {
    let dir = tempfile::tempdir().unwrap();
    let cli = dir.path().join("cli.toml");
    std::fs::copy(sample_path(), &cli).unwrap();

    std::env::set_var(ENV_CONFIG_PATH, dir.path().join("does-not-matter.toml"));
    let (_, used) = config::load(&[dir.path().join("absent.toml"), cli.clone()]).unwrap();
    assert_eq!(used, cli);
    std::env::remove_var(ENV_CONFIG_PATH);
}

#[test]
#[serial]
fn env_tokens_are_required_when_configured() {
    let cfg = config::load_from(&sample_path()).unwrap();

    std::env::remove_var("HARVEST_SINK_TOKEN");
    let err = cfg.build_uploader().err().expect("token missing");
    assert!(err.to_string().contains("HARVEST_SINK_TOKEN"));

    std::env::set_var("HARVEST_SINK_TOKEN", "sink-token");
    std::env::set_var("HARVEST_CHECKPOINT_TOKEN", "state-token");
    assert_eq!(cfg.build_uploader().unwrap().name(), "http");
    assert_eq!(cfg.build_checkpoint_store().unwrap().name(), "http");
    assert_eq!(cfg.build_fetcher().unwrap().name(), "csv-http");
    std::env::remove_var("HARVEST_SINK_TOKEN");
    std::env::remove_var("HARVEST_CHECKPOINT_TOKEN");
}
