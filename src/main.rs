//! ingress-harvester: binary entrypoint.
//! Loads configuration, wires the source/sink/checkpoint adapters and performs
//! exactly one harvest run. Exit status is non-zero when the run aborts.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ingress_harvester::config::{self, harvest::LoggingSection};
use ingress_harvester::metrics::Metrics;
use ingress_harvester::timefmt::TimestampFormat;
use ingress_harvester::{Harvester, RunMode};

#[derive(Debug, Parser)]
#[command(name = "ingress-harvester", version, about = "Harvest a time-windowed source into an ingress sink")]
struct Args {
    /// Config file(s); the first one that exists is used.
    #[arg(long = "config", value_name = "PATH", num_args = 1..)]
    config: Vec<PathBuf>,

    /// Harvest an explicit range starting here instead of the stored checkpoint.
    #[arg(long, value_parser = parse_timestamp_arg)]
    from: Option<DateTime<Utc>>,

    /// End of the explicit range (exclusive). Defaults to now.
    #[arg(long, requires = "from", value_parser = parse_timestamp_arg)]
    to: Option<DateTime<Utc>>,
}

fn parse_timestamp_arg(s: &str) -> Result<DateTime<Utc>, String> {
    TimestampFormat::Flexible
        .parse(s)
        .map_err(|e| format!("{e:#}"))
}

/// `--from` selects an explicit range; `--to` defaults to `now`.
fn run_mode(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> anyhow::Result<RunMode> {
    let Some(start) = from else {
        return Ok(RunMode::Recurring);
    };
    let end = to.unwrap_or(now);
    if end < start {
        anyhow::bail!("--to {end} is before --from {start}");
    }
    Ok(RunMode::Explicit { start, end })
}

/// `RUST_LOG` wins; otherwise the config's filter plus its muted labels.
fn init_tracing(logging: &LoggingSection) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.directives()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let (cfg, path) = config::load(&args.config)?;
    init_tracing(&cfg.logging);
    info!(config = %path.display(), "configuration loaded");

    let metrics = match &cfg.metrics.textfile {
        Some(_) => Some(Metrics::install()?),
        None => None,
    };

    let harvester = Harvester::new(
        cfg.build_fetcher()?,
        cfg.build_uploader()?,
        cfg.build_checkpoint_store()?,
        cfg.max_span()?,
    );

    let mode = run_mode(args.from, args.to, Utc::now())?;

    let result = harvester.run(mode).await;

    if let (Some(m), Some(p)) = (&metrics, &cfg.metrics.textfile) {
        if let Err(e) = m.write_textfile(p) {
            warn!(error = ?e, "metrics textfile not written");
        }
    }

    let summary = result?;
    info!(
        windows = summary.windows,
        batches = summary.batches_uploaded,
        checkpoints = summary.checkpoints_saved,
        position = %summary.final_position,
        stop = ?summary.stop,
        "harvest complete"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent. Carries HARVEST_* tokens.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Tracing is not up yet when config loading failed.
            if tracing::dispatcher::has_been_set() {
                error!("{e:#}");
            } else {
                eprintln!("ingress-harvester: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}
