// src/metrics.rs
use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;

/// Prometheus recorder for a one-shot process: there is no scrape endpoint,
/// the exposition is written to a textfile (node-exporter textfile collector)
/// when the run ends.
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global recorder. Call once, before the first run.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Atomically replace `path` with the current exposition.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        crate::atomic::write_atomically(path, self.render().as_bytes())
            .with_context(|| format!("writing metrics textfile {}", path.display()))
    }
}
