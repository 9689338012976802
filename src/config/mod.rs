// src/config/mod.rs
pub mod harvest;

pub use harvest::HarvestConfig;

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "HARVEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATHS: [&str; 2] =
    ["config/harvest.toml", "/etc/ingress-harvester/harvest.toml"];

/// Load a config from an explicit path.
pub fn load_from(path: &Path) -> Result<HarvestConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    HarvestConfig::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
}

/// Resolve and load the config:
/// 1) first existing path in `candidates` (from `--config`)
/// 2) $HARVEST_CONFIG_PATH
/// 3) config/harvest.toml, then /etc/ingress-harvester/harvest.toml
///
/// Returns the config together with the path it came from.
pub fn load(candidates: &[PathBuf]) -> Result<(HarvestConfig, PathBuf)> {
    let path = resolve_path(candidates)?;
    let cfg = load_from(&path)?;
    Ok((cfg, path))
}

fn resolve_path(candidates: &[PathBuf]) -> Result<PathBuf> {
    if !candidates.is_empty() {
        return candidates
            .iter()
            .find(|p| p.exists())
            .cloned()
            .ok_or_else(|| anyhow!("none of the given config files exist: {candidates:?}"));
    }
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        return if pb.exists() {
            Ok(pb)
        } else {
            Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"))
        };
    }
    DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("no config found (tried {DEFAULT_CONFIG_PATHS:?})"))
}
