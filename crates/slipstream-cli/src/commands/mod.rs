//! CLI subcommands.

pub mod config;
pub mod process;

use std::path::{Path, PathBuf};

use slipstream_core::SlipstreamConfig;

/// `<config_dir>/slipstream/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slipstream")
        .join("config.json")
}

/// The file named by `--config`, or the default location.
pub fn config_file(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load configuration for a run.
///
/// An explicit path must exist; a missing default file means defaults.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<SlipstreamConfig> {
    let path = config_file(explicit);
    if path.exists() {
        return read_config(&path);
    }
    if explicit.is_some() {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    Ok(SlipstreamConfig::default())
}

fn read_config(path: &Path) -> anyhow::Result<SlipstreamConfig> {
    SlipstreamConfig::from_file(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))
}
