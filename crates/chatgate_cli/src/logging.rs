use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "chatgate.log";

#[must_use]
pub fn log_file_path(config_root: &Path) -> PathBuf {
    config_root.join(LOG_FILE_NAME)
}

/// Routes `tracing` output to `<config root>/chatgate.log`; stdout belongs
/// to the conversation.
pub fn init_file_logging(config_root: &Path) -> anyhow::Result<PathBuf> {
    let log_path = log_file_path(config_root);
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file '{}'", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .try_init()
        .map_err(|error| anyhow!("failed to install log subscriber: {error}"))?;

    Ok(log_path)
}
