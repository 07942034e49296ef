//! File-backed `tracing` setup. The terminal belongs to the UI, so diagnostics
//! never go to stdout or stderr.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use color_eyre::eyre::{Result, eyre};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

pub const ENV_FILTER_VAR: &str = "HARBORTOP_LOG";

/// Where logs go: the CLI override, then the configured file, then
/// `<cache dir>/harbortop/harbortop.log`.
pub fn log_path(config: &LoggingConfig, cli_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_override {
        return Some(path.to_path_buf());
    }
    if !config.file.is_empty() {
        return Some(PathBuf::from(&config.file));
    }
    dirs::cache_dir().map(|dir| dir.join("harbortop").join("harbortop.log"))
}

/// `HARBORTOP_LOG`, then `RUST_LOG`, then the configured level.
pub fn build_filter(level: &str) -> EnvFilter {
    for var in [ENV_FILTER_VAR, "RUST_LOG"] {
        if let Ok(value) = std::env::var(var)
            && let Ok(filter) = EnvFilter::try_new(&value)
        {
            return filter;
        }
    }
    filter_for_level(level)
}

fn filter_for_level(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global subscriber. Returns the file being written, or `None`
/// when no file could be opened and logging is discarded.
pub fn init(config: &LoggingConfig, cli_override: Option<&Path>) -> Result<Option<PathBuf>> {
    let Some(path) = log_path(config, cli_override) else {
        return Ok(None);
    };
    let file = match open_log_file(&path) {
        Ok(file) => file,
        Err(_) => return Ok(None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(&config.level))
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| eyre!("failed to set tracing subscriber: {e}"))?;
    Ok(Some(path))
}
