//! Tracing subscriber setup
//!
//! Logs go to stdout and, when enabled, are appended to `~/.viva/logs/viva.log`.
//! `RUST_LOG` overrides the configured level.

use anyhow::Context;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;

use crate::config::LoggingConfig;

/// Format timestamps using the system's local time via chrono
struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Directory that holds the log file (~/.viva/logs)
pub fn log_directory() -> PathBuf {
    crate::persistence::data_directory().join("logs")
}

fn open_log_file(dir: &Path) -> anyhow::Result<File> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;
    let path = dir.join("viva.log");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))
}

fn env_filter(level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Installs the global subscriber
///
/// Returns false if a subscriber was already installed. A log file that
/// cannot be opened degrades to stdout-only logging.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let file = if config.log_to_file {
        match open_log_file(&log_directory()) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("File logging disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let stdout_layer = tracing_subscriber::fmt::layer().with_timer(LocalTimer);
    let file_layer = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_timer(LocalTimer)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok()
}
