//! Configuration management for viva
//!
//! Provides settings storage with schema versioning and migrations.
//! Configuration is stored in `~/.viva/config.json`. Every section is
//! `#[serde(default)]`, so partial files fill in the remaining values and
//! unknown fields are ignored.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::vad::VadConfig;
use crate::interview::controller::InterviewConfig;

/// Current config schema version
pub const CURRENT_VERSION: u32 = 2;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown config version: {0}")]
    UnknownVersion(u32),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Voice activity detection thresholds
    pub vad: VadConfig,
    /// Answer completion and turn timing
    pub interview: InterviewConfig,
    /// Question queue settings
    pub queue: QueueConfig,
    /// Session persistence locations
    pub storage: StorageConfig,
    /// Log output settings
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            vad: VadConfig::default(),
            interview: InterviewConfig::default(),
            queue: QueueConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Question queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of questions in an interview
    pub total_questions: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            total_questions: 10,
        }
    }
}

/// Session persistence configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path (None for ~/.viva/viva.db)
    pub database_path: Option<PathBuf>,
    /// Directory for the file fallback store (None for ~/.viva/sessions)
    pub fallback_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset (e.g. "info", "viva=debug")
    pub level: String,
    /// Also append logs to ~/.viva/logs/viva.log
    pub log_to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: true,
        }
    }
}

/// Get the path to the config file (~/.viva/config.json)
pub fn get_config_path() -> PathBuf {
    crate::persistence::data_directory().join("config.json")
}

/// Load configuration from `path`
///
/// A missing file yields the defaults. Older schema versions are migrated
/// and written back.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&contents)?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;
    if migrated.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            migrated.version
        );
        save_to(path, &migrated)?;
    }

    Ok(migrated)
}

/// Save configuration to `path`, creating the parent directory if needed
pub fn save_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

/// Load the configuration from the default location
///
/// Falls back to defaults (with an error log) when the file is unreadable.
pub fn load() -> Config {
    let path = get_config_path();
    load_from(&path).unwrap_or_else(|e| {
        tracing::error!("Failed to load config, using defaults: {}", e);
        Config::default()
    })
}

/// Save the configuration to the default location
pub fn save(config: &Config) -> Result<(), ConfigError> {
    save_to(&get_config_path(), config)
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config, ConfigError> {
    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }
    if config.version > CURRENT_VERSION {
        return Err(ConfigError::UnknownVersion(config.version));
    }
    Ok(config)
}

/// Apply a single migration step
fn apply_migration(mut config: Config) -> Result<Config, ConfigError> {
    match config.version {
        0 => {
            config.version = 1;
            Ok(config)
        }
        // v2 split storage paths out of the logging section; serde defaults
        // already filled the new section in
        1 => {
            config.version = 2;
            Ok(config)
        }
        v => Err(ConfigError::UnknownVersion(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_current_version() {
        let config = Config::default();
        assert_eq!(config.version, CURRENT_VERSION);
    }

    #[test]
    fn test_interview_defaults() {
        let config = Config::default();
        assert_eq!(config.interview.min_answer_length_words, 10);
        assert_eq!(config.interview.silence_threshold_ms, 2500);
        assert_eq!(config.interview.max_answer_duration_ms, 180_000);
        assert_eq!(config.interview.transition_delay_ms, 1500);
        assert_eq!(config.interview.completion_check_interval_ms, 500);
        assert!(config.interview.interruption_enabled);
    }

    #[test]
    fn test_queue_and_logging_defaults() {
        let config = Config::default();
        assert_eq!(config.queue.total_questions, 10);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.log_to_file);
        assert!(config.storage.database_path.is_none());
    }

    #[test]
    fn test_partial_config_deserialisation() {
        let json = r#"{"version": 2, "interview": {"min_answer_length_words": 3}}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.interview.min_answer_length_words, 3);
        assert_eq!(config.interview.silence_threshold_ms, 2500);
        assert_eq!(config.queue.total_questions, 10);
    }

    #[test]
    fn test_config_unknown_fields_ignored() {
        let json = r#"{"version": 2, "unknown_field": true, "vad": {"extra": 1}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.version, 2);
    }

    #[test]
    fn test_migration_from_version_0() {
        let old = Config {
            version: 0,
            ..Default::default()
        };
        let migrated = migrate_config(old).unwrap();
        assert_eq!(migrated.version, CURRENT_VERSION);
    }

    #[test]
    fn test_future_version_rejected() {
        let future = Config {
            version: 999,
            ..Default::default()
        };
        assert!(matches!(
            migrate_config(future),
            Err(ConfigError::UnknownVersion(999))
        ));
    }

    #[test]
    fn test_config_path_format() {
        let path = get_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.contains(".viva"));
        assert!(path_str.ends_with("config.json"));
    }
}
