//! Configuration file parser for ~/.config/feedstore/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings since they are
//! usually typos.
use serde::Deserialize;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database file. `None` means `feeds.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Connection pool settings.
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            log_filter: "warn".to_string(),
            database: DatabaseConfig::default(),
        }
    }
}

/// SQLite pool settings, the `[database]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite is single-writer; a handful of connections covers concurrent readers.
    pub max_connections: u32,

    /// How long SQLite waits on a lock before returning SQLITE_BUSY.
    pub busy_timeout_ms: u64,

    /// How long to wait for a free pooled connection.
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout_ms: 5000,
            acquire_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 3] = ["database_path", "log_filter", "database"];
    const KNOWN_DATABASE_KEYS: [&'static str; 3] =
        ["max_connections", "busy_timeout_ms", "acquire_timeout_secs"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(content) = Self::read_capped(path)? else {
            tracing::debug!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let raw: toml::Table = content.parse()?;
        for key in Self::unknown_keys(&raw) {
            tracing::warn!(key = %key, path = %path.display(), "Unknown key in config file, ignoring");
        }

        let config: Config = toml::Value::Table(raw).try_into()?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Read the whole file through one handle, refusing anything over
    /// `MAX_FILE_SIZE`. `None` when the file does not exist.
    fn read_capped(path: &Path) -> Result<Option<String>, ConfigError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut content = String::new();
        let read = file.take(Self::MAX_FILE_SIZE + 1).read_to_string(&mut content)?;
        if read as u64 > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "more than {} bytes",
                Self::MAX_FILE_SIZE
            )));
        }
        Ok(Some(content))
    }

    /// Keys the loader does not recognise, `[database]` keys prefixed with
    /// `database.`. Usually typos.
    pub fn unknown_keys(raw: &toml::Table) -> Vec<String> {
        let mut unknown: Vec<String> = raw
            .keys()
            .filter(|key| !Self::KNOWN_KEYS.contains(&key.as_str()))
            .cloned()
            .collect();

        if let Some(toml::Value::Table(database)) = raw.get("database") {
            unknown.extend(
                database
                    .keys()
                    .filter(|key| !Self::KNOWN_DATABASE_KEYS.contains(&key.as_str()))
                    .map(|key| format!("database.{}", key)),
            );
        }
        unknown
    }

    /// Database file to open: the configured path, or `feeds.db` in `config_dir`.
    pub fn resolve_database_path(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("feeds.db"))
    }
}

// ============================================================================
// Tests
// ============================================================================
