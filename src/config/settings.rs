//! Configuration settings and validation.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::filter::IgnoreConfig;
use crate::watcher::WatcherConfig;
use crate::{Error, Result};

/// Default number of entries per streamed response batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default interval between store flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Storage backend used for the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreMode {
    /// Embedded ordered key-value store (`sled`).
    #[default]
    Sled,
    /// Embedded relational store (`SQLite`).
    Sqlite,
}

impl StoreMode {
    /// File name of the database inside the data directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Sled => "index.sled",
            Self::Sqlite => "index.db",
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sled => f.write_str("sled"),
            Self::Sqlite => f.write_str("sqlite"),
        }
    }
}

impl FromStr for StoreMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sled" | "kv" => Ok(Self::Sled),
            "sqlite" | "sql" => Ok(Self::Sqlite),
            other => Err(Error::config(format!(
                "invalid store mode '{other}', must be one of: sled, sqlite"
            ))),
        }
    }
}

/// Main configuration for the cache daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory to index and watch.
    pub root: PathBuf,

    /// Unix socket the cache listens on.
    pub socket_path: PathBuf,

    /// Directory for the index database.
    pub data_dir: PathBuf,

    /// Storage backend.
    pub store_mode: StoreMode,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub log_json: bool,

    /// PID file guarding against a second instance.
    pub pid_file: PathBuf,

    /// Interval between store flushes.
    pub flush_interval: Duration,

    /// Window in which filesystem events are merged into one batch.
    pub latency: Duration,

    /// Default number of entries per response batch.
    pub batch_size: usize,

    /// File names treated as per-directory ignore files.
    pub ignore_files: Vec<String>,

    /// Additional global ignore patterns.
    pub extra_ignores: Vec<String>,

    /// Ask the `go` tool for its cache directories.
    pub probe_go_env: bool,

    /// Drop any persisted index on startup and rebuild from the walk.
    pub reset_on_start: bool,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        let cache_dir = home.join(".cache");

        Self {
            root: home,
            socket_path: cache_dir.join("fscache.socket"),
            data_dir: cache_dir.join("fscache"),
            store_mode: StoreMode::default(),
            log_level: "error".to_string(),
            log_json: false,
            pid_file: cache_dir.join("fscache.pid"),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            latency: Duration::from_secs(1),
            batch_size: DEFAULT_BATCH_SIZE,
            ignore_files: vec![".gitignore".to_string(), ".ignore".to_string()],
            extra_ignores: Vec::new(),
            probe_go_env: true,
            reset_on_start: true,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_absolute() {
            return Err(Error::config(format!(
                "root must be an absolute path, got '{}'",
                self.root.display()
            )));
        }

        if self.socket_path.as_os_str().is_empty() {
            return Err(Error::config("socket path cannot be empty"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.flush_interval.is_zero() {
            return Err(Error::config("flush_interval cannot be 0"));
        }

        if self.latency.is_zero() {
            return Err(Error::config("latency cannot be 0"));
        }

        if self.batch_size == 0 {
            return Err(Error::config("batch_size cannot be 0"));
        }

        if self.ignore_files.iter().all(|name| name.trim().is_empty()) {
            return Err(Error::config("ignore_files must name at least one file"));
        }

        Ok(())
    }

    /// Get the path to the index database.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(self.store_mode.file_name())
    }

    /// Watcher settings derived from this configuration.
    #[must_use]
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            latency: self.latency,
            ..WatcherConfig::default()
        }
    }

    /// Global ignore settings derived from this configuration.
    #[must_use]
    pub fn ignore_config(&self) -> IgnoreConfig {
        IgnoreConfig {
            extra_patterns: self.extra_ignores.clone(),
            probe_go_env: self.probe_go_env,
        }
    }
}
