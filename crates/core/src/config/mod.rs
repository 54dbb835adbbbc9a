// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store configuration
//!
//! Every path, interval and retention count is carried in an explicit
//! [`StoreConfig`] handed to the storage components; nothing is read from the
//! environment. Only `data_dir` is required: the WAL, backup and lock
//! locations default to the layout below and relative overrides are resolved
//! against `data_dir`.
//!
//! ```text
//! <data_dir>/
//!   <resource>.json
//!   memory.wal
//!   memory.wal.lock
//!   .locks/<resource>.lock
//!   backups/<snapshot>/
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default WAL file name inside the data directory
pub const DEFAULT_WAL_FILE: &str = "memory.wal";
/// Default backup directory name inside the data directory
pub const DEFAULT_BACKUP_DIR: &str = "backups";
/// Default lock directory name inside the data directory
pub const DEFAULT_LOCK_DIR: &str = ".locks";

/// Errors that can occur while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Retry settings for transient storage failures
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts allowed after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Factor applied to the delay after each retry
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }
}

/// Background WAL compaction settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// How often the compaction task runs
    #[serde(with = "humantime_serde")]
    pub maintenance_interval: Duration,
    /// Entries older than this are dropped by compaction
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            maintenance_interval: Duration::from_secs(5),
            retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Snapshot and backup settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// How often an automatic snapshot is taken
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Snapshots kept by the automatic cleanup
    pub keep: usize,
    /// File extensions (without the dot) copied into a snapshot
    pub extensions: Vec<String>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            keep: 10,
            extensions: vec!["json".to_string(), "md".to_string(), "txt".to_string()],
        }
    }
}

/// Configuration shared by the WAL, snapshot manager and data store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one JSON document per resource
    pub data_dir: PathBuf,
    /// WAL file, defaults to `<data_dir>/memory.wal`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal_path: Option<PathBuf>,
    /// Snapshot root, defaults to `<data_dir>/backups`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    /// Resource lock directory, defaults to `<data_dir>/.locks`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_dir: Option<PathBuf>,
    /// Maximum wait for any single lock acquisition
    #[serde(default = "default_lock_timeout", with = "humantime_serde")]
    pub lock_timeout: Duration,
    /// Largest document a resource may hold, in bytes
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub wal: WalConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_document_bytes() -> usize {
    1024 * 1024
}

impl StoreConfig {
    /// Default configuration rooted at a data directory
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            wal_path: None,
            backup_dir: None,
            lock_dir: None,
            lock_timeout: default_lock_timeout(),
            max_document_bytes: default_max_document_bytes(),
            retry: RetryConfig::default(),
            wal: WalConfig::default(),
            snapshots: SnapshotConfig::default(),
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.wal_path = Some(path.into());
        self
    }

    pub fn with_backup_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(path.into());
        self
    }

    pub fn with_lock_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(path.into());
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_max_document_bytes(mut self, limit: usize) -> Self {
        self.max_document_bytes = limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_wal_maintenance(mut self, interval: Duration, retention: Duration) -> Self {
        self.wal.maintenance_interval = interval;
        self.wal.retention = retention;
        self
    }

    pub fn with_snapshot_schedule(mut self, interval: Duration, keep: usize) -> Self {
        self.snapshots.interval = interval;
        self.snapshots.keep = keep;
        self
    }

    /// Resolved WAL file path
    pub fn wal_path(&self) -> PathBuf {
        self.resolve(self.wal_path.as_deref(), DEFAULT_WAL_FILE)
    }

    /// Resolved snapshot root
    pub fn backup_dir(&self) -> PathBuf {
        self.resolve(self.backup_dir.as_deref(), DEFAULT_BACKUP_DIR)
    }

    /// Resolved resource lock directory
    pub fn lock_dir(&self) -> PathBuf {
        self.resolve(self.lock_dir.as_deref(), DEFAULT_LOCK_DIR)
    }

    fn resolve(&self, configured: Option<&Path>, default: &str) -> PathBuf {
        match configured {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.data_dir.join(path),
            None => self.data_dir.join(default),
        }
    }

    /// Check invariants the storage components rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }
        if self.lock_timeout.is_zero() {
            return Err(ConfigError::Invalid("lock_timeout must be positive".into()));
        }
        if self.max_document_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_document_bytes must be positive".into(),
            ));
        }
        let backoff = self.retry.backoff_multiplier;
        if backoff.is_nan() || backoff < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.backoff_multiplier must be at least 1.0".into(),
            ));
        }
        if self.wal.maintenance_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "wal.maintenance_interval must be positive".into(),
            ));
        }
        if self.snapshots.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "snapshots.interval must be positive".into(),
            ));
        }
        if self.snapshots.keep == 0 {
            return Err(ConfigError::Invalid("snapshots.keep must be positive".into()));
        }
        if self.snapshots.extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "snapshots.extensions must not be empty".into(),
            ));
        }
        if self.backup_dir() == self.data_dir {
            return Err(ConfigError::Invalid(
                "backup_dir must differ from data_dir".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
