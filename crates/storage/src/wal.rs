// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log for durable storage
//!
//! The log is a single JSON array of entries. Every mutation holds the
//! `<wal>.lock` resource lock, reads the whole array, and replaces the file
//! atomically; transient failures are retried. Reads also take the lock so
//! they never race a rewrite.
//!
//! Callers append the intended mutation here before touching the data file,
//! so a crash between the two leaves the log ahead of the data and replay
//! closes the gap.

use crate::atomic::{read_json, write_json_atomic};
use crate::error::{report, ErrorKind, StorageError, Transient};
use crate::lock::ResourceLock;
use crate::maintenance::{MaintenanceWorker, DEFAULT_STOP_TIMEOUT};
use crate::retry::RetryPolicy;
use mv_core::{Clock, ConfigError, SharedObserver, StoreConfig, WalOperation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur in WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("failed to {action} WAL: {source}")]
    Storage {
        action: &'static str,
        #[source]
        source: StorageError,
    },
    #[error("WAL {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid WAL target file: {0:?}")]
    InvalidTarget(String),
    #[error("invalid WAL cutoff timestamp: {0}")]
    InvalidCutoff(f64),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl WalError {
    fn wrap(action: &'static str, source: StorageError) -> Self {
        match source {
            StorageError::Corrupt { path, source } => WalError::Corrupt { path, source },
            source => WalError::Storage { action, source },
        }
    }
}

impl ErrorKind for WalError {
    fn kind(&self) -> &'static str {
        match self {
            WalError::Storage { source, .. } => source.kind(),
            WalError::Corrupt { .. } => "wal_corrupt",
            WalError::InvalidTarget(_) => "invalid_target",
            WalError::InvalidCutoff(_) => "invalid_cutoff",
            WalError::Config(_) => "invalid_config",
        }
    }
}

impl Transient for WalError {
    // The WAL retries internally; by the time an error escapes, it is final
    fn is_transient(&self) -> bool {
        false
    }
}

/// A single entry in the write-ahead log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Timestamp plus a digest of the entry's content
    pub id: String,
    pub operation: WalOperation,
    /// Path of the document, relative to the data directory
    pub target_file: String,
    /// Full document content for inserts and updates
    pub payload: Value,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl WalEntry {
    pub fn new(operation: WalOperation, target_file: &str, payload: Value, timestamp: f64) -> Self {
        let id = entry_id(timestamp, operation, target_file, &payload);
        Self {
            id,
            operation,
            target_file: target_file.to_string(),
            payload,
            timestamp,
        }
    }
}

/// Derive an entry ID from its timestamp and a digest of its content
///
/// Two entries with identical content and timestamps collide; `append`
/// disambiguates such collisions within one log.
pub fn entry_id(
    timestamp: f64,
    operation: WalOperation,
    target_file: &str,
    payload: &Value,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(target_file.as_bytes());
    hasher.update([0]);
    // serde_json maps are sorted, so equal values hash equally
    hasher.update(payload.to_string().as_bytes());
    let digest = hasher.finalize();
    format!("{:.6}_{}", timestamp, hex_encode(&digest[..8]))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Check a target is a relative path that stays inside its base directory
pub fn validate_target(target_file: &str) -> Result<(), WalError> {
    let path = Path::new(target_file);
    let plain = !target_file.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if plain {
        Ok(())
    } else {
        Err(WalError::InvalidTarget(target_file.to_string()))
    }
}

fn validate_cutoff(timestamp: f64) -> Result<(), WalError> {
    if timestamp.is_finite() {
        Ok(())
    } else {
        Err(WalError::InvalidCutoff(timestamp))
    }
}

/// Write-ahead log handle
///
/// Owns a background thread that periodically drops entries older than the
/// configured retention. The thread stops on [`close`](Self::close) or drop.
pub struct WriteAheadLog<C: Clock> {
    shared: Arc<WalShared<C>>,
    worker: Mutex<Option<MaintenanceWorker>>,
}

struct WalShared<C: Clock> {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    retention: Duration,
    retry: RetryPolicy,
    clock: C,
    observer: SharedObserver,
}

impl<C: Clock> WriteAheadLog<C> {
    /// Open or create the WAL described by `config` and start compaction
    pub fn open(config: &StoreConfig, clock: C, observer: SharedObserver) -> Result<Self, WalError> {
        config.validate()?;
        let path = config.wal_path();
        let mut lock_name = path.clone().into_os_string();
        lock_name.push(".lock");

        let shared = Arc::new(WalShared {
            lock_path: PathBuf::from(lock_name),
            path,
            lock_timeout: config.lock_timeout,
            retention: config.wal.retention,
            retry: RetryPolicy::from(&config.retry).with_observer(Arc::clone(&observer)),
            clock,
            observer,
        });
        shared.initialize()?;

        let compactor = Arc::clone(&shared);
        let worker = MaintenanceWorker::spawn(
            "wal-compaction",
            config.wal.maintenance_interval,
            move || compactor.compact_in_background(),
        )
        .map_err(|e| WalError::wrap("start compaction for", StorageError::io(&shared.path, e)))?;

        tracing::info!(path = %shared.path.display(), "WAL opened");
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Append an operation to the log, returning the new entry's ID
    pub fn append(
        &self,
        operation: WalOperation,
        target_file: &str,
        payload: Value,
    ) -> Result<String, WalError> {
        let started = Instant::now();
        let result = self
            .shared
            .append(operation, target_file, payload)
            .map(|entry| entry.id);
        report(&*self.shared.observer, "wal.append", "wal", started, &result);
        result
    }

    /// Read entries in append order, optionally only those after `since`
    pub fn read_entries(&self, since: Option<f64>) -> Result<Vec<WalEntry>, WalError> {
        let started = Instant::now();
        let result = self.shared.read_entries(since);
        report(&*self.shared.observer, "wal.read", "wal", started, &result);
        result
    }

    /// Remove entries older than `before`, returning how many were removed
    pub fn truncate(&self, before: f64) -> Result<usize, WalError> {
        let started = Instant::now();
        let result = self.shared.truncate(before);
        report(&*self.shared.observer, "wal.truncate", "wal", started, &result);
        result
    }

    /// Drop entries that have aged past the retention window
    pub fn compact(&self) -> Result<usize, WalError> {
        self.truncate(self.shared.retention_horizon())
    }

    /// Number of entries currently in the log
    pub fn len(&self) -> Result<usize, WalError> {
        self.read_entries(None).map(|entries| entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, WalError> {
        self.len().map(|len| len == 0)
    }

    /// Path to the WAL file
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Stop background compaction, waiting a bounded time for it to exit
    pub fn close(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut worker) = worker {
            worker.stop(DEFAULT_STOP_TIMEOUT);
            tracing::info!(path = %self.shared.path.display(), "WAL closed");
        }
    }
}

impl<C: Clock> Drop for WriteAheadLog<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: Clock> std::fmt::Debug for WriteAheadLog<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("path", &self.shared.path)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> WalShared<C> {
    fn initialize(&self) -> Result<(), WalError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| WalError::wrap("create directory for", StorageError::io(parent, e)))?;
        }
        self.retry
            .run("wal.init", || {
                self.locked(|| {
                    if !self.path.exists() {
                        write_json_atomic(&self.path, &Vec::<WalEntry>::new())?;
                        tracing::debug!(path = %self.path.display(), "WAL created");
                    }
                    Ok(())
                })
            })
            .map_err(|e| WalError::wrap("initialize", e))
    }

    fn append(
        &self,
        operation: WalOperation,
        target_file: &str,
        payload: Value,
    ) -> Result<WalEntry, WalError> {
        validate_target(target_file)?;

        self.retry
            .run("wal.append", || {
                self.locked(|| {
                    let mut entries = self.load()?;
                    let now = self.clock.now();
                    let timestamp = entries.last().map_or(now, |last| last.timestamp.max(now));
                    let mut entry = WalEntry::new(operation, target_file, payload.clone(), timestamp);
                    disambiguate_id(&mut entry, &entries);

                    entries.push(entry.clone());
                    self.store(&entries)?;
                    tracing::debug!(id = %entry.id, %operation, target_file, "WAL entry appended");
                    Ok(entry)
                })
            })
            .map_err(|e| WalError::wrap("append to", e))
    }

    fn read_entries(&self, since: Option<f64>) -> Result<Vec<WalEntry>, WalError> {
        if let Some(since) = since {
            validate_cutoff(since)?;
        }
        let entries = self
            .retry
            .run("wal.read", || self.locked(|| self.load()))
            .map_err(|e| WalError::wrap("read", e))?;

        Ok(match since {
            Some(since) => entries.into_iter().filter(|e| e.timestamp > since).collect(),
            None => entries,
        })
    }

    fn truncate(&self, before: f64) -> Result<usize, WalError> {
        validate_cutoff(before)?;
        self.retry
            .run("wal.truncate", || {
                self.locked(|| {
                    let mut entries = self.load()?;
                    let original = entries.len();
                    entries.retain(|e| e.timestamp >= before);
                    let removed = original - entries.len();
                    if removed > 0 {
                        self.store(&entries)?;
                        tracing::info!(removed, remaining = entries.len(), "WAL truncated");
                    }
                    Ok(removed)
                })
            })
            .map_err(|e| WalError::wrap("truncate", e))
    }

    fn retention_horizon(&self) -> f64 {
        self.clock.now() - self.retention.as_secs_f64()
    }

    fn compact_in_background(&self) {
        let started = Instant::now();
        let result = self.truncate(self.retention_horizon());
        report(&*self.observer, "wal.compact", "wal", started, &result);
        match result {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "WAL maintenance removed old entries"),
            Err(e) => tracing::error!(error = %e, "WAL background maintenance failed"),
        }
    }

    fn locked<T>(&self, f: impl FnOnce() -> Result<T, StorageError>) -> Result<T, StorageError> {
        let _lock = ResourceLock::acquire(&self.lock_path, self.lock_timeout)?;
        f()
    }

    fn load(&self) -> Result<Vec<WalEntry>, StorageError> {
        Ok(read_json::<Vec<WalEntry>>(&self.path)?.unwrap_or_default())
    }

    fn store(&self, entries: &[WalEntry]) -> Result<(), StorageError> {
        write_json_atomic(&self.path, entries)
    }
}

fn disambiguate_id(entry: &mut WalEntry, existing: &[WalEntry]) {
    let base = entry.id.clone();
    let mut suffix = 1;
    while existing.iter().any(|e| e.id == entry.id) {
        entry.id = format!("{}-{}", base, suffix);
        suffix += 1;
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
