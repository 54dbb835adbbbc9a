// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot management for the data directory
//!
//! A snapshot is a directory under the backup directory holding copies of
//! the data files plus a `metadata.json` record. Snapshots are staged in a
//! hidden `.partial-<name>` directory and renamed into place once complete,
//! so a listing never sees a half-built one.
//!
//! Restores and WAL replay are deliberately weak: restore only adds or
//! overwrites files, and replay skips entries it cannot apply.

use crate::atomic::{copy_atomic, read_json, remove_if_exists, sync_dir, write_json_atomic};
use crate::error::{report, ErrorKind, StorageError, Transient};
use crate::lock::{validate_resource_name, LockDir, ResourceLock};
use crate::maintenance::{MaintenanceWorker, DEFAULT_STOP_TIMEOUT};
use crate::retry::RetryPolicy;
use crate::wal::{validate_target, WalEntry, WalError, WriteAheadLog};
use mv_core::{Clock, ConfigError, SharedObserver, StoreConfig};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Instant, UNIX_EPOCH};
use thiserror::Error;

/// File name of the metadata record inside a snapshot
pub const METADATA_FILE: &str = "metadata.json";

const STAGING_PREFIX: &str = ".partial-";

/// Errors that can occur during snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot not found: {0}")]
    NotFound(String),
    #[error("snapshot already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid snapshot name: {0:?}")]
    InvalidName(String),
    #[error("failed to create snapshot {name}: {source}")]
    Backup {
        name: String,
        #[source]
        source: StorageError,
    },
    #[error("failed to restore snapshot {name}: {source}")]
    Restore {
        name: String,
        #[source]
        source: StorageError,
    },
    #[error("cannot recover from WAL: {0}")]
    Recovery(#[source] WalError),
    #[error("cannot list snapshots: {0}")]
    Listing(#[source] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ErrorKind for SnapshotError {
    fn kind(&self) -> &'static str {
        match self {
            SnapshotError::NotFound(_) => "snapshot_not_found",
            SnapshotError::AlreadyExists(_) => "snapshot_exists",
            SnapshotError::InvalidName(_) => "invalid_snapshot_name",
            SnapshotError::Backup { .. } => "backup",
            SnapshotError::Restore { .. } => "restore",
            SnapshotError::Recovery(_) => "recovery",
            SnapshotError::Listing(_) => "listing",
            SnapshotError::Config(_) => "invalid_config",
        }
    }
}

impl Transient for SnapshotError {
    fn is_transient(&self) -> bool {
        false
    }
}

/// Contents of a snapshot's `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub snapshot_name: String,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub data_path: PathBuf,
    pub files_count: usize,
    /// WAL entry count when the snapshot was taken, if the WAL was readable
    pub wal_position: Option<u64>,
}

/// A snapshot as seen by [`SnapshotManager::list_snapshots`]
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotInfo {
    pub name: String,
    pub path: PathBuf,
    pub timestamp: f64,
    pub files_count: usize,
    pub wal_position: Option<u64>,
    /// False when the timestamp and count came from the filesystem
    pub has_metadata: bool,
}

/// Check a snapshot name is usable as a directory name
///
/// Names are ASCII letters, digits, `_`, `-` and `.`, and may not start
/// with `.` (hidden directories are reserved for staging).
pub fn validate_snapshot_name(name: &str) -> Result<(), SnapshotError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(SnapshotError::InvalidName(name.to_string()))
    }
}

/// Check a name can be looked up in the backup directory
///
/// Looser than [`validate_snapshot_name`] so snapshot directories created by
/// hand can still be restored; only names that would escape the backup
/// directory or name a staging directory are refused.
fn validate_lookup_name(name: &str) -> Result<(), SnapshotError> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if single && !name.starts_with('.') && !name.contains(['/', '\\']) {
        Ok(())
    } else {
        Err(SnapshotError::InvalidName(name.to_string()))
    }
}

/// Creates, lists, restores and prunes snapshots, and replays the WAL
///
/// Owns a background thread that takes an `auto_<secs>` snapshot on every
/// interval and prunes to the configured retention count.
pub struct SnapshotManager<C: Clock> {
    inner: Arc<SnapshotInner<C>>,
    worker: Mutex<Option<MaintenanceWorker>>,
}

struct SnapshotInner<C: Clock> {
    data_dir: PathBuf,
    backup_dir: PathBuf,
    extensions: Vec<String>,
    keep: usize,
    locks: LockDir,
    wal: Arc<WriteAheadLog<C>>,
    retry: RetryPolicy,
    clock: C,
    observer: SharedObserver,
}

impl<C: Clock> SnapshotManager<C> {
    /// Open a manager with its own WAL handle
    pub fn open(config: &StoreConfig, clock: C, observer: SharedObserver) -> Result<Self, SnapshotError> {
        config.validate()?;
        let wal = WriteAheadLog::open(config, clock.clone(), Arc::clone(&observer))
            .map_err(SnapshotError::Recovery)?;
        Self::with_wal(config, Arc::new(wal), clock, observer)
    }

    /// Open a manager sharing an existing WAL handle
    pub fn with_wal(
        config: &StoreConfig,
        wal: Arc<WriteAheadLog<C>>,
        clock: C,
        observer: SharedObserver,
    ) -> Result<Self, SnapshotError> {
        config.validate()?;
        let backup_dir = config.backup_dir();
        fs::create_dir_all(&backup_dir)
            .map_err(|e| SnapshotError::Listing(StorageError::io(&backup_dir, e)))?;
        let locks = LockDir::open(config.lock_dir(), config.lock_timeout).map_err(SnapshotError::Listing)?;

        let inner = Arc::new(SnapshotInner {
            data_dir: config.data_dir.clone(),
            backup_dir,
            extensions: config
                .snapshots
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_string())
                .collect(),
            keep: config.snapshots.keep,
            locks,
            wal,
            retry: RetryPolicy::from(&config.retry).with_observer(Arc::clone(&observer)),
            clock,
            observer,
        });

        let scheduled = Arc::clone(&inner);
        let worker = MaintenanceWorker::spawn("auto-snapshot", config.snapshots.interval, move || {
            scheduled.auto_snapshot()
        })
        .map_err(|e| SnapshotError::Listing(StorageError::io(&inner.backup_dir, e)))?;

        tracing::info!(
            data_dir = %inner.data_dir.display(),
            backup_dir = %inner.backup_dir.display(),
            "snapshot manager opened"
        );
        Ok(Self {
            inner,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Copy the data files into a new snapshot, returning its name
    ///
    /// Without a name, `snapshot_<unix-secs>` is used (suffixed if taken).
    pub fn create_snapshot(&self, name: Option<&str>) -> Result<String, SnapshotError> {
        let started = Instant::now();
        let result = self.inner.create(name, "snapshot");
        report(&*self.inner.observer, "snapshot.create", "snapshot", started, &result);
        result
    }

    /// Copy a snapshot's files into `target` (default: the data directory)
    ///
    /// Files in `target` that are not in the snapshot are left alone.
    /// Returns the number of files restored.
    pub fn restore_snapshot(&self, name: &str, target: Option<&Path>) -> Result<usize, SnapshotError> {
        let started = Instant::now();
        let result = self.inner.restore(name, target);
        report(&*self.inner.observer, "snapshot.restore", "snapshot", started, &result);
        result
    }

    /// All snapshots, newest first
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, SnapshotError> {
        let started = Instant::now();
        let result = self.inner.list();
        report(&*self.inner.observer, "snapshot.list", "snapshot", started, &result);
        result
    }

    /// Delete all but the newest `keep` snapshots, returning how many went
    pub fn cleanup_old_snapshots(&self, keep: usize) -> Result<usize, SnapshotError> {
        let started = Instant::now();
        let result = self.inner.cleanup(keep);
        report(&*self.inner.observer, "snapshot.cleanup", "snapshot", started, &result);
        result
    }

    /// Replay WAL entries onto `target` (default: the data directory)
    ///
    /// Entries are applied oldest first; one that fails is logged and
    /// skipped. Returns the number applied.
    pub fn recover_from_wal(&self, target: Option<&Path>, since: Option<f64>) -> Result<usize, SnapshotError> {
        let started = Instant::now();
        let result = self.inner.recover(target, since);
        report(&*self.inner.observer, "snapshot.recover", "snapshot", started, &result);
        result
    }

    pub fn backup_dir(&self) -> &Path {
        &self.inner.backup_dir
    }

    pub fn wal(&self) -> &Arc<WriteAheadLog<C>> {
        &self.inner.wal
    }

    /// Stop automatic snapshots and close the WAL
    pub fn close(&self) {
        self.stop_worker();
        self.inner.wal.close();
    }

    fn stop_worker(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut worker) = worker {
            worker.stop(DEFAULT_STOP_TIMEOUT);
            tracing::info!(backup_dir = %self.inner.backup_dir.display(), "snapshot manager closed");
        }
    }
}

impl<C: Clock> Drop for SnapshotManager<C> {
    fn drop(&mut self) {
        // The WAL may be shared; it closes itself when its last handle drops
        self.stop_worker();
    }
}

impl<C: Clock> std::fmt::Debug for SnapshotManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotManager")
            .field("data_dir", &self.inner.data_dir)
            .field("backup_dir", &self.inner.backup_dir)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> SnapshotInner<C> {
    fn create(&self, name: Option<&str>, default_prefix: &str) -> Result<String, SnapshotError> {
        let timestamp = self.clock.now();
        let name = match name {
            Some(name) => {
                validate_snapshot_name(name)?;
                if self.backup_dir.join(name).exists() {
                    return Err(SnapshotError::AlreadyExists(name.to_string()));
                }
                name.to_string()
            }
            None => self.unused_name(default_prefix, timestamp),
        };

        let staging = self.backup_dir.join(format!("{}{}", STAGING_PREFIX, name));
        let files_count = self
            .retry
            .run("snapshot.create", || {
                let result = self.stage(&staging, &name, timestamp);
                if result.is_err() {
                    discard(&staging);
                }
                result
            })
            .map_err(|source| SnapshotError::Backup {
                name: name.clone(),
                source,
            })?;

        tracing::info!(snapshot = %name, files_count, "snapshot created");
        Ok(name)
    }

    fn unused_name(&self, prefix: &str, timestamp: f64) -> String {
        let base = format!("{}_{}", prefix, timestamp.max(0.0).floor() as u64);
        let mut name = base.clone();
        let mut suffix = 1;
        while self.backup_dir.join(&name).exists() {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        name
    }

    /// Build a complete snapshot in `staging` and move it into place
    fn stage(&self, staging: &Path, name: &str, timestamp: f64) -> Result<usize, StorageError> {
        if staging.exists() {
            fs::remove_dir_all(staging).map_err(|e| StorageError::io(staging, e))?;
        }
        fs::create_dir_all(staging).map_err(|e| StorageError::io(staging, e))?;

        let mut files_count = 0;
        for source in self.data_files()? {
            if let Some(file_name) = source.file_name() {
                copy_atomic(&source, &staging.join(file_name))?;
                files_count += 1;
            }
        }

        let metadata = SnapshotMetadata {
            snapshot_name: name.to_string(),
            timestamp,
            data_path: self.data_dir.clone(),
            files_count,
            wal_position: self.wal_position(),
        };
        write_json_atomic(&staging.join(METADATA_FILE), &metadata)?;

        let destination = self.backup_dir.join(name);
        fs::rename(staging, &destination).map_err(|e| StorageError::io(&destination, e))?;
        sync_dir(&self.backup_dir);
        Ok(files_count)
    }

    /// Top-level data files with an allowed extension, sorted by name
    fn data_files(&self) -> Result<Vec<PathBuf>, StorageError> {
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.data_dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.data_dir, e))?;
            let path = entry.path();
            let allowed = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext));
            if allowed && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn wal_position(&self) -> Option<u64> {
        match self.wal.len() {
            Ok(len) => Some(len as u64),
            Err(e) => {
                tracing::warn!(error = %e, "WAL unreadable, snapshot recorded without position");
                None
            }
        }
    }

    fn restore(&self, name: &str, target: Option<&Path>) -> Result<usize, SnapshotError> {
        validate_lookup_name(name)?;
        let snapshot_dir = self.backup_dir.join(name);
        if !snapshot_dir.is_dir() {
            return Err(SnapshotError::NotFound(name.to_string()));
        }
        let target = target.unwrap_or(&self.data_dir);
        let restore_err = |source: StorageError| SnapshotError::Restore {
            name: name.to_string(),
            source,
        };

        if let Ok(Some(metadata)) = read_json::<SnapshotMetadata>(&snapshot_dir.join(METADATA_FILE)) {
            tracing::debug!(snapshot = name, timestamp = metadata.timestamp, "restoring snapshot");
        }

        fs::create_dir_all(target).map_err(|e| restore_err(StorageError::io(target, e)))?;
        let guarded = same_dir(target, &self.data_dir);

        let mut restored = 0;
        for source in snapshot_files(&snapshot_dir).map_err(restore_err)? {
            let Some(file_name) = source.file_name() else {
                continue;
            };
            let destination = target.join(file_name);
            let _lock = if guarded {
                self.lock_for(Path::new(file_name)).map_err(restore_err)?
            } else {
                None
            };
            copy_atomic(&source, &destination).map_err(restore_err)?;
            restored += 1;
        }

        tracing::info!(snapshot = name, target = %target.display(), restored, "snapshot restored");
        Ok(restored)
    }

    fn list(&self) -> Result<Vec<SnapshotInfo>, SnapshotError> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SnapshotError::Listing(StorageError::io(&self.backup_dir, e))),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(backup_dir = %self.backup_dir.display(), error = %e, "skipping unreadable backup entry");
                    continue;
                }
            };
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !path.is_dir() {
                continue;
            }
            snapshots.push(describe(name, path));
        }

        snapshots.sort_by(|a, b| {
            b.timestamp
                .total_cmp(&a.timestamp)
                .then_with(|| natural_cmp(&b.name, &a.name))
        });
        Ok(snapshots)
    }

    fn cleanup(&self, keep: usize) -> Result<usize, SnapshotError> {
        let mut removed = 0;
        for snapshot in self.list()?.into_iter().skip(keep) {
            match fs::remove_dir_all(&snapshot.path) {
                Ok(()) => {
                    tracing::debug!(snapshot = %snapshot.name, "old snapshot removed");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(snapshot = %snapshot.name, error = %e, "failed to remove old snapshot");
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, keep, "old snapshots cleaned up");
        }
        Ok(removed)
    }

    fn recover(&self, target: Option<&Path>, since: Option<f64>) -> Result<usize, SnapshotError> {
        let entries = self.wal.read_entries(since).map_err(SnapshotError::Recovery)?;
        let target = target.unwrap_or(&self.data_dir);
        let guarded = same_dir(target, &self.data_dir);

        let mut replayed = 0;
        for entry in &entries {
            match self.replay(entry, target, guarded) {
                Ok(()) => replayed += 1,
                Err(e) => tracing::warn!(
                    id = %entry.id,
                    operation = %entry.operation,
                    target_file = %entry.target_file,
                    error = %e,
                    "skipping WAL entry that could not be replayed"
                ),
            }
        }

        tracing::info!(target = %target.display(), replayed, total = entries.len(), "WAL replay finished");
        Ok(replayed)
    }

    fn replay(&self, entry: &WalEntry, target: &Path, guarded: bool) -> Result<(), StorageError> {
        if validate_target(&entry.target_file).is_err() {
            return Err(StorageError::InvalidResource(entry.target_file.clone()));
        }
        let relative = Path::new(&entry.target_file);
        let path = target.join(relative);
        let _lock = if guarded { self.lock_for(relative)? } else { None };

        if entry.operation.writes_content() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            }
            write_json_atomic(&path, &entry.payload)
        } else {
            remove_if_exists(&path).map(|_| ())
        }
    }

    /// Resource lock for a top-level data file, if it names a resource
    fn lock_for(&self, relative: &Path) -> Result<Option<ResourceLock>, StorageError> {
        if relative.components().count() != 1 {
            return Ok(None);
        }
        match relative.file_stem().and_then(|stem| stem.to_str()) {
            Some(resource) if validate_resource_name(resource).is_ok() => {
                self.locks.acquire(resource).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn auto_snapshot(&self) {
        let started = Instant::now();
        let result = self.create(None, "auto");
        report(&*self.observer, "snapshot.auto", "snapshot", started, &result);
        if let Err(e) = result {
            tracing::error!(error = %e, "automatic snapshot failed");
            return;
        }
        if let Err(e) = self.cleanup(self.keep) {
            tracing::error!(error = %e, "automatic snapshot cleanup failed");
        }
    }
}

/// Describe one snapshot directory, falling back to filesystem data
fn describe(name: String, path: PathBuf) -> SnapshotInfo {
    match read_json::<SnapshotMetadata>(&path.join(METADATA_FILE)) {
        Ok(Some(metadata)) => {
            return SnapshotInfo {
                name,
                path,
                timestamp: metadata.timestamp,
                files_count: metadata.files_count,
                wal_position: metadata.wal_position,
                has_metadata: true,
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(snapshot = %name, error = %e, "unreadable snapshot metadata"),
    }

    SnapshotInfo {
        timestamp: modified_secs(&path),
        files_count: snapshot_files(&path).map(|files| files.len()).unwrap_or(0),
        wal_position: None,
        has_metadata: false,
        name,
        path,
    }
}

fn modified_secs(path: &Path) -> f64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map_or(0.0, |elapsed| elapsed.as_secs_f64())
}

/// Regular files in a snapshot other than its metadata, sorted by name
fn snapshot_files(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))? {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() && entry.file_name() != METADATA_FILE {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Compare names with digit runs ordered by value, so `x_2` sorts before `x_10`
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a.as_bytes(), b.as_bytes());
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (digits_a, rest_a) = split_digits(a);
                let (digits_b, rest_b) = split_digits(b);
                let order = digits_a
                    .len()
                    .cmp(&digits_b.len())
                    .then_with(|| digits_a.cmp(digits_b));
                if order != Ordering::Equal {
                    return order;
                }
                (a, b) = (rest_a, rest_b);
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(y);
                }
                (a, b) = (&a[1..], &b[1..]);
            }
        }
    }
}

/// Split off a leading digit run with its leading zeros dropped
fn split_digits(s: &[u8]) -> (&[u8], &[u8]) {
    let len = s.iter().take_while(|c| c.is_ascii_digit()).count();
    let (digits, rest) = s.split_at(len);
    let zeros = digits.iter().take_while(|&&c| c == b'0').count();
    (&digits[zeros..], rest)
}

fn discard(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %staging.display(), error = %e, "failed to remove partial snapshot");
        }
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
