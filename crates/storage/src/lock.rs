// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory per-resource file locks
//!
//! A lock is a file holding the owner's PID while an exclusive `flock` is
//! held on it. Acquisition polls a non-blocking lock until a deadline;
//! release unlinks the file before unlocking, and a waiter that wins the lock
//! on an already-unlinked file starts over on a fresh one.
//!
//! The lock is cooperative: a process that writes data files without going
//! through this module is not excluded.

use crate::error::StorageError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Delay between attempts while another holder owns the lock
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive hold on a lock file, released on drop
#[derive(Debug)]
pub struct ResourceLock {
    path: PathBuf,
    file: Option<File>,
}

impl ResourceLock {
    /// Acquire the lock at `path`, waiting at most `timeout`
    ///
    /// Fails with [`StorageError::LockTimeout`] if another holder keeps the
    /// lock past the deadline, or [`StorageError::FileOperation`] straight
    /// away for any other OS error. A timeout too large to represent as an
    /// instant waits without a deadline.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, StorageError> {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(|e| StorageError::io(path, e))?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    if !still_linked(&file, path)? {
                        tracing::trace!(path = %path.display(), "lock file replaced, retrying");
                        continue;
                    }
                    let mut lock = Self {
                        path: path.to_path_buf(),
                        file: Some(file),
                    };
                    lock.stamp_pid()?;
                    tracing::debug!(path = %path.display(), "lock acquired");
                    return Ok(lock);
                }
                Err(e) if is_contended(&e) => {}
                Err(e) => return Err(StorageError::io(path, e)),
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(StorageError::LockTimeout {
                            path: path.to_path_buf(),
                            timeout,
                        });
                    }
                    POLL_INTERVAL.min(deadline - now)
                }
                None => POLL_INTERVAL,
            };
            std::thread::sleep(wait);
        }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock (same as dropping it)
    pub fn release(mut self) {
        self.release_inner();
    }

    fn stamp_pid(&mut self) -> Result<(), StorageError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let pid = std::process::id().to_string();
        file.set_len(0)
            .and_then(|()| file.write_all(pid.as_bytes()))
            .and_then(|()| file.sync_all())
            .map_err(|e| StorageError::io(&self.path, e))
    }

    fn release_inner(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };

        // Unlink while still holding the lock so waiters on this inode
        // notice it is stale once they get it
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock file")
            }
        }
        if let Err(e) = FileExt::unlock(&file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to unlock");
        }
        drop(file);
        tracing::debug!(path = %self.path.display(), "lock released");
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// PID recorded in a lock file, if it is currently held
pub fn holder_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Check a resource name is a plain identifier (`[A-Za-z0-9_-]+`)
pub fn validate_resource_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidResource(name.to_string()))
    }
}

/// Directory of named resource locks (`<dir>/<resource>.lock`)
#[derive(Debug, Clone)]
pub struct LockDir {
    dir: PathBuf,
    timeout: Duration,
}

impl LockDir {
    /// Open the lock directory, creating it if needed
    pub fn open(dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        Ok(Self { dir, timeout })
    }

    /// Lock file path for a resource
    pub fn path_for(&self, resource: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", resource))
    }

    /// Acquire the lock for a resource with the configured timeout
    pub fn acquire(&self, resource: &str) -> Result<ResourceLock, StorageError> {
        validate_resource_name(resource)?;
        ResourceLock::acquire(&self.path_for(resource), self.timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Whether `path` still names the file we hold open
#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> Result<bool, StorageError> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata().map_err(|e| StorageError::io(path, e))?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(current.dev() == held.dev() && current.ino() == held.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, _path: &Path) -> Result<bool, StorageError> {
    Ok(true)
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
