// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic file replacement
//!
//! New contents go to a temporary file in the target's directory, are
//! fsync'd, then renamed over the target. The rename stays on one
//! filesystem, so a reader sees either the old document or the new one.
//! If anything fails before the rename the temporary file is removed and
//! the target is untouched.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `contents`
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    write_atomic_with(path, |file| file.write_all(contents))
}

/// Replace `path` with whatever `write` produces
///
/// An error returned by `write` aborts the replacement.
pub fn write_atomic_with<F>(path: &Path, write: F) -> Result<(), StorageError>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let dir = parent_dir(path);
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(path, e))?;

    write(temp.as_file_mut()).map_err(|e| StorageError::io(path, e))?;
    temp.as_file_mut()
        .flush()
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| StorageError::io(path, e))?;

    // Dropping the PersistError drops the temp file, which unlinks it
    temp.persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;

    sync_dir(dir);
    Ok(())
}

/// Serialize `value` as pretty JSON and replace `path` with it
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(StorageError::Serialize)?;
    write_atomic(path, &bytes)
}

/// Replace `to` with a byte-for-byte copy of `from`
pub fn copy_atomic(from: &Path, to: &Path) -> Result<(), StorageError> {
    let mut source = File::open(from).map_err(|e| StorageError::io(from, e))?;
    write_atomic_with(to, |file| io::copy(&mut source, file).map(|_| ()))
}

/// Read and parse a JSON document, `None` if the file does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StorageError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Remove a file, treating absence as success
///
/// Returns whether a file was removed.
pub fn remove_if_exists(path: &Path) -> Result<bool, StorageError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            sync_dir(parent_dir(path));
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Persist the directory entry after a rename or unlink (best-effort)
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(dir = %dir.display(), error = %e, "directory sync failed");
    }
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) {}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
