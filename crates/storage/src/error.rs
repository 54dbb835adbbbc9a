// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error taxonomy
//!
//! Errors are split by whether retrying can help. Lock contention and I/O
//! faults are transient and go through [`RetryPolicy`](crate::RetryPolicy);
//! corrupt documents and caller mistakes fail on the first attempt.

use mv_core::{Outcome, StoreObserver};
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Classifies an error for the retry policy
pub trait Transient {
    /// Whether the failed operation may succeed if attempted again
    fn is_transient(&self) -> bool;
}

/// Short, stable name of an error variant for observers
pub trait ErrorKind {
    fn kind(&self) -> &'static str;
}

/// Errors raised by the file-level primitives
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("timed out after {timeout:?} waiting for lock {}", path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error("file operation failed on {}: {source}", path.display())]
    FileOperation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt JSON document {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize document: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("invalid resource name: {0:?}")]
    InvalidResource(String),

    #[error("document of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::FileOperation {
            path: path.into(),
            source,
        }
    }

    /// Whether the underlying I/O error was "not found"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::FileOperation { source, .. } if source.kind() == io::ErrorKind::NotFound
        )
    }
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::LockTimeout { .. } | StorageError::FileOperation { .. }
        )
    }
}

impl ErrorKind for StorageError {
    fn kind(&self) -> &'static str {
        match self {
            StorageError::LockTimeout { .. } => "lock_timeout",
            StorageError::FileOperation { .. } => "file_operation",
            StorageError::Corrupt { .. } => "corrupt",
            StorageError::Serialize(_) => "serialize",
            StorageError::InvalidResource(_) => "invalid_resource",
            StorageError::PayloadTooLarge { .. } => "payload_too_large",
        }
    }
}

/// Report a finished operation to an observer
pub(crate) fn report<T, E: ErrorKind>(
    observer: &dyn StoreObserver,
    operation: &str,
    component: &str,
    started: Instant,
    result: &Result<T, E>,
) {
    let elapsed = started.elapsed();
    match result {
        Ok(_) => observer.record_operation(operation, elapsed, Outcome::Success),
        Err(e) => {
            observer.record_operation(operation, elapsed, Outcome::Failure);
            observer.record_error(e.kind(), component);
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
