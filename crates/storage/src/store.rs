// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock-guarded JSON resources
//!
//! Each resource is one document at `<data_dir>/<name>.json`, guarded by
//! `<lock_dir>/<name>.lock`. A mutation holds the resource lock across the
//! whole read-compute-write cycle and logs the complete new document to the
//! WAL before replacing the file.
//!
//! Mutations of different resources are independent; there is no
//! atomicity across resources.

use crate::atomic::{read_json, remove_if_exists, write_atomic};
use crate::error::{report, ErrorKind, StorageError, Transient};
use crate::lock::{validate_resource_name, LockDir};
use crate::retry::RetryPolicy;
use crate::wal::{WalError, WriteAheadLog};
use mv_core::{Clock, ConfigError, SharedObserver, StoreConfig, WalOperation};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

const DOCUMENT_EXTENSION: &str = "json";

/// Errors from data store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error("resource {resource} is not a JSON {expected}")]
    Shape {
        resource: String,
        expected: &'static str,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Storage(e) => e.is_transient(),
            StoreError::Wal(_) | StoreError::Shape { .. } | StoreError::Config(_) => false,
        }
    }
}

impl ErrorKind for StoreError {
    fn kind(&self) -> &'static str {
        match self {
            StoreError::Storage(e) => e.kind(),
            StoreError::Wal(e) => e.kind(),
            StoreError::Shape { .. } => "shape",
            StoreError::Config(_) => "invalid_config",
        }
    }
}

/// Named JSON documents in the data directory
pub struct DataStore<C: Clock> {
    data_dir: PathBuf,
    locks: LockDir,
    wal: Arc<WriteAheadLog<C>>,
    retry: RetryPolicy,
    max_document_bytes: usize,
    observer: SharedObserver,
}

impl<C: Clock> DataStore<C> {
    /// Open the store, creating the data and lock directories
    pub fn open(
        config: &StoreConfig,
        wal: Arc<WriteAheadLog<C>>,
        observer: SharedObserver,
    ) -> Result<Self, StoreError> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| StorageError::io(&config.data_dir, e))?;
        let locks = LockDir::open(config.lock_dir(), config.lock_timeout)?;

        Ok(Self {
            data_dir: config.data_dir.clone(),
            locks,
            wal,
            retry: RetryPolicy::from(&config.retry).with_observer(Arc::clone(&observer)),
            max_document_bytes: config.max_document_bytes,
            observer,
        })
    }

    /// Path of a resource's document
    pub fn path_for(&self, resource: &str) -> PathBuf {
        self.data_dir.join(document_name(resource))
    }

    /// Current document, `None` if the resource has never been written
    pub fn read(&self, resource: &str) -> Result<Option<Value>, StoreError> {
        self.observed("store.read", || {
            validate_resource_name(resource)?;
            let path = self.path_for(resource);
            self.retry.run("store.read", || -> Result<_, StoreError> {
                let _lock = self.locks.acquire(resource)?;
                Ok(read_json::<Value>(&path)?)
            })
        })
    }

    /// Records of an array resource; empty if it does not exist yet
    pub fn read_records(&self, resource: &str) -> Result<Vec<Value>, StoreError> {
        match self.read(resource)? {
            None => Ok(Vec::new()),
            Some(Value::Array(records)) => Ok(records),
            Some(_) => Err(shape(resource, "array")),
        }
    }

    /// Replace a resource's document
    pub fn write(&self, resource: &str, document: &Value) -> Result<(), StoreError> {
        self.observed("store.write", || {
            self.mutate(resource, |_| Ok(document.clone())).map(|_| ())
        })
    }

    /// Append one record to an array resource, returning the new length
    pub fn append_record(&self, resource: &str, record: Value) -> Result<usize, StoreError> {
        self.observed("store.append", || {
            let document = self.mutate(resource, |current| {
                let mut records = match current {
                    None => Vec::new(),
                    Some(Value::Array(records)) => records,
                    Some(_) => return Err(shape(resource, "array")),
                };
                records.push(record.clone());
                Ok(Value::Array(records))
            })?;
            Ok(document.as_array().map_or(0, Vec::len))
        })
    }

    /// Read-modify-write a resource under its lock
    ///
    /// `f` receives the current document and returns the new one. It may run
    /// more than once if a transient failure forces a retry.
    pub fn update<F>(&self, resource: &str, f: F) -> Result<Value, StoreError>
    where
        F: FnMut(Option<Value>) -> Result<Value, StoreError>,
    {
        self.observed("store.update", || self.mutate(resource, f))
    }

    /// Create a resource with `default` if it does not exist
    ///
    /// Returns whether the resource was created.
    pub fn ensure(&self, resource: &str, default: &Value) -> Result<bool, StoreError> {
        self.observed("store.ensure", || {
            validate_resource_name(resource)?;
            let path = self.path_for(resource);
            self.retry.run("store.ensure", || -> Result<_, StoreError> {
                let _lock = self.locks.acquire(resource)?;
                if path.exists() {
                    return Ok(false);
                }
                self.commit(resource, &path, WalOperation::Insert, default)?;
                Ok(true)
            })
        })
    }

    /// Remove a resource, returning whether it existed
    pub fn delete(&self, resource: &str) -> Result<bool, StoreError> {
        self.observed("store.delete", || {
            validate_resource_name(resource)?;
            let path = self.path_for(resource);
            self.retry.run("store.delete", || -> Result<_, StoreError> {
                let _lock = self.locks.acquire(resource)?;
                if !path.exists() {
                    return Ok(false);
                }
                self.wal.append(
                    WalOperation::Delete,
                    &document_name(resource),
                    Value::Object(Default::default()),
                )?;
                Ok(remove_if_exists(&path)?)
            })
        })
    }

    /// Names of all resources in the data directory, sorted
    pub fn resources(&self) -> Result<Vec<String>, StoreError> {
        let entries = std::fs::read_dir(&self.data_dir)
            .map_err(|e| StorageError::io(&self.data_dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StorageError::io(&self.data_dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(DOCUMENT_EXTENSION) || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if validate_resource_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn mutate<F>(&self, resource: &str, mut f: F) -> Result<Value, StoreError>
    where
        F: FnMut(Option<Value>) -> Result<Value, StoreError>,
    {
        validate_resource_name(resource)?;
        let path = self.path_for(resource);
        self.retry.run("store.mutate", || -> Result<_, StoreError> {
            let _lock = self.locks.acquire(resource)?;
            let current: Option<Value> = read_json(&path)?;
            let operation = if current.is_some() {
                WalOperation::Update
            } else {
                WalOperation::Insert
            };
            let document = f(current)?;
            self.commit(resource, &path, operation, &document)?;
            Ok(document)
        })
    }

    /// Log then write a document; the caller holds the resource lock
    fn commit(
        &self,
        resource: &str,
        path: &Path,
        operation: WalOperation,
        document: &Value,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(document).map_err(StorageError::Serialize)?;
        if bytes.len() > self.max_document_bytes {
            return Err(StorageError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.max_document_bytes,
            }
            .into());
        }

        let id = self
            .wal
            .append(operation, &document_name(resource), document.clone())?;
        write_atomic(path, &bytes)?;
        tracing::debug!(resource, %operation, wal_id = %id, bytes = bytes.len(), "resource written");
        Ok(())
    }

    fn observed<T>(
        &self,
        operation: &str,
        f: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let started = Instant::now();
        let result = f();
        report(&*self.observer, operation, "store", started, &result);
        result
    }
}

impl<C: Clock> std::fmt::Debug for DataStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("data_dir", &self.data_dir)
            .field("max_document_bytes", &self.max_document_bytes)
            .finish_non_exhaustive()
    }
}

fn document_name(resource: &str) -> String {
    format!("{}.{}", resource, DOCUMENT_EXTENSION)
}

fn shape(resource: &str, expected: &'static str) -> StoreError {
    StoreError::Shape {
        resource: resource.to_string(),
        expected,
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
