// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mv-storage: durable JSON storage on a local filesystem
//!
//! This crate provides:
//! - Atomic file replacement and advisory per-resource locks
//! - A retry policy for transient failures
//! - A JSON write-ahead log with background compaction
//! - Snapshots of the data directory with restore and WAL replay
//! - A lock-guarded document store built on the above

pub mod atomic;
pub mod error;
pub mod lock;
pub mod maintenance;
pub mod retry;
pub mod snapshot;
pub mod store;
pub mod wal;

pub use atomic::{copy_atomic, read_json, remove_if_exists, write_atomic, write_json_atomic};
pub use error::{ErrorKind, StorageError, Transient};
pub use lock::{holder_pid, validate_resource_name, LockDir, ResourceLock, POLL_INTERVAL};
pub use maintenance::MaintenanceWorker;
pub use retry::RetryPolicy;
pub use snapshot::{SnapshotError, SnapshotInfo, SnapshotManager, SnapshotMetadata};
pub use store::{DataStore, StoreError};
pub use wal::{WalEntry, WalError, WriteAheadLog};
