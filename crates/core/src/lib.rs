// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! mv-core: shared vocabulary for the memvault storage core
//!
//! This crate provides:
//! - A clock abstraction producing epoch-second timestamps
//! - The WAL operation kinds
//! - The observer seam components report metrics through
//! - Explicit store configuration (TOML-loadable)

pub mod clock;
pub mod config;
pub mod observer;
pub mod operation;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, RetryConfig, SnapshotConfig, StoreConfig, WalConfig};
pub use observer::{NoopObserver, Outcome, SharedObserver, StoreObserver, TracingObserver};
pub use operation::WalOperation;

#[cfg(any(test, feature = "test-support"))]
pub use observer::{ObserverCall, RecordingObserver};
