// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observer seam for operation metrics
//!
//! Components receive an observer at construction time instead of reporting
//! into a process-wide collector. The storage crate calls it around every
//! caller-facing operation; what happens with the data (log lines, counters,
//! nothing at all) is up to the implementation.

mod traced;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use traced::TracingObserver;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{ObserverCall, RecordingObserver};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How an observed operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            Outcome::Failure => f.write_str("failure"),
        }
    }
}

/// Receives operation and error reports from storage components
pub trait StoreObserver: Send + Sync {
    /// A caller-facing operation finished
    fn record_operation(&self, operation: &str, elapsed: Duration, outcome: Outcome);

    /// An operation failed with an error of the given kind
    fn record_error(&self, kind: &str, component: &str);

    /// A transient failure is about to be retried
    fn record_retry(&self, _operation: &str, _attempt: u32) {}
}

/// Shared handle passed into each component
pub type SharedObserver = Arc<dyn StoreObserver>;

/// Observer that discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl NoopObserver {
    pub fn shared() -> SharedObserver {
        Arc::new(NoopObserver)
    }
}

impl StoreObserver for NoopObserver {
    fn record_operation(&self, _operation: &str, _elapsed: Duration, _outcome: Outcome) {}

    fn record_error(&self, _kind: &str, _component: &str) {}
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
