// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observer that reports through `tracing`

use super::{Outcome, SharedObserver, StoreObserver};
use std::sync::Arc;
use std::time::Duration;

/// Emits one structured event per observer callback
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn shared() -> SharedObserver {
        Arc::new(TracingObserver)
    }
}

impl StoreObserver for TracingObserver {
    fn record_operation(&self, operation: &str, elapsed: Duration, outcome: Outcome) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            Outcome::Success => {
                tracing::debug!(operation, elapsed_ms, %outcome, "operation completed")
            }
            Outcome::Failure => {
                tracing::warn!(operation, elapsed_ms, %outcome, "operation failed")
            }
        }
    }

    fn record_error(&self, kind: &str, component: &str) {
        tracing::warn!(kind, component, "error recorded");
    }

    fn record_retry(&self, operation: &str, attempt: u32) {
        tracing::debug!(operation, attempt, "retry scheduled");
    }
}
