// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording observer for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{Outcome, StoreObserver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Recorded observer callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverCall {
    Operation { operation: String, outcome: Outcome },
    Error { kind: String, component: String },
    Retry { operation: String, attempt: u32 },
}

/// Observer that keeps every callback for later assertions
#[derive(Clone, Default)]
pub struct RecordingObserver {
    calls: Arc<Mutex<Vec<ObserverCall>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ObserverCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Outcomes recorded for one operation name, in order
    pub fn outcomes(&self, operation: &str) -> Vec<Outcome> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ObserverCall::Operation {
                    operation: op,
                    outcome,
                } if op == operation => Some(outcome),
                _ => None,
            })
            .collect()
    }

    /// Error kinds recorded, in order
    pub fn error_kinds(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ObserverCall::Error { kind, .. } => Some(kind),
                _ => None,
            })
            .collect()
    }

    /// Number of retries recorded for one operation name
    pub fn retries(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ObserverCall::Retry { operation: op, .. } if op == operation))
            .count()
    }

    fn push(&self, call: ObserverCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl StoreObserver for RecordingObserver {
    fn record_operation(&self, operation: &str, _elapsed: Duration, outcome: Outcome) {
        self.push(ObserverCall::Operation {
            operation: operation.to_string(),
            outcome,
        });
    }

    fn record_error(&self, kind: &str, component: &str) {
        self.push(ObserverCall::Error {
            kind: kind.to_string(),
            component: component.to_string(),
        });
    }

    fn record_retry(&self, operation: &str, attempt: u32) {
        self.push(ObserverCall::Retry {
            operation: operation.to_string(),
            attempt,
        });
    }
}
