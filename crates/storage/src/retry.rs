// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry with exponential backoff for transient failures

use crate::error::Transient;
use mv_core::{RetryConfig, SharedObserver};
use std::fmt::Display;
use std::time::Duration;

/// Retries an operation while it fails with a transient error
///
/// The operation runs once, then up to `max_retries` more times. Each retry
/// waits for the current delay and multiplies it by `backoff_multiplier`.
/// Errors that are not [`Transient`] are returned from the attempt that
/// produced them; after the last retry the final error is returned.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    observer: Option<SharedObserver>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_multiplier,
            observer: None,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, 1.0)
    }

    /// Report each retry to an observer
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `op`, retrying transient failures
    pub fn run<T, E, F>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Transient + Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut delay = self.initial_delay;
        let mut attempt = 0;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.max_retries => {
                    if self.max_retries > 0 {
                        tracing::error!(
                            operation,
                            attempts = attempt + 1,
                            error = %e,
                            "all attempts failed"
                        );
                    }
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    if let Some(observer) = &self.observer {
                        observer.record_retry(operation, attempt);
                    }
                    std::thread::sleep(delay);
                    delay = next_delay(delay, self.backoff_multiplier);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_delay,
            config.backoff_multiplier,
        )
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .finish_non_exhaustive()
    }
}

fn next_delay(delay: Duration, multiplier: f64) -> Duration {
    let nanos = delay.as_nanos() as f64 * multiplier;
    if nanos.is_finite() && nanos >= 0.0 && nanos < u64::MAX as f64 {
        Duration::from_nanos(nanos as u64)
    } else {
        delay
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
