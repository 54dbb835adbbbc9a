// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic background maintenance
//!
//! A dedicated thread runs a tick closure on a fixed interval. The wait
//! between ticks is a channel receive with a timeout, so stopping the worker
//! interrupts the wait instead of sleeping it out.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

/// How long `Drop` waits for the worker thread to exit
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to a running maintenance thread
pub struct MaintenanceWorker {
    name: String,
    stop_tx: Option<mpsc::Sender<()>>,
    done_rx: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    /// Start a thread calling `tick` every `interval` until stopped
    ///
    /// `tick` is responsible for its own error reporting; the loop keeps
    /// going regardless of what a tick does.
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => tick(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                let _ = done_tx.send(());
            })?;

        tracing::debug!(worker = name, interval_ms = interval.as_millis() as u64, "maintenance started");

        Ok(Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            done_rx,
            handle: Some(handle),
        })
    }

    /// Whether `stop` has not been called yet
    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }

    /// Signal the worker and wait up to `wait` for it to exit
    ///
    /// Returns false if the thread was still busy when the wait ran out; it
    /// is then detached and exits after its current tick.
    pub fn stop(&mut self, wait: Duration) -> bool {
        let Some(stop_tx) = self.stop_tx.take() else {
            return true;
        };
        let _ = stop_tx.send(());
        drop(stop_tx);

        match self.done_rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        tracing::error!(worker = %self.name, "maintenance thread panicked");
                    }
                }
                tracing::debug!(worker = %self.name, "maintenance stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    worker = %self.name,
                    wait_ms = wait.as_millis() as u64,
                    "maintenance thread did not stop in time, detaching"
                );
                self.handle.take();
                false
            }
        }
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        self.stop(DEFAULT_STOP_TIMEOUT);
    }
}

impl std::fmt::Debug for MaintenanceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceWorker")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
