//! Shared fixtures for the behavioral specs

pub use mv_core::{FakeClock, NoopObserver, RetryConfig, StoreConfig, WalOperation};
pub use mv_storage::{
    DataStore, LockDir, ResourceLock, SnapshotError, SnapshotManager, StorageError, WalError,
    WriteAheadLog,
};
pub use serde_json::{json, Value};
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::{Duration, Instant};

/// Epoch seconds the fake clock starts at
pub const START: f64 = 1_700_000_000.0;

/// A temporary data directory with the default layout
pub struct Vault {
    _temp: tempfile::TempDir,
    root: PathBuf,
    pub config: StoreConfig,
    pub clock: FakeClock,
}

impl Vault {
    pub fn new() -> Self {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let config = StoreConfig::for_data_dir(root.join("data"))
            .with_lock_timeout(Duration::from_secs(5))
            .with_retry(RetryConfig {
                max_retries: 2,
                initial_delay: Duration::from_millis(10),
                backoff_multiplier: 2.0,
            })
            .with_wal_maintenance(Duration::from_secs(3600), Duration::from_secs(7 * 86_400))
            .with_snapshot_schedule(Duration::from_secs(3600), 10);
        std::fs::create_dir_all(&config.data_dir).unwrap();
        Self {
            _temp: temp,
            root,
            config,
            clock: FakeClock::at(START),
        }
    }

    /// A path outside the data directory
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn data(&self, name: &str) -> PathBuf {
        self.config.data_dir.join(name)
    }

    pub fn wal(&self) -> Arc<WriteAheadLog<FakeClock>> {
        Arc::new(
            WriteAheadLog::open(&self.config, self.clock.clone(), NoopObserver::shared()).unwrap(),
        )
    }

    pub fn snapshots(&self, wal: &Arc<WriteAheadLog<FakeClock>>) -> SnapshotManager<FakeClock> {
        SnapshotManager::with_wal(
            &self.config,
            Arc::clone(wal),
            self.clock.clone(),
            NoopObserver::shared(),
        )
        .unwrap()
    }

    pub fn store(&self, wal: &Arc<WriteAheadLog<FakeClock>>) -> DataStore<FakeClock> {
        DataStore::open(&self.config, Arc::clone(wal), NoopObserver::shared()).unwrap()
    }
}

pub fn read_value(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}
