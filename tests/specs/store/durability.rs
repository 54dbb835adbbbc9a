//! Data store specs
//!
//! Every mutation is logged in full before the document is replaced, so
//! the log alone can rebuild the data directory.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[test]
fn log_rebuilds_every_resource() {
    let vault = Vault::new();
    let wal = vault.wal();
    let store = vault.store(&wal);
    store.write("profile", &json!({"name": "Ada"})).unwrap();
    store.ensure("decisions", &json!([])).unwrap();
    store.append_record("decisions", json!({"choice": "rust"})).unwrap();
    store
        .update("profile", |doc| {
            let mut doc = doc.unwrap_or_else(|| json!({}));
            doc["role"] = json!("engineer");
            Ok(doc)
        })
        .unwrap();
    let snapshots = vault.snapshots(&wal);
    let rebuilt = vault.scratch("rebuilt");

    snapshots.recover_from_wal(Some(&rebuilt), None).unwrap();

    for resource in store.resources().unwrap() {
        let name = format!("{}.json", resource);
        assert_eq!(
            std::fs::read_to_string(rebuilt.join(&name)).unwrap(),
            std::fs::read_to_string(vault.data(&name)).unwrap()
        );
    }
}

#[test]
fn concurrent_writers_never_lose_records() {
    let vault = Vault::new();
    let config = vault.config.clone().with_lock_timeout(Duration::from_secs(30));

    let handles: Vec<_> = (0..6)
        .map(|writer| {
            let config = config.clone();
            std::thread::spawn(move || {
                let wal = Arc::new(
                    WriteAheadLog::open(&config, FakeClock::at(START), NoopObserver::shared())
                        .unwrap(),
                );
                let store = DataStore::open(&config, wal, NoopObserver::shared()).unwrap();
                for i in 0..5 {
                    store
                        .append_record("dialogues", json!({"writer": writer, "i": i}))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let wal = vault.wal();
    let store = vault.store(&wal);
    let records = store.read_records("dialogues").unwrap();
    assert_eq!(records.len(), 30);
    for writer in 0..6 {
        let mine: Vec<i64> = records
            .iter()
            .filter(|r| r["writer"] == json!(writer))
            .map(|r| r["i"].as_i64().unwrap())
            .collect();
        assert_eq!(mine, vec![0, 1, 2, 3, 4]);
    }
}

#[test]
fn config_file_drives_layout() {
    let vault = Vault::new();
    let toml = format!(
        r#"
data_dir = "{}"
wal_path = "log/store.wal"
backup_dir = "snapshots"
lock_timeout = "2s"

[retry]
max_retries = 1
initial_delay = "5ms"
backoff_multiplier = 2.0

[snapshots]
interval = "1h"
keep = 3
extensions = ["json"]
"#,
        vault.config.data_dir.display()
    );
    let config_path = vault.scratch("memvault.toml");
    std::fs::write(&config_path, toml).unwrap();

    let config = StoreConfig::load(&config_path).unwrap();
    let wal = Arc::new(
        WriteAheadLog::open(&config, FakeClock::at(START), NoopObserver::shared()).unwrap(),
    );
    let store = DataStore::open(&config, Arc::clone(&wal), NoopObserver::shared()).unwrap();
    let snapshots =
        SnapshotManager::with_wal(&config, wal, FakeClock::at(START), NoopObserver::shared())
            .unwrap();
    store.write("profile", &json!({})).unwrap();
    snapshots.create_snapshot(Some("s")).unwrap();

    assert!(vault.data("log/store.wal").exists());
    assert!(vault.data("snapshots/s/profile.json").exists());
    assert_eq!(config.snapshots.keep, 3);
}
