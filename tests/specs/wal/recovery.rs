//! WAL replay specs
//!
//! Entries appended to the log can be replayed onto any directory.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[test]
fn insert_then_delete_replays_onto_target() {
    let vault = Vault::new();
    let wal = vault.wal();
    let snapshots = vault.snapshots(&wal);
    let target = vault.scratch("target");

    wal.append(WalOperation::Insert, "f.json", json!({"a": 1})).unwrap();
    snapshots.recover_from_wal(Some(&target), None).unwrap();
    assert_eq!(read_value(&target.join("f.json")), json!({"a": 1}));

    vault.clock.advance(Duration::from_secs(1));
    wal.append(WalOperation::Delete, "f.json", json!({})).unwrap();
    snapshots.recover_from_wal(Some(&target), None).unwrap();
    assert!(!target.join("f.json").exists());
}

#[test]
fn replay_closes_gap_after_crash_between_log_and_write() {
    let vault = Vault::new();
    let wal = vault.wal();
    let store = vault.store(&wal);
    store.append_record("dialogues", json!({"turn": 1})).unwrap();

    // Logged but never applied to the data file
    wal.append(
        WalOperation::Update,
        "dialogues.json",
        json!([{"turn": 1}, {"turn": 2}]),
    )
    .unwrap();
    assert_eq!(store.read_records("dialogues").unwrap().len(), 1);

    let snapshots = vault.snapshots(&wal);
    assert_eq!(snapshots.recover_from_wal(None, None).unwrap(), 2);

    assert_eq!(
        store.read_records("dialogues").unwrap(),
        vec![json!({"turn": 1}), json!({"turn": 2})]
    );
}

#[test]
fn replaying_twice_gives_the_same_files() {
    let vault = Vault::new();
    let wal = vault.wal();
    let store = vault.store(&wal);
    store.write("profile", &json!({"name": "Ada"})).unwrap();
    store.append_record("projects", json!("alpha")).unwrap();
    store.delete("profile").unwrap();
    let snapshots = vault.snapshots(&wal);
    let target = vault.scratch("replayed");

    snapshots.recover_from_wal(Some(&target), None).unwrap();
    let first = std::fs::read(target.join("projects.json")).unwrap();
    snapshots.recover_from_wal(Some(&target), None).unwrap();

    assert_eq!(std::fs::read(target.join("projects.json")).unwrap(), first);
    assert_eq!(first, std::fs::read(vault.data("projects.json")).unwrap());
    assert!(!target.join("profile.json").exists());
}

#[test]
fn corrupt_log_is_distinguishable_from_empty_log() {
    let vault = Vault::new();
    let wal = vault.wal();
    assert!(wal.read_entries(None).unwrap().is_empty());

    std::fs::write(wal.path(), "[{\"truncated\":").unwrap();

    assert!(matches!(wal.read_entries(None), Err(WalError::Corrupt { .. })));
    let snapshots = vault.snapshots(&wal);
    assert!(matches!(
        snapshots.recover_from_wal(None, None),
        Err(SnapshotError::Recovery(_))
    ));
}
