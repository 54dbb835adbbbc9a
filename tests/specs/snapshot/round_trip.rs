//! Snapshot create/restore specs

use crate::prelude::*;
use similar_asserts::assert_eq;

fn file_bytes(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_file())
        .map(|p| {
            let name = p.file_name().unwrap().to_string_lossy().to_string();
            (name, std::fs::read(&p).unwrap())
        })
        .collect();
    files.sort();
    files
}

#[test]
fn restore_into_fresh_directory_is_byte_identical() {
    let vault = Vault::new();
    let wal = vault.wal();
    let store = vault.store(&wal);
    store.write("profile", &json!({"name": "Ada", "tags": ["x", "y"]})).unwrap();
    store.append_record("dialogues", json!({"text": "hello"})).unwrap();
    std::fs::write(vault.data("notes.md"), "# Notes\n\nunicode: é\n").unwrap();
    let snapshots = vault.snapshots(&wal);

    snapshots.create_snapshot(Some("before")).unwrap();
    let fresh = vault.scratch("fresh");
    snapshots.restore_snapshot("before", Some(&fresh)).unwrap();

    let wal_name = wal.path().file_name().unwrap().to_string_lossy().to_string();
    let original: Vec<_> = file_bytes(&vault.config.data_dir)
        .into_iter()
        .filter(|(name, _)| *name != wal_name)
        .collect();
    assert_eq!(file_bytes(&fresh), original);
}

#[test]
fn restore_undoes_later_writes() {
    let vault = Vault::new();
    let wal = vault.wal();
    let store = vault.store(&wal);
    store.write("profile", &json!({"v": 1})).unwrap();
    let snapshots = vault.snapshots(&wal);
    let name = snapshots.create_snapshot(None).unwrap();

    store.write("profile", &json!({"v": 2})).unwrap();
    snapshots.restore_snapshot(&name, None).unwrap();

    assert_eq!(store.read("profile").unwrap(), Some(json!({"v": 1})));
}

#[test]
fn snapshot_records_wal_position() {
    let vault = Vault::new();
    let wal = vault.wal();
    let store = vault.store(&wal);
    store.write("a", &json!({})).unwrap();
    store.write("b", &json!({})).unwrap();
    let snapshots = vault.snapshots(&wal);

    snapshots.create_snapshot(Some("s")).unwrap();

    let info = snapshots.list_snapshots().unwrap().remove(0);
    assert_eq!(info.name, "s");
    assert_eq!(info.wal_position, Some(2));
    assert_eq!(info.files_count, 2);
    assert_eq!(info.timestamp, START);
}
