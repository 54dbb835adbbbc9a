//! Snapshot retention specs

use crate::prelude::*;
use similar_asserts::assert_eq;

#[test]
fn cleanup_keeps_the_k_most_recent() {
    let vault = Vault::new();
    let wal = vault.wal();
    let snapshots = vault.snapshots(&wal);
    let mut created = Vec::new();
    for _ in 0..7 {
        created.push(snapshots.create_snapshot(None).unwrap());
        vault.clock.advance(Duration::from_secs(3600));
    }

    let removed = snapshots.cleanup_old_snapshots(3).unwrap();

    assert_eq!(removed, 4);
    let remaining: Vec<String> = snapshots
        .list_snapshots()
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    let expected: Vec<String> = created.iter().rev().take(3).cloned().collect();
    assert_eq!(remaining, expected);
}

#[test]
fn cleanup_to_zero_removes_everything() {
    let vault = Vault::new();
    let wal = vault.wal();
    let snapshots = vault.snapshots(&wal);
    snapshots.create_snapshot(Some("a")).unwrap();
    snapshots.create_snapshot(Some("b")).unwrap();

    assert_eq!(snapshots.cleanup_old_snapshots(0).unwrap(), 2);
    assert!(snapshots.list_snapshots().unwrap().is_empty());
}
