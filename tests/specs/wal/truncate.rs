//! WAL truncation specs

use crate::prelude::*;
use similar_asserts::assert_eq;

#[test]
fn truncate_keeps_exactly_entries_at_or_after_cutoff() {
    let vault = Vault::new();
    let wal = vault.wal();
    let mut stamps = Vec::new();
    for i in 0..6 {
        wal.append(WalOperation::Insert, "d.json", json!({"i": i})).unwrap();
        stamps.push(START + f64::from(i) * 30.0);
        vault.clock.advance(Duration::from_secs(30));
    }

    let cutoff = START + 75.0;
    let removed = wal.truncate(cutoff).unwrap();

    let expected: Vec<f64> = stamps.iter().copied().filter(|t| *t >= cutoff).collect();
    let kept: Vec<f64> = wal
        .read_entries(None)
        .unwrap()
        .iter()
        .map(|e| e.timestamp)
        .collect();
    assert_eq!(removed, stamps.len() - expected.len());
    assert_eq!(kept, expected);
}

#[test]
fn log_survives_reopen() {
    let vault = Vault::new();
    {
        let wal = vault.wal();
        wal.append(WalOperation::Insert, "a.json", json!([1])).unwrap();
        wal.close();
    }

    let wal = vault.wal();
    let entries = wal.read_entries(None).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload, json!([1]));
}
