//! Cross-process lock specs
//!
//! The test binary re-executes itself to hold a lock from a second process.

use crate::prelude::*;
use mv_storage::holder_pid;
use std::process::{Child, Command};

const HOLDER_ENV: &str = "MV_SPECS_LOCK_HOLDER";
const HOLD_FOR: Duration = Duration::from_secs(2);

/// Body of the child process; does nothing when run directly
#[test]
#[ignore = "spawned by the cross-process lock specs"]
fn lock_holder_child() {
    let Ok(path) = std::env::var(HOLDER_ENV) else {
        return;
    };
    let lock = ResourceLock::acquire(Path::new(&path), Duration::from_secs(5)).unwrap();
    std::thread::sleep(HOLD_FOR);
    lock.release();
}

fn spawn_holder(lock_path: &Path) -> Child {
    Command::new(std::env::current_exe().unwrap())
        .args([
            "--exact",
            "lock_cross_process::lock_holder_child",
            "--ignored",
            "--nocapture",
            "--test-threads=1",
        ])
        .env(HOLDER_ENV, lock_path)
        .spawn()
        .unwrap()
}

/// Wait until the child has stamped its PID into the lock file
fn wait_for_holder(lock_path: &Path, child: &Child) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while holder_pid(lock_path) != Some(child.id()) {
        assert!(Instant::now() < deadline, "child never acquired the lock");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn waiter_times_out_while_other_process_holds_lock() {
    let vault = Vault::new();
    let lock_path = vault.scratch("resource.lock");
    let mut child = spawn_holder(&lock_path);
    wait_for_holder(&lock_path, &child);

    let start = Instant::now();
    let result = ResourceLock::acquire(&lock_path, Duration::from_millis(500));
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(StorageError::LockTimeout { .. })));
    assert!(elapsed >= Duration::from_millis(500), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(700), "{:?}", elapsed);
    assert!(child.wait().unwrap().success());
}

#[test]
fn waiter_acquires_once_other_process_releases() {
    let vault = Vault::new();
    let lock_path = vault.scratch("resource.lock");
    let mut child = spawn_holder(&lock_path);
    wait_for_holder(&lock_path, &child);

    let lock = ResourceLock::acquire(&lock_path, HOLD_FOR * 3).unwrap();

    assert_eq!(holder_pid(&lock_path), Some(std::process::id()));
    lock.release();
    assert!(!lock_path.exists());
    assert!(child.wait().unwrap().success());
}

#[test]
fn store_writes_wait_for_a_lock_held_elsewhere() {
    let vault = Vault::new();
    let wal = vault.wal();
    let store = vault.store(&wal);
    let lock_path = LockDir::open(vault.config.lock_dir(), Duration::from_secs(1))
        .unwrap()
        .path_for("profile");
    let mut child = spawn_holder(&lock_path);
    wait_for_holder(&lock_path, &child);

    store.write("profile", &json!({"after": "release"})).unwrap();

    assert!(child.wait().unwrap().success());
    assert_eq!(store.read("profile").unwrap(), Some(json!({"after": "release"})));
}
