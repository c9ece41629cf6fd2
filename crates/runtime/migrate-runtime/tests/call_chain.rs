//! Migration must be observationally transparent to a live call chain: a
//! thread migrated while deep inside nested calls must return through every
//! frame with its original argument values intact.

#![cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use migrate_runtime::check_migrate;
use migrate_runtime::{
    Architecture, DetectionPolicy, LoopbackTransfer, MigrationRange, MigrationRuntime,
    NodeDirectory, PassthroughRewriter, RuntimeConfig,
};

fn loopback_runtime(ranges: Vec<MigrationRange>) -> (MigrationRuntime, Arc<LoopbackTransfer>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let transfer = Arc::new(LoopbackTransfer::new());
    let runtime = MigrationRuntime::new(
        NodeDirectory::from_entries(&[(0, Architecture::host())]),
        DetectionPolicy::from_ranges(ranges),
        Arc::new(PassthroughRewriter),
        transfer.clone(),
        RuntimeConfig::default(),
    );
    (runtime, transfer)
}

// Everything in the text segment; makes a one-shot range cover the whole
// chain so the check inside f3 is the first (and only) point to fire.
fn whole_text_range() -> MigrationRange {
    MigrationRange {
        start: 0,
        end: u64::MAX,
        node: 0,
    }
}

fn f4(a: i64, b: i64) -> i64 {
    a + b
}

fn f3(runtime: &MigrationRuntime, a: i64, b: i64) -> i64 {
    check_migrate!(runtime).unwrap();
    f4(a * 2, b * 2) + a
}

fn f2(runtime: &MigrationRuntime, a: i64, b: i64) -> i64 {
    f3(runtime, a * 2, b * 2) + a
}

fn f1(runtime: &MigrationRuntime, a: i64, b: i64) -> i64 {
    f2(runtime, a * 2, b * 2) + a
}

fn chain_without_migration(a: i64, b: i64) -> i64 {
    let (runtime, _) = loopback_runtime(vec![]);
    f1(&runtime, a, b)
}

#[test]
fn test_migration_in_f3_is_transparent_to_the_chain() {
    let expected = chain_without_migration(10, 20);

    let (runtime, transfer) = loopback_runtime(vec![whole_text_range()]);
    let result = f1(&runtime, 10, 20);

    assert_eq!(result, expected);
    // Exactly one migration happened, inside f3.
    assert_eq!(runtime.stats().initiated, 1);
    assert_eq!(runtime.stats().resumed, 1);
    assert!(transfer.last_transfer().is_some());
    // Nothing left behind for a later migration to trip over.
    assert!(!MigrationRuntime::handshake_pending());
    assert_eq!(MigrationRuntime::migration_in_flight(), None);
}

#[test]
fn test_continuation_observes_call_chain_state() {
    let (runtime, _) = loopback_runtime(vec![whole_text_range()]);
    let resumed = Arc::new(AtomicUsize::new(0));
    let resumed_in_cb = Arc::clone(&resumed);

    let result = {
        let runtime = &runtime;
        let a = 3i64;
        let b = 4i64;
        check_migrate!(
            runtime,
            Arc::new(move || {
                resumed_in_cb.fetch_add(1, Ordering::SeqCst);
            })
        )
        .unwrap();
        f4(a, b)
    };

    assert_eq!(result, 7);
    assert_eq!(resumed.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.stats().fpu_restores, 1);
}

#[test]
fn test_two_disjoint_ranges_each_trigger_once() {
    let (runtime, _) = loopback_runtime(vec![
        MigrationRange {
            start: 0x1000,
            end: 0x2000,
            node: 0,
        },
        MigrationRange {
            start: 0x9000,
            end: 0xa000,
            node: 0,
        },
    ]);

    // First range fires exactly once.
    runtime.check_migrate_at(0x1800, None).unwrap();
    runtime.check_migrate_at(0x1800, None).unwrap();
    assert_eq!(runtime.stats().initiated, 1);

    // Second range fires independently, exactly once.
    runtime.check_migrate_at(0x9800, None).unwrap();
    runtime.check_migrate_at(0x9800, None).unwrap();
    assert_eq!(runtime.stats().initiated, 2);
    assert_eq!(runtime.stats().resumed, 2);
    assert_eq!(runtime.stats().fpu_restores, 2);
}

#[test]
fn test_migrated_snapshot_survives_serialization() {
    // A transfer backend ships the destination snapshot between nodes;
    // the recorded handoff must round-trip losslessly.
    let (runtime, transfer) = loopback_runtime(vec![whole_text_range()]);
    f1(&runtime, 1, 2);

    let (_, snapshot) = transfer.last_transfer().unwrap();
    let json = serde_json::to_string(&snapshot).unwrap();
    let back: migrate_runtime::RegisterSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);
}
