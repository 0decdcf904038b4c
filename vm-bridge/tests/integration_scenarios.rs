//! End-to-end Bridge scenarios: dispatch through a live worker pool, and
//! metrics reset semantics following a run.

use vm_bridge::Bridge;
use vm_shared::{TaskDescriptor, WireValue};

fn ping_task() -> TaskDescriptor {
    TaskDescriptor::new("ping", "echo", WireValue::Map(WireValue::map()))
}

/// Scenario 4: start a two-worker pool, dispatch three pings, and expect
/// each to succeed with metrics reflecting all three.
#[test]
fn three_pings_through_a_two_worker_pool_all_succeed() {
    let mut bridge = Bridge::new();
    bridge.start(2).unwrap();

    for _ in 0..3 {
        let response = bridge.submit_task(ping_task(), 4096).unwrap();
        assert!(response.success);
    }

    let snapshot = bridge.metrics_snapshot(&[]).unwrap();
    let total_invocations: u64 = snapshot.values().map(|s| s.invocations).sum();
    let total_failures: u64 = snapshot.values().map(|s| s.failures).sum();
    assert!(total_invocations >= 3);
    assert_eq!(total_failures, 0);

    let summary = bridge.metrics_summary(&[]).unwrap();
    let bucketed: u64 = summary.buckets.iter().map(|b| b.count).sum();
    assert!(bucketed > 0, "summary buckets should account for the dispatched tasks");

    bridge.stop();
}

/// Scenario 5: following scenario 4's traffic, `metrics.reset` zeroes the
/// cumulative counters that the next snapshot reads back, per proxy.
#[test]
fn metrics_reset_zeroes_invocations_failures_and_extrema() {
    let mut bridge = Bridge::new();
    bridge.start(2).unwrap();

    for _ in 0..3 {
        bridge.submit_task(ping_task(), 4096).unwrap();
    }
    let before = bridge.metrics_snapshot(&[]).unwrap();
    let total_before: u64 = before.values().map(|s| s.invocations).sum();
    assert!(total_before >= 3);

    bridge.metrics_reset(&[]).unwrap();

    let snapshot = bridge.metrics_snapshot(&[]).unwrap();
    for proxy_snapshot in snapshot.values() {
        assert_eq!(proxy_snapshot.invocations, 0);
        assert_eq!(proxy_snapshot.failures, 0);
        assert_eq!(proxy_snapshot.success_rate, 1.0);
        assert_eq!(proxy_snapshot.min, std::time::Duration::ZERO);
        assert_eq!(proxy_snapshot.max, std::time::Duration::ZERO);
    }

    bridge.stop();
}
