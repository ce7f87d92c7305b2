mod common;

use bezel_core::device::ClockOffsetEstimator;
use bezel_core::protocol::{Opcode, ProtocolError, RetryPolicy};
use common::{init_tracing, FakeClock, Fault, MockBezel};
use std::sync::Arc;
use std::time::Duration;

const SYNC_BUDGET: Duration = Duration::from_secs(5);

fn latency_device(clock: &Arc<FakeClock>, write_ms: u64, read_ms: u64) -> MockBezel {
    init_tracing();
    MockBezel::new(Arc::clone(clock)).with_state(|s| {
        s.write_latency = Duration::from_millis(write_ms);
        s.read_latency = Duration::from_millis(read_ms);
    })
}

fn assert_close(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_micros(500),
        "{actual:?} not within tolerance of {expected:?}"
    );
}

#[test]
fn test_estimates_write_and_read_latency() {
    let clock = Arc::new(FakeClock::new());
    let device = latency_device(&clock, 10, 20);
    let retry = RetryPolicy::default();

    let offset = ClockOffsetEstimator::new(&device, clock.as_ref(), &retry, SYNC_BUDGET, 60)
        .estimate()
        .unwrap();

    assert_close(offset.write, Duration::from_millis(10));
    assert_close(offset.read, Duration::from_millis(20));
    assert_close(offset.total(), Duration::from_millis(30));
}

#[test]
fn test_each_probe_opens_and_closes_device() {
    let clock = Arc::new(FakeClock::new());
    let device = latency_device(&clock, 1, 1);
    let retry = RetryPolicy::default();

    ClockOffsetEstimator::new(&device, clock.as_ref(), &retry, SYNC_BUDGET, 60)
        .estimate()
        .unwrap();

    let (opens, closes) = device.state(|s| (s.opens, s.closes));
    assert_eq!(opens, 60);
    assert_eq!(closes, 60);
    assert!(device
        .requests()
        .iter()
        .all(|f| f.header.command == Opcode::Identify.code() && f.header.api_version == 0));
}

#[test]
fn test_failed_probe_is_retried() {
    let clock = Arc::new(FakeClock::new());
    let device = latency_device(&clock, 10, 20);
    device.push_fault(Fault::Silent);
    let retry = RetryPolicy::default();

    let offset = ClockOffsetEstimator::new(&device, clock.as_ref(), &retry, SYNC_BUDGET, 5)
        .estimate()
        .unwrap();

    assert_eq!(clock.sleeps(), vec![Duration::from_millis(250)]);
    assert_close(offset.total(), Duration::from_millis(30));
}

#[test]
fn test_probe_failure_after_budget_propagates() {
    let clock = Arc::new(FakeClock::new());
    let device = latency_device(&clock, 0, 0);
    device.push_fault(Fault::Status(5));
    let retry = RetryPolicy::once();

    let result = ClockOffsetEstimator::new(&device, clock.as_ref(), &retry, SYNC_BUDGET, 5).estimate();

    assert!(matches!(result, Err(ProtocolError::CommandFailed { code: 5, .. })));
}
