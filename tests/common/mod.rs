//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use slam_coordinator::coordinator::{CoordinatorHandle, MappingEvent};
use crossbeam_channel::Receiver;
use std::time::{Duration, Instant};

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Wait until the coordinator has no pending command or frame
pub fn wait_idle(handle: &CoordinatorHandle) {
    let deadline = Instant::now() + test_timeout();
    while handle.pending_commands() > 0 || handle.buffered() > 0 {
        assert!(Instant::now() < deadline, "coordinator did not become idle");
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Receive events until one matches `pred`, panicking on timeout
pub fn expect_event<F>(events: &Receiver<MappingEvent>, mut pred: F) -> MappingEvent
where
    F: FnMut(&MappingEvent) -> bool,
{
    let deadline = Instant::now() + test_timeout();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return event,
            Ok(_) => continue,
            Err(_) => panic!("timed out waiting for event"),
        }
    }
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
