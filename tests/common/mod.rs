//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use serial_scope::{FrontendHandle, UiSnapshot};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(3)
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

/// Poll published snapshots until `done` holds, panicking on timeout
pub fn wait_for(frontend: &FrontendHandle, done: impl Fn(&UiSnapshot) -> bool) -> Arc<UiSnapshot> {
    let deadline = Instant::now() + test_timeout();
    loop {
        let snapshot = frontend.snapshot();
        if done(&snapshot) {
            return snapshot;
        }
        assert!(
            Instant::now() < deadline,
            "Timed out waiting for snapshot, last: {:?}",
            snapshot
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}
