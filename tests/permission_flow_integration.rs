//! Integration tests for permission negotiation
//!
//! Permission results are injected as host events, the same way a platform
//! layer would deliver them.

#![cfg(feature = "mock-host")]

mod common;

use common::builders::ConfigBuilder;
use common::mock_helpers::{single_device_host, TestBackend};
use common::wait_for;
use serial_scope::backend::{MockUsbHost, PermissionReply};
use serial_scope::types::{ConnectionStatus, DeviceId};
use std::time::Duration;

#[test]
fn test_denied_permission_returns_to_idle() {
    let backend = TestBackend::spawn(
        ConfigBuilder::new().build(),
        single_device_host(5, PermissionReply::Deny),
    );
    let frontend = &backend.frontend;
    wait_for(frontend, |s| !s.devices.is_empty());

    frontend.connect();
    let snapshot = wait_for(frontend, |s| s.last_error.is_some());
    assert_eq!(snapshot.last_error.as_deref(), Some("permission denied"));
    assert_eq!(snapshot.status, ConnectionStatus::Idle);

    backend.shutdown();
}

#[test]
fn test_result_without_device_id_is_resolved_from_catalog() {
    let backend = TestBackend::spawn(
        ConfigBuilder::new().build(),
        single_device_host(5, PermissionReply::GrantWithoutId),
    );
    let frontend = &backend.frontend;
    wait_for(frontend, |s| !s.devices.is_empty());

    frontend.connect();
    wait_for(frontend, |s| s.status.is_connected());

    backend.shutdown();
}

#[test]
fn test_device_removed_during_negotiation() {
    let backend = TestBackend::spawn(
        ConfigBuilder::new().build(),
        single_device_host(5, PermissionReply::Manual),
    );
    let frontend = &backend.frontend;
    wait_for(frontend, |s| !s.devices.is_empty());

    frontend.connect();
    wait_for(frontend, |s| s.status == ConnectionStatus::Requesting(DeviceId(5)));

    backend.mock.remove_device(DeviceId(5));
    let snapshot = wait_for(frontend, |s| s.status == ConnectionStatus::Idle);
    assert_eq!(snapshot.last_error.as_deref(), Some("device no longer available"));

    // A late grant for the vanished device changes nothing
    frontend.host_events().permission_result(Some(DeviceId(5)), true);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(frontend.snapshot().status, ConnectionStatus::Idle);
    assert_eq!(backend.mock.stats().connections_opened, 0);

    backend.shutdown();
}

#[test]
fn test_second_connect_supersedes_pending_request() {
    let mock = MockUsbHost::new()
        .with_device(DeviceId(1), "first")
        .with_device(DeviceId(2), "second")
        .with_permission_reply(PermissionReply::Manual);
    let backend = TestBackend::spawn(ConfigBuilder::new().build(), mock);
    let frontend = &backend.frontend;
    wait_for(frontend, |s| s.devices.len() == 2);

    frontend.select_device(Some(DeviceId(1)));
    frontend.connect();
    frontend.select_device(Some(DeviceId(2)));
    frontend.connect();
    wait_for(frontend, |s| s.status == ConnectionStatus::Requesting(DeviceId(2)));

    // Stale answer for the superseded request
    frontend.host_events().permission_result(Some(DeviceId(1)), true);
    frontend.host_events().permission_result(Some(DeviceId(2)), true);

    let snapshot = wait_for(frontend, |s| s.status.is_connected());
    assert_eq!(
        snapshot.status,
        ConnectionStatus::Connected {
            device_id: DeviceId(2),
            baud_rate: 9600
        }
    );
    assert_eq!(backend.mock.stats().connections_opened, 1);

    backend.shutdown();
}

#[test]
fn test_pending_request_has_no_timeout() {
    let backend = TestBackend::spawn(
        ConfigBuilder::new().build(),
        single_device_host(5, PermissionReply::Manual),
    );
    let frontend = &backend.frontend;
    wait_for(frontend, |s| !s.devices.is_empty());

    frontend.connect();
    wait_for(frontend, |s| s.status == ConnectionStatus::Requesting(DeviceId(5)));
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(frontend.snapshot().status, ConnectionStatus::Requesting(DeviceId(5)));

    backend.shutdown();
}
