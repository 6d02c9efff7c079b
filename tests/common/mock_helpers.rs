//! Mock construction helpers

use serial_scope::backend::{MockUsbHost, PermissionReply};
use serial_scope::config::AppConfig;
use serial_scope::types::DeviceId;
use serial_scope::{FrontendHandle, SerialBackend};
use std::thread::JoinHandle;

/// A running backend and the handles a test needs to drive it
pub struct TestBackend {
    pub frontend: FrontendHandle,
    pub mock: MockUsbHost,
    handle: Option<JoinHandle<()>>,
}

impl TestBackend {
    /// Spawn the coordinator thread against `mock`
    pub fn spawn(config: AppConfig, mock: MockUsbHost) -> Self {
        let (backend, frontend) = SerialBackend::new(config, Box::new(mock.clone()));
        mock.set_event_sender(frontend.host_events());
        let handle = std::thread::spawn(move || backend.run());
        Self {
            frontend,
            mock,
            handle: Some(handle),
        }
    }

    /// Shut down and wait for the coordinator to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.frontend.shutdown();
        if let Some(handle) = self.handle.take() {
            handle.join().expect("backend thread panicked");
        }
    }
}

impl Drop for TestBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Host with one device answering permission requests with `reply`
pub fn single_device_host(id: u32, reply: PermissionReply) -> MockUsbHost {
    MockUsbHost::new()
        .with_device(DeviceId(id), "USB serial adapter")
        .with_permission_reply(reply)
}

/// Host with one device that is already permitted
pub fn permitted_host(id: u32) -> MockUsbHost {
    let mock = single_device_host(id, PermissionReply::Manual);
    mock.grant_permission(DeviceId(id));
    mock
}
