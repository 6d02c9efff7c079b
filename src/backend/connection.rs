//! Serial session ownership
//!
//! [`ConnectionManager`] holds at most one [`ConnectionSession`]: the device
//! connection, the configured port shared with the read loop, and the read
//! loop's thread. Opening always tears the previous session down first, so
//! two sessions never overlap.
//!
//! Teardown is best-effort. Release failures are logged and swallowed;
//! `close()` never fails.

use crate::backend::host_trait::{
    ControlLine, DriverHandle, LineConfig, PortInfo, SerialPortIo, UsbConnection, UsbHost,
};
use crate::backend::read_loop::{ReadLoop, ReadLoopConfig, SharedPort};
use crate::backend::BackendEvent;
use crate::error::{Result, ScopeError};
use crate::types::DeviceId;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Value of the active-session atomic when no session is open
const NO_SESSION: u64 = 0;

/// Identity token of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// One open, configured serial connection
pub struct ConnectionSession {
    id: SessionId,
    device_id: DeviceId,
    baud_rate: u32,
    connection: Box<dyn UsbConnection>,
    port: SharedPort,
    reader: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.id)
            .field("device_id", &self.device_id)
            .field("baud_rate", &self.baud_rate)
            .finish_non_exhaustive()
    }
}

/// Owner of the single active session
pub struct ConnectionManager {
    session: Option<ConnectionSession>,
    active: Arc<AtomicU64>,
    next_session: u64,
    read_config: ReadLoopConfig,
    events: Sender<BackendEvent>,
}

impl ConnectionManager {
    /// Create a manager; `events` is where read loops report to
    pub fn new(read_config: ReadLoopConfig, events: Sender<BackendEvent>) -> Self {
        Self {
            session: None,
            active: Arc::new(AtomicU64::new(NO_SESSION)),
            next_session: NO_SESSION,
            read_config,
            events,
        }
    }

    /// Open and configure the device, then start its read loop
    pub fn open(
        &mut self,
        host: &mut dyn UsbHost,
        handle: &DriverHandle,
        baud_rate: u32,
    ) -> Result<SessionId> {
        self.close();

        let device_id = handle.device_id();
        let mut connection = host
            .open_connection(handle)
            .ok_or(ScopeError::OpenDevice)?;

        let Some(port_info) = handle.ports().first() else {
            release_connection(connection.as_mut());
            return Err(ScopeError::NoPorts);
        };

        let port = match open_port(connection.as_mut(), port_info, baud_rate) {
            Ok(port) => port,
            Err(e) => {
                release_connection(connection.as_mut());
                return Err(ScopeError::OpenPort(e.to_string()));
            }
        };
        let port: SharedPort = Arc::new(Mutex::new(port));

        self.next_session += 1;
        let id = SessionId(self.next_session);
        self.active.store(id.0, Ordering::SeqCst);

        let reader = ReadLoop::new(
            id,
            self.active.clone(),
            port.clone(),
            self.events.clone(),
            self.read_config,
        );
        let reader = match reader.spawn() {
            Ok(handle) => handle,
            Err(e) => {
                self.active.store(NO_SESSION, Ordering::SeqCst);
                release_port(&port);
                release_connection(connection.as_mut());
                return Err(ScopeError::Io(e).with_context("failed to start read loop"));
            }
        };

        tracing::info!(
            "Opened {} on {} at {}",
            device_id,
            port_info.name,
            LineConfig::new(baud_rate)
        );

        self.session = Some(ConnectionSession {
            id,
            device_id,
            baud_rate,
            connection,
            port,
            reader: Some(reader),
        });

        Ok(id)
    }

    /// Stop the read loop and release the port and connection
    ///
    /// Returns the device that was connected; closing with no session is a no-op.
    pub fn close(&mut self) -> Option<DeviceId> {
        let mut session = self.session.take()?;

        // Invalidate first so the loop exits at its next check
        self.active.store(NO_SESSION, Ordering::SeqCst);
        if let Some(reader) = session.reader.take() {
            if reader.join().is_err() {
                tracing::warn!("Read loop for session {} panicked", session.id.0);
            }
        }

        release_port(&session.port);
        release_connection(session.connection.as_mut());

        tracing::info!("Closed session {} for {}", session.id.0, session.device_id);
        Some(session.device_id)
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Whether `id` is the currently open session
    pub fn is_current(&self, id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == id)
    }

    pub fn active_device(&self) -> Option<DeviceId> {
        self.session.as_ref().map(|s| s.device_id)
    }

    /// Device and baud rate of the open session
    pub fn active_link(&self) -> Option<(DeviceId, u32)> {
        self.session.as_ref().map(|s| (s.device_id, s.baud_rate))
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open the port and bring it up; the port is closed again on any failure
fn open_port(
    connection: &mut dyn UsbConnection,
    port_info: &PortInfo,
    baud_rate: u32,
) -> Result<Box<dyn SerialPortIo>> {
    let mut port = connection.open_port(port_info)?;

    let configured = port
        .configure(&LineConfig::new(baud_rate))
        // Many adapters only forward data once the host asserts DTR/RTS
        .and_then(|_| port.set_control_line(ControlLine::Dtr, true))
        .and_then(|_| port.set_control_line(ControlLine::Rts, true));

    if let Err(e) = configured {
        if let Err(close_err) = port.close() {
            tracing::debug!("Ignoring port close failure: {}", close_err);
        }
        return Err(e);
    }

    Ok(port)
}

fn release_port(port: &SharedPort) {
    let mut port = port.lock().unwrap_or_else(|e| e.into_inner());
    if let Err(e) = port.close() {
        tracing::debug!("Ignoring port close failure: {}", e);
    }
}

fn release_connection(connection: &mut dyn UsbConnection) {
    if let Err(e) = connection.close() {
        tracing::debug!("Ignoring connection close failure: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host_trait::{MockSerialPortIo, MockUsbConnection};
    use crate::backend::{MockUsbHost, SessionEvent};
    use crossbeam_channel::{unbounded, Receiver};
    use mockall::predicate::eq;
    use std::time::Duration;

    fn manager() -> (ConnectionManager, Receiver<BackendEvent>) {
        let (tx, rx) = unbounded();
        let config = ReadLoopConfig {
            timeout: Duration::from_millis(5),
            buffer_size: 64,
        };
        (ConnectionManager::new(config, tx), rx)
    }

    fn handle(id: u32, ports: usize) -> DriverHandle {
        let ports = (0..ports)
            .map(|index| PortInfo {
                index,
                name: format!("port{}", index),
            })
            .collect();
        DriverHandle::new(DeviceId(id), format!("dev{}", id), ports)
    }

    /// Host whose single connection is a mockall connection
    struct OneShotHost(Option<Box<dyn UsbConnection>>);

    impl UsbHost for OneShotHost {
        fn enumerate(&mut self) -> Result<Vec<crate::backend::EnumeratedDevice>> {
            Ok(Vec::new())
        }
        fn has_permission(&self, _handle: &DriverHandle) -> bool {
            true
        }
        fn request_permission(&mut self, _handle: &DriverHandle, _events: &crate::backend::HostEventSender) {}
        fn open_connection(&mut self, _handle: &DriverHandle) -> Option<Box<dyn UsbConnection>> {
            self.0.take()
        }
    }

    #[test]
    fn test_open_configures_8n1_and_raises_control_lines() {
        let mut port = MockSerialPortIo::new();
        port.expect_configure()
            .with(eq(LineConfig::new(9600)))
            .times(1)
            .returning(|_| Ok(()));
        port.expect_set_control_line()
            .with(eq(ControlLine::Dtr), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));
        port.expect_set_control_line()
            .with(eq(ControlLine::Rts), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));
        port.expect_read().returning(|_, _| {
            std::thread::sleep(Duration::from_millis(1));
            Ok(0)
        });
        // Failures during teardown are swallowed
        port.expect_close()
            .times(1)
            .returning(|| Err(ScopeError::Read("already gone".to_string())));

        let mut connection = MockUsbConnection::new();
        connection
            .expect_open_port()
            .times(1)
            .return_once(move |_| Ok(Box::new(port)));
        connection.expect_close().times(1).returning(|| Ok(()));

        let (mut manager, _rx) = manager();
        let mut host = OneShotHost(Some(Box::new(connection)));

        let id = manager.open(&mut host, &handle(7, 1), 9600).unwrap();
        assert!(manager.is_current(id));
        assert_eq!(manager.active_link(), Some((DeviceId(7), 9600)));

        assert_eq!(manager.close(), Some(DeviceId(7)));
        assert!(!manager.is_open());
    }

    #[test]
    fn test_configure_failure_releases_connection() {
        let mut port = MockSerialPortIo::new();
        port.expect_configure()
            .returning(|_| Err(ScopeError::Read("unsupported baud".to_string())));
        port.expect_close().times(1).returning(|| Ok(()));

        let mut connection = MockUsbConnection::new();
        connection
            .expect_open_port()
            .return_once(move |_| Ok(Box::new(port)));
        connection.expect_close().times(1).returning(|| Ok(()));

        let (mut manager, _rx) = manager();
        let mut host = OneShotHost(Some(Box::new(connection)));

        let err = manager.open(&mut host, &handle(7, 1), 9600).unwrap_err();
        assert_eq!(err.to_string(), "failed to open port: read error: unsupported baud");
        assert!(!manager.is_open());
    }

    #[test]
    fn test_no_ports_releases_connection() {
        let mut connection = MockUsbConnection::new();
        connection.expect_open_port().never();
        connection.expect_close().times(1).returning(|| Ok(()));

        let (mut manager, _rx) = manager();
        let mut host = OneShotHost(Some(Box::new(connection)));

        let err = manager.open(&mut host, &handle(7, 0), 9600).unwrap_err();
        assert!(matches!(err, ScopeError::NoPorts));
        assert!(!manager.is_open());
    }

    #[test]
    fn test_open_device_refused() {
        let (mut manager, _rx) = manager();
        let mut host = OneShotHost(None);
        let err = manager.open(&mut host, &handle(7, 1), 9600).unwrap_err();
        assert_eq!(err.to_string(), "failed to open device");
    }

    #[test]
    fn test_reopen_tears_down_previous_session() {
        let mock = MockUsbHost::new()
            .with_device(DeviceId(1), "a")
            .with_device(DeviceId(2), "b");
        let mut host = mock.clone();
        let (mut manager, rx) = manager();

        let first = manager.open(&mut host, &mock.handle(DeviceId(1)).unwrap(), 9600).unwrap();
        let second = manager.open(&mut host, &mock.handle(DeviceId(2)).unwrap(), 9600).unwrap();
        assert_ne!(first, second);
        assert!(!manager.is_current(first));

        let stats = mock.stats();
        assert_eq!(stats.connections_opened, 2);
        assert_eq!(stats.connections_closed, 1);
        assert_eq!(stats.ports_closed, 1);

        // Data for the old device is never read by a loop again
        mock.push_data(DeviceId(1), b"0,1,1\n");
        mock.push_data(DeviceId(2), b"0,2,2\n");
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            event,
            BackendEvent::Session(SessionEvent::Frames {
                session: second,
                frames: vec!["0,2,2".to_string()],
            })
        );
    }

    #[test]
    fn test_close_is_idempotent() {
        let mock = MockUsbHost::new().with_device(DeviceId(1), "a");
        let mut host = mock.clone();
        let (mut manager, _rx) = manager();

        manager.open(&mut host, &mock.handle(DeviceId(1)).unwrap(), 9600).unwrap();
        assert_eq!(manager.close(), Some(DeviceId(1)));
        assert_eq!(manager.close(), None);
        assert_eq!(mock.stats().connections_closed, 1);
    }

    #[test]
    fn test_transport_loss_is_reported_not_torn_down() {
        let mock = MockUsbHost::new().with_device(DeviceId(1), "a");
        let mut host = mock.clone();
        let (mut manager, rx) = manager();

        let id = manager.open(&mut host, &mock.handle(DeviceId(1)).unwrap(), 9600).unwrap();
        mock.push_transport_failure(DeviceId(1));

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(
            event,
            BackendEvent::Session(SessionEvent::TransportLost { session, .. }) if session == id
        ));
        // The manager still owns the session until the coordinator closes it
        assert!(manager.is_current(id));
        assert_eq!(mock.stats().connections_closed, 0);
        manager.close();
    }
}
