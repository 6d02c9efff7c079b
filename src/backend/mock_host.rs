//! Scripted USB host for tests and demos
//!
//! [`MockUsbHost`] implements [`UsbHost`] over shared in-memory state. Clones
//! share that state, so a test keeps one clone to script the device side
//! (attach, detach, push bytes, inject failures) while the coordinator owns
//! another.
//!
//! # Example
//!
//! ```ignore
//! use serial_scope::backend::{MockUsbHost, PermissionReply};
//! use serial_scope::types::DeviceId;
//!
//! let mock = MockUsbHost::new()
//!     .with_device(DeviceId(7), "CH340 serial")
//!     .with_permission_reply(PermissionReply::Grant);
//!
//! let (backend, frontend) = SerialBackend::new(config, Box::new(mock.clone()));
//! // ...
//! mock.push_data(DeviceId(7), b"0,1,2\n");
//! ```
//!
//! Only compiled with the `mock-host` feature (on by default) or in tests.

use crate::backend::host_trait::{
    ControlLine, DriverHandle, EnumeratedDevice, LineConfig, PortInfo, ReadFailure, SerialPortIo,
    UsbConnection, UsbHost,
};
use crate::backend::HostEventSender;
use crate::error::{Result, ScopeError};
use crate::types::{DeviceDescriptor, DeviceId};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// CH340 identifiers, a common USB serial bridge
const MOCK_VENDOR_ID: u16 = 0x1a86;
const MOCK_PRODUCT_ID: u16 = 0x7523;

/// Samples between reset packets in the sine feed
const SINE_RESET_EVERY: u64 = 1000;

/// Unread items above which the sine feed drops samples
const SINE_BACKLOG_LIMIT: usize = 256;

/// How the mock answers permission requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionReply {
    /// Record the request; the test delivers the answer itself
    Manual,
    /// Grant and report the device id
    #[default]
    Grant,
    /// Refuse
    Deny,
    /// Grant but report no device id
    GrantWithoutId,
}

/// Counters describing what the engine did to the mock
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockHostStats {
    pub enumerations: u64,
    pub permission_requests: Vec<DeviceId>,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub ports_opened: u64,
    pub ports_closed: u64,
    pub last_line_config: Option<LineConfig>,
    pub control_lines: Vec<(ControlLine, bool)>,
}

#[derive(Debug)]
enum FeedItem {
    Data(Vec<u8>),
    Transient(String),
    TransportFailure,
}

#[derive(Debug, Default)]
struct FeedQueue {
    items: VecDeque<FeedItem>,
    detached: bool,
    open_ports: usize,
}

/// Byte stream of one mock device, shared with its open ports
#[derive(Debug, Default)]
struct MockFeed {
    queue: Mutex<FeedQueue>,
    ready: Condvar,
}

impl MockFeed {
    fn push(&self, item: FeedItem) {
        lock(&self.queue).items.push_back(item);
        self.ready.notify_all();
    }

    /// Queue only while a port is open and the reader keeps up
    fn push_live(&self, item: FeedItem) {
        let mut queue = lock(&self.queue);
        if queue.open_ports == 0 || queue.items.len() >= SINE_BACKLOG_LIMIT {
            return;
        }
        queue.items.push_back(item);
        drop(queue);
        self.ready.notify_all();
    }

    fn detach(&self) {
        lock(&self.queue).detached = true;
        self.ready.notify_all();
    }

    #[cfg(test)]
    fn pending_items(&self) -> usize {
        lock(&self.queue).items.len()
    }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> std::result::Result<usize, ReadFailure> {
        let deadline = Instant::now() + timeout;
        let mut queue = lock(&self.queue);

        loop {
            if let Some(item) = queue.items.pop_front() {
                return match item {
                    FeedItem::Data(mut bytes) => {
                        let n = bytes.len().min(buf.len());
                        buf[..n].copy_from_slice(&bytes[..n]);
                        if n < bytes.len() {
                            queue.items.push_front(FeedItem::Data(bytes.split_off(n)));
                        }
                        Ok(n)
                    }
                    FeedItem::Transient(message) => Err(ReadFailure::Transient(message)),
                    FeedItem::TransportFailure => Err(ReadFailure::Transport(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "transport failure",
                    ))),
                };
            }

            if queue.detached {
                return Err(ReadFailure::Transport(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "device detached",
                )));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(0);
            }
            queue = self
                .ready
                .wait_timeout(queue, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }
}

#[derive(Debug)]
struct MockDevice {
    descriptor: DeviceDescriptor,
    port_count: usize,
    feed: Arc<MockFeed>,
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<MockDevice>,
    granted: HashSet<DeviceId>,
    permission_reply: PermissionReply,
    enumeration_error: Option<String>,
    refuse_open: HashSet<DeviceId>,
    configure_error: Option<String>,
    events: Option<HostEventSender>,
    stats: MockHostStats,
}

impl MockState {
    fn device(&self, id: DeviceId) -> Option<&MockDevice> {
        self.devices.iter().find(|d| d.descriptor.id == id)
    }
}

/// In-memory [`UsbHost`]
#[derive(Debug, Clone, Default)]
pub struct MockUsbHost {
    state: Arc<Mutex<MockState>>,
}

impl MockUsbHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host with one device that grants every request
    pub fn demo() -> Self {
        Self::new().with_device(DeviceId(1), "Mock CDC Serial")
    }

    /// Builder form of [`add_device`](Self::add_device)
    pub fn with_device(self, id: DeviceId, title: &str) -> Self {
        self.add_device(id, title);
        self
    }

    /// Add a device exposing `port_count` ports
    pub fn with_device_ports(self, id: DeviceId, title: &str, port_count: usize) -> Self {
        self.insert_device(id, title, port_count);
        self
    }

    pub fn with_permission_reply(self, reply: PermissionReply) -> Self {
        self.state().permission_reply = reply;
        self
    }

    /// Where attach/detach notifications are delivered
    pub fn set_event_sender(&self, events: HostEventSender) {
        self.state().events = Some(events);
    }

    /// Attach a device with one port
    pub fn add_device(&self, id: DeviceId, title: &str) {
        self.insert_device(id, title, 1);
    }

    fn insert_device(&self, id: DeviceId, title: &str, port_count: usize) {
        let mut state = self.state();
        state.devices.retain(|d| d.descriptor.id != id);
        state.devices.push(MockDevice {
            descriptor: DeviceDescriptor::new(id, title, MOCK_VENDOR_ID, MOCK_PRODUCT_ID),
            port_count,
            feed: Arc::new(MockFeed::default()),
        });
        if let Some(events) = &state.events {
            events.attached();
        }
    }

    /// Detach a device; its open ports fail with a transport error
    pub fn remove_device(&self, id: DeviceId) {
        let mut state = self.state();
        let Some(index) = state.devices.iter().position(|d| d.descriptor.id == id) else {
            return;
        };
        let device = state.devices.remove(index);
        device.feed.detach();
        state.granted.remove(&id);
        if let Some(events) = &state.events {
            events.detached(Some(id));
        }
    }

    pub fn grant_permission(&self, id: DeviceId) {
        self.state().granted.insert(id);
    }

    /// Make `open_connection` refuse this device
    pub fn fail_open(&self, id: DeviceId) {
        self.state().refuse_open.insert(id);
    }

    /// Make every port reject its line configuration (None restores)
    pub fn fail_configure(&self, message: Option<&str>) {
        self.state().configure_error = message.map(str::to_string);
    }

    /// Make enumeration fail (None restores)
    pub fn fail_enumeration(&self, message: Option<&str>) {
        self.state().enumeration_error = message.map(str::to_string);
    }

    /// Queue bytes for the device's next reads
    pub fn push_data(&self, id: DeviceId, bytes: &[u8]) {
        if let Some(feed) = self.feed(id) {
            feed.push(FeedItem::Data(bytes.to_vec()));
        }
    }

    /// Queue a recoverable read failure
    pub fn push_transient(&self, id: DeviceId, message: &str) {
        if let Some(feed) = self.feed(id) {
            feed.push(FeedItem::Transient(message.to_string()));
        }
    }

    /// Queue a transport failure
    pub fn push_transport_failure(&self, id: DeviceId) {
        if let Some(feed) = self.feed(id) {
            feed.push(FeedItem::TransportFailure);
        }
    }

    /// Driver handle as enumeration would report it
    pub fn handle(&self, id: DeviceId) -> Option<DriverHandle> {
        self.state().device(id).map(driver_handle)
    }

    pub fn stats(&self) -> MockHostStats {
        self.state().stats.clone()
    }

    /// Stream sine samples to a device until it is detached
    ///
    /// Samples are only queued while a port on the device is open, so a
    /// later connection starts from live data rather than a backlog.
    pub fn spawn_sine_feed(&self, id: DeviceId, interval: Duration) -> std::io::Result<JoinHandle<()>> {
        let host = self.clone();
        std::thread::Builder::new()
            .name(format!("mock-feed-{}", id.0))
            .spawn(move || {
                let Some(feed) = host.feed(id) else {
                    return;
                };
                let mut sample: u64 = 0;
                while host.state().device(id).is_some_and(|d| Arc::ptr_eq(&d.feed, &feed)) {
                    if sample > 0 && sample % SINE_RESET_EVERY == 0 {
                        feed.push_live(FeedItem::Data(b"1,0,0\r\n".to_vec()));
                    }
                    let x = sample as f64 * interval.as_secs_f64();
                    let y = (x * std::f64::consts::TAU).sin();
                    feed.push_live(FeedItem::Data(format!("0,{:.4},{:.4}\r\n", x, y).into_bytes()));
                    sample += 1;
                    std::thread::sleep(interval);
                }
            })
    }

    fn feed(&self, id: DeviceId) -> Option<Arc<MockFeed>> {
        self.state().device(id).map(|d| d.feed.clone())
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }
}

impl UsbHost for MockUsbHost {
    fn enumerate(&mut self) -> Result<Vec<EnumeratedDevice>> {
        let mut state = self.state();
        state.stats.enumerations += 1;
        if let Some(message) = &state.enumeration_error {
            return Err(ScopeError::Enumeration(message.clone()));
        }
        Ok(state
            .devices
            .iter()
            .map(|d| EnumeratedDevice {
                descriptor: d.descriptor.clone(),
                handle: driver_handle(d),
            })
            .collect())
    }

    fn has_permission(&self, handle: &DriverHandle) -> bool {
        self.state().granted.contains(&handle.device_id())
    }

    fn request_permission(&mut self, handle: &DriverHandle, events: &HostEventSender) {
        let id = handle.device_id();
        let mut state = self.state();
        state.stats.permission_requests.push(id);

        match state.permission_reply {
            PermissionReply::Manual => {}
            PermissionReply::Grant => {
                state.granted.insert(id);
                events.permission_result(Some(id), true);
            }
            PermissionReply::Deny => {
                events.permission_result(Some(id), false);
            }
            PermissionReply::GrantWithoutId => {
                state.granted.insert(id);
                events.permission_result(None, true);
            }
        }
    }

    fn open_connection(&mut self, handle: &DriverHandle) -> Option<Box<dyn UsbConnection>> {
        let id = handle.device_id();
        let mut state = self.state();
        if state.refuse_open.contains(&id) {
            return None;
        }
        let feed = state.device(id)?.feed.clone();
        state.stats.connections_opened += 1;
        Some(Box::new(MockConnection {
            state: self.state.clone(),
            feed,
            closed: false,
        }))
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
    feed: Arc<MockFeed>,
    closed: bool,
}

impl UsbConnection for MockConnection {
    fn open_port(&mut self, _port: &PortInfo) -> Result<Box<dyn SerialPortIo>> {
        lock(&self.state).stats.ports_opened += 1;
        Ok(Box::new(MockPort {
            state: self.state.clone(),
            feed: self.feed.clone(),
            reader: Some(FeedReader::new(self.feed.clone())),
            closed: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            lock(&self.state).stats.connections_closed += 1;
        }
        Ok(())
    }
}

/// Marks a feed as being read for as long as it lives
struct FeedReader(Arc<MockFeed>);

impl FeedReader {
    fn new(feed: Arc<MockFeed>) -> Self {
        lock(&feed.queue).open_ports += 1;
        Self(feed)
    }
}

impl Drop for FeedReader {
    fn drop(&mut self) {
        let mut queue = lock(&self.0.queue);
        queue.open_ports = queue.open_ports.saturating_sub(1);
    }
}

struct MockPort {
    state: Arc<Mutex<MockState>>,
    feed: Arc<MockFeed>,
    reader: Option<FeedReader>,
    closed: bool,
}

impl SerialPortIo for MockPort {
    fn configure(&mut self, config: &LineConfig) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(message) = &state.configure_error {
            return Err(ScopeError::Serial(serialport::Error::new(
                serialport::ErrorKind::InvalidInput,
                message.clone(),
            )));
        }
        state.stats.last_line_config = Some(*config);
        Ok(())
    }

    fn set_control_line(&mut self, line: ControlLine, level: bool) -> Result<()> {
        lock(&self.state).stats.control_lines.push((line, level));
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> std::result::Result<usize, ReadFailure> {
        if self.closed {
            return Err(ReadFailure::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "port closed",
            )));
        }
        self.feed.read(buf, timeout)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.reader = None;
            lock(&self.state).stats.ports_closed += 1;
        }
        Ok(())
    }
}

fn driver_handle(device: &MockDevice) -> DriverHandle {
    let id = device.descriptor.id;
    let ports = (0..device.port_count)
        .map(|index| PortInfo {
            index,
            name: format!("mock{}-{}", id.0, index),
        })
        .collect();
    DriverHandle::new(id, format!("mock:{}", id.0), ports)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
