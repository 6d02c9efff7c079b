//! Backend: device lifecycle and serial ingestion
//!
//! This module owns everything between the host USB subsystem and the
//! published [`UiSnapshot`](crate::state::UiSnapshot). All state transitions
//! happen on one coordination thread ([`BackendWorker`]); a per-session
//! [`ReadLoop`] thread does nothing but blocking reads.
//!
//! # Architecture
//!
//! A single inbound crossbeam channel feeds the coordinator, processed
//! strictly in arrival order:
//!
//! - [`BackendCommand`] - presentation-layer commands (connect, select, ...)
//! - [`HostEvent`] - attach/detach/permission notifications from the host
//! - [`SessionEvent`] - frames and failures reported by the read loop
//!
//! The read loop never touches session state. On a transport failure it
//! reports [`SessionEvent::TransportLost`] and exits; the coordinator does the
//! teardown. Events from a superseded session are recognised by their
//! [`SessionId`] and dropped.
//!
//! # Components
//!
//! - [`DeviceCatalog`] - enumerated devices and their driver handles
//! - [`PermissionNegotiator`] - at most one pending permission request
//! - [`ConnectionManager`] - at most one open session
//! - [`SerialPortHost`] - real host over the `serialport` crate
//! - [`MockUsbHost`] - scripted host for tests (feature-gated)
//!
//! # Example
//!
//! ```ignore
//! use serial_scope::backend::{SerialBackend, SerialPortHost};
//! use serial_scope::config::AppConfig;
//!
//! let (backend, frontend) = SerialBackend::new(AppConfig::default(), Box::new(SerialPortHost::new()));
//! std::thread::spawn(move || backend.run());
//!
//! frontend.set_baud_rate("115200");
//! frontend.connect();
//!
//! for snapshot in frontend.subscribe() {
//!     println!("{} - {} samples", snapshot.status, snapshot.window.len());
//! }
//! ```

pub mod catalog;
pub mod connection;
pub mod host_trait;
#[cfg(any(test, feature = "mock-host"))]
pub mod mock_host;
pub mod permission;
pub mod read_loop;
pub mod serial_host;
pub mod worker;

pub use catalog::{resolve_selection, DeviceCatalog};
pub use connection::{ConnectionManager, SessionId};
pub use host_trait::{
    ControlLine, DriverHandle, EnumeratedDevice, LineConfig, Parity, PortInfo, ReadFailure,
    SerialPortIo, UsbConnection, UsbHost,
};
#[cfg(any(test, feature = "mock-host"))]
pub use mock_host::{MockHostStats, MockUsbHost, PermissionReply};
pub use permission::{PendingPermission, PermissionNegotiator, PermissionOutcome};
pub use read_loop::{ReadLoop, ReadLoopConfig};
pub use serial_host::SerialPortHost;
pub use worker::BackendWorker;

use crate::config::AppConfig;
use crate::state::{SnapshotReader, StateStore, UiSnapshot};
use crate::types::{DeviceId, IngestMode};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Message sent from the presentation layer to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    /// Re-enumerate attached devices
    Refresh,
    /// Select a device (None clears the selection)
    SelectDevice(Option<DeviceId>),
    /// Set the baud rate text
    SetBaudRate(String),
    /// Set the sample window capacity text
    SetWindowCapacity(String),
    /// Set manual Y-axis bounds (both empty = automatic)
    SetYAxisBounds { min: String, max: String },
    /// Switch the frame sink strategy
    SetIngestMode(IngestMode),
    /// Connect to the selected device
    Connect,
    /// Disconnect and drop any pending permission request
    Disconnect,
    /// Shutdown the backend
    Shutdown,
}

/// Asynchronous notification from the host USB subsystem
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A device was attached
    Attached,
    /// A device was detached; some hosts don't say which
    Detached(Option<DeviceId>),
    /// Answer to a permission request; some hosts omit the device id
    PermissionResult {
        device_id: Option<DeviceId>,
        granted: bool,
    },
}

/// Report from a session's read loop
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Complete frames decoded from the byte stream
    Frames {
        session: SessionId,
        frames: Vec<String>,
    },
    /// Recoverable read failure; the loop keeps running
    ReadError { session: SessionId, message: String },
    /// The transport is gone; the loop has exited and wants a disconnect
    TransportLost { session: SessionId, message: String },
}

/// Everything the coordinator consumes, in one channel
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Command(BackendCommand),
    Host(HostEvent),
    Session(SessionEvent),
}

/// Cloneable handle for delivering host events to the coordinator
#[derive(Debug, Clone)]
pub struct HostEventSender {
    sender: Sender<BackendEvent>,
}

impl HostEventSender {
    pub fn new(sender: Sender<BackendEvent>) -> Self {
        Self { sender }
    }

    /// Deliver an event; false if the backend is gone
    pub fn send(&self, event: HostEvent) -> bool {
        self.sender.send(BackendEvent::Host(event)).is_ok()
    }

    pub fn attached(&self) -> bool {
        self.send(HostEvent::Attached)
    }

    pub fn detached(&self, device_id: Option<DeviceId>) -> bool {
        self.send(HostEvent::Detached(device_id))
    }

    pub fn permission_result(&self, device_id: Option<DeviceId>, granted: bool) -> bool {
        self.send(HostEvent::PermissionResult { device_id, granted })
    }
}

/// Presentation-side handle: sends commands, reads snapshots
#[derive(Clone)]
pub struct FrontendHandle {
    /// Sender into the coordinator's inbound channel
    pub command_sender: Sender<BackendEvent>,
    snapshots: SnapshotReader,
}

impl FrontendHandle {
    /// Send a command to the backend
    pub fn send_command(&self, cmd: BackendCommand) -> bool {
        self.command_sender.send(BackendEvent::Command(cmd)).is_ok()
    }

    /// Handle for injecting host events
    pub fn host_events(&self) -> HostEventSender {
        HostEventSender::new(self.command_sender.clone())
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<UiSnapshot> {
        self.snapshots.latest()
    }

    /// Receive every snapshot published from now on
    pub fn subscribe(&self) -> Receiver<Arc<UiSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Request a catalog refresh
    pub fn refresh(&self) {
        self.send_command(BackendCommand::Refresh);
    }

    /// Select a device
    pub fn select_device(&self, id: Option<DeviceId>) {
        self.send_command(BackendCommand::SelectDevice(id));
    }

    /// Set the baud rate text
    pub fn set_baud_rate(&self, text: impl Into<String>) {
        self.send_command(BackendCommand::SetBaudRate(text.into()));
    }

    /// Set the sample window capacity text
    pub fn set_sample_window_capacity(&self, text: impl Into<String>) {
        self.send_command(BackendCommand::SetWindowCapacity(text.into()));
    }

    /// Set manual Y-axis bounds
    pub fn set_y_axis_bounds(&self, min: impl Into<String>, max: impl Into<String>) {
        self.send_command(BackendCommand::SetYAxisBounds {
            min: min.into(),
            max: max.into(),
        });
    }

    /// Switch the frame sink strategy
    pub fn set_ingest_mode(&self, mode: IngestMode) {
        self.send_command(BackendCommand::SetIngestMode(mode));
    }

    /// Request connection to the selected device
    pub fn connect(&self) {
        self.send_command(BackendCommand::Connect);
    }

    /// Request disconnection
    pub fn disconnect(&self) {
        self.send_command(BackendCommand::Disconnect);
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.send_command(BackendCommand::Shutdown);
    }
}

/// The serial backend that runs in a separate thread
pub struct SerialBackend {
    config: AppConfig,
    host: Box<dyn UsbHost>,
    inbound_rx: Receiver<BackendEvent>,
    inbound_tx: Sender<BackendEvent>,
    store: StateStore,
    running: Arc<AtomicBool>,
}

impl SerialBackend {
    /// Create a new backend with its communication channel
    pub fn new(config: AppConfig, host: Box<dyn UsbHost>) -> (Self, FrontendHandle) {
        // Unbounded: the read loop must never block on reporting
        let (inbound_tx, inbound_rx) = unbounded();
        let store = StateStore::new(UiSnapshot::from_config(&config));

        let frontend = FrontendHandle {
            command_sender: inbound_tx.clone(),
            snapshots: store.reader(),
        };

        let backend = Self {
            config,
            host,
            inbound_rx,
            inbound_tx,
            store,
            running: Arc::new(AtomicBool::new(true)),
        };

        (backend, frontend)
    }

    /// Build the coordinator without running it
    pub fn into_worker(self) -> BackendWorker {
        BackendWorker::new(
            self.config,
            self.host,
            self.inbound_rx,
            self.inbound_tx,
            self.store,
            self.running,
        )
    }

    /// Run the coordination loop until shutdown
    pub fn run(self) {
        self.into_worker().run();
    }

    /// Get a handle to stop the backend
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }
}
