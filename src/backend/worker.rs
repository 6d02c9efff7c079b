//! Backend Worker Thread Implementation
//!
//! The worker is the coordination point. It owns the device catalog, the
//! pending permission request, the open session and the active frame sink,
//! and it is the only code that publishes snapshots.
//!
//! # Event handling
//!
//! Everything arrives through one channel and is handled in arrival order:
//!
//! - **Commands**: selection, settings, connect, disconnect
//! - **Host events**: attach/detach refresh the catalog; a detach of the
//!   connected device tears the session down first; permission results
//!   resume a pending connect
//! - **Session events**: frames are applied through the frame sink; a
//!   transport loss triggers the teardown the read loop asked for
//!
//! Session events carry the id of the session that produced them. Anything
//! from a session that is no longer current is dropped, which is what makes
//! a detach racing a transport failure close the session exactly once.

use crate::backend::catalog::{resolve_selection, DeviceCatalog};
use crate::backend::connection::ConnectionManager;
use crate::backend::host_trait::{DriverHandle, UsbHost};
use crate::backend::permission::{PendingPermission, PermissionNegotiator, PermissionOutcome};
use crate::backend::read_loop::ReadLoopConfig;
use crate::backend::{BackendCommand, BackendEvent, HostEvent, HostEventSender, SessionEvent};
use crate::config::settings::{parse_axis_bounds, parse_baud_rate, parse_window_capacity};
use crate::config::AppConfig;
use crate::error::ScopeError;
use crate::pipeline::{sink_for, FrameSink};
use crate::state::{StateStore, UiSnapshot};
use crate::types::{ConnectionStatus, DeviceId, IngestMode};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long the loop waits for an event before re-checking the running flag
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The coordination loop
pub struct BackendWorker {
    host: Box<dyn UsbHost>,
    inbound_rx: Receiver<BackendEvent>,
    host_events: HostEventSender,
    store: StateStore,
    running: Arc<AtomicBool>,
    catalog: DeviceCatalog,
    permissions: PermissionNegotiator,
    connections: ConnectionManager,
    sink: Box<dyn FrameSink>,
}

impl BackendWorker {
    /// Create a new backend worker
    pub fn new(
        config: AppConfig,
        host: Box<dyn UsbHost>,
        inbound_rx: Receiver<BackendEvent>,
        inbound_tx: Sender<BackendEvent>,
        store: StateStore,
        running: Arc<AtomicBool>,
    ) -> Self {
        let read_config = ReadLoopConfig::from_app_config(&config);

        Self {
            host,
            inbound_rx,
            host_events: HostEventSender::new(inbound_tx.clone()),
            store,
            running,
            catalog: DeviceCatalog::new(),
            permissions: PermissionNegotiator::new(),
            connections: ConnectionManager::new(read_config, inbound_tx),
            sink: sink_for(config.ingest_mode),
        }
    }

    /// Run the main worker loop
    pub fn run(mut self) {
        tracing::info!("Backend worker started");
        self.refresh_catalog();

        while self.running.load(Ordering::SeqCst) {
            match self.inbound_rx.recv_timeout(IDLE_POLL_INTERVAL) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                }
            }
        }

        self.disconnect();
        tracing::info!("Backend worker stopped");
    }

    /// Handle every event already queued, including ones queued while handling
    ///
    /// Returns the number of events handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.inbound_rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
        handled
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<UiSnapshot> {
        self.store.latest()
    }

    fn handle_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Command(cmd) => self.handle_command(cmd),
            BackendEvent::Host(event) => self.handle_host_event(event),
            BackendEvent::Session(event) => self.handle_session_event(event),
        }
    }

    /// Handle a single command
    fn handle_command(&mut self, cmd: BackendCommand) {
        match cmd {
            BackendCommand::Refresh => {
                self.refresh_catalog();
            }
            BackendCommand::SelectDevice(id) => {
                self.select_device(id);
            }
            BackendCommand::SetBaudRate(text) => {
                self.set_baud_rate(text);
            }
            BackendCommand::SetWindowCapacity(text) => {
                self.set_window_capacity(&text);
            }
            BackendCommand::SetYAxisBounds { min, max } => {
                self.set_y_axis_bounds(&min, &max);
            }
            BackendCommand::SetIngestMode(mode) => {
                self.set_ingest_mode(mode);
            }
            BackendCommand::Connect => {
                self.connect();
            }
            BackendCommand::Disconnect => {
                self.disconnect();
            }
            BackendCommand::Shutdown => {
                tracing::info!("Shutdown requested");
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    fn handle_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Attached => {
                tracing::info!("Device attached");
                self.refresh_catalog();
            }
            HostEvent::Detached(id) => self.on_detached(id),
            HostEvent::PermissionResult { device_id, granted } => {
                self.on_permission_result(device_id, granted);
            }
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Frames { session, frames } => {
                if !self.connections.is_current(session) {
                    tracing::trace!("Dropping {} frame(s) from stale session {}", frames.len(), session.0);
                    return;
                }
                let sink = &mut self.sink;
                self.store.update(|s| sink.accept_all(&frames, s));
            }
            SessionEvent::ReadError { session, message } => {
                if self.connections.is_current(session) {
                    self.report(ScopeError::Read(message));
                }
            }
            SessionEvent::TransportLost { session, message } => {
                if !self.connections.is_current(session) {
                    tracing::debug!("Transport loss from stale session {}, ignoring", session.0);
                    return;
                }
                tracing::warn!("Transport lost, disconnecting");
                self.connections.close();
                self.report(ScopeError::Read(message));
            }
        }
    }

    /// Re-enumerate and keep the selection pointing at a listed device
    fn refresh_catalog(&mut self) {
        let refreshed = self
            .catalog
            .refresh(self.host.as_mut())
            .map(|devices| devices.to_vec());
        match refreshed {
            Ok(devices) => {
                self.store.update(|s| {
                    s.selected = resolve_selection(&devices, s.selected);
                    s.devices = devices;
                });
            }
            Err(e) => self.report(e),
        }
    }

    fn select_device(&mut self, id: Option<DeviceId>) {
        if let Some(id) = id {
            if !self.catalog.contains(id) {
                tracing::warn!("Ignoring selection of unknown device {}", id);
                return;
            }
        }
        self.store.update(|s| s.selected = id);
    }

    fn set_baud_rate(&mut self, text: String) {
        let error = parse_baud_rate(&text).err();
        if let Some(e) = &error {
            tracing::warn!("{}", e);
        }
        self.store.update(|s| {
            s.baud_rate = text;
            if let Some(e) = error {
                s.last_error = Some(e.to_string());
            }
        });
    }

    fn set_window_capacity(&mut self, text: &str) {
        let previous = self.store.latest().window_capacity;
        let capacity = parse_window_capacity(text, previous);
        tracing::debug!("Sample window capacity {} -> {}", previous, capacity);
        self.store.update(|s| {
            s.window_capacity = capacity;
            Arc::make_mut(&mut s.window).set_capacity(capacity);
        });
    }

    fn set_y_axis_bounds(&mut self, min: &str, max: &str) {
        match parse_axis_bounds(min, max) {
            Ok(bounds) => {
                self.store.update(|s| s.y_bounds = bounds);
            }
            Err(e) => self.report(e),
        }
    }

    fn set_ingest_mode(&mut self, mode: IngestMode) {
        if self.sink.mode() == mode {
            return;
        }
        tracing::info!("Ingest mode set to {:?}", mode);
        self.sink = sink_for(mode);
        self.store.update(|s| s.ingest_mode = mode);
    }

    /// Connect to the selected device, asking for permission first if needed
    fn connect(&mut self) {
        let snapshot = self.store.latest();
        let Some(device_id) = snapshot.selected else {
            self.report(ScopeError::NoDeviceSelected);
            return;
        };
        let baud_rate = match parse_baud_rate(&snapshot.baud_rate) {
            Ok(baud) => baud,
            Err(e) => {
                self.report(e);
                return;
            }
        };
        let Some(handle) = self.catalog.handle(device_id).cloned() else {
            self.report(ScopeError::DeviceUnavailable);
            return;
        };

        if self.host.has_permission(&handle) {
            if let Some(pending) = self.permissions.clear() {
                tracing::debug!("Direct connect supersedes pending request for {}", pending.device_id);
            }
            self.open_session(&handle, baud_rate);
            return;
        }

        tracing::info!("Requesting permission for {}", device_id);
        self.permissions.request(device_id, snapshot.baud_rate.clone());
        self.store.update(|s| {
            s.status = ConnectionStatus::Requesting(device_id);
            s.last_error = None;
        });
        self.host.request_permission(&handle, &self.host_events);
    }

    fn disconnect(&mut self) {
        if let Some(pending) = self.permissions.clear() {
            tracing::debug!("Dropped pending permission request for {}", pending.device_id);
        }
        self.connections.close();
        self.publish_status();
    }

    fn open_session(&mut self, handle: &DriverHandle, baud_rate: u32) {
        match self.connections.open(self.host.as_mut(), handle, baud_rate) {
            Ok(_) => {
                tracing::info!("Connected to {} at {} baud", handle.device_id(), baud_rate);
                let status = self.current_status();
                self.store.update(|s| {
                    s.status = status;
                    s.last_error = None;
                });
            }
            Err(e) => self.report(e),
        }
    }

    fn on_permission_result(&mut self, device_id: Option<DeviceId>, granted: bool) {
        let outcome = match self.permissions.on_result(device_id, granted) {
            PermissionOutcome::NeedsLookup { device_id, granted } => {
                tracing::debug!("Permission result without device id, resolving {} from catalog", device_id);
                self.refresh_catalog();
                let still_available = self.catalog.contains(device_id);
                self.permissions.resolve_after_lookup(granted, still_available)
            }
            outcome => outcome,
        };
        self.apply_permission_outcome(outcome);
    }

    fn apply_permission_outcome(&mut self, outcome: PermissionOutcome) {
        match outcome {
            PermissionOutcome::Ignored | PermissionOutcome::NeedsLookup { .. } => {}
            PermissionOutcome::Granted(pending) => self.on_granted(pending),
            PermissionOutcome::Denied(pending) => {
                tracing::warn!("Permission denied for {}", pending.device_id);
                self.report(ScopeError::PermissionDenied);
            }
            PermissionOutcome::Unavailable(pending) => {
                tracing::warn!("{} vanished while awaiting permission", pending.device_id);
                self.report(ScopeError::DeviceUnavailable);
            }
        }
    }

    fn on_granted(&mut self, pending: PendingPermission) {
        tracing::info!("Permission granted for {}", pending.device_id);
        let baud_rate = match parse_baud_rate(&pending.baud_text) {
            Ok(baud) => baud,
            Err(e) => {
                self.report(e);
                return;
            }
        };
        let Some(handle) = self.catalog.handle(pending.device_id).cloned() else {
            self.report(ScopeError::DeviceUnavailable);
            return;
        };
        self.open_session(&handle, baud_rate);
    }

    fn on_detached(&mut self, id: Option<DeviceId>) {
        tracing::info!("Device detached: {}", id.map_or("unknown".to_string(), |id| id.to_string()));

        if id.is_some() && id == self.connections.active_device() {
            self.connections.close();
            self.report(ScopeError::DeviceUnavailable);
        }

        self.refresh_catalog();

        // Unattributed detach: find out from the refreshed catalog what went away
        if let Some(active) = self.connections.active_device() {
            if !self.catalog.contains(active) {
                self.connections.close();
                self.report(ScopeError::DeviceUnavailable);
            }
        }
        if let Some(pending) = self.permissions.pending().map(|p| p.device_id) {
            if !self.catalog.contains(pending) {
                self.permissions.clear();
                self.report(ScopeError::DeviceUnavailable);
            }
        }
    }

    /// Status derived from the owned session and permission state
    fn current_status(&self) -> ConnectionStatus {
        if let Some(pending) = self.permissions.pending() {
            return ConnectionStatus::Requesting(pending.device_id);
        }
        match self.connections.active_link() {
            Some((device_id, baud_rate)) => ConnectionStatus::Connected {
                device_id,
                baud_rate,
            },
            None => ConnectionStatus::Idle,
        }
    }

    fn publish_status(&self) {
        let status = self.current_status();
        self.store.update(|s| s.status = status);
    }

    /// Publish a user-visible error together with the resulting status
    fn report(&self, error: ScopeError) {
        tracing::warn!("{}", error);
        let status = self.current_status();
        self.store.update(|s| {
            s.status = status;
            s.last_error = Some(error.to_string());
        });
    }
}
