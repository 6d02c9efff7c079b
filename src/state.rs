//! Published state consumed by the presentation layer
//!
//! The coordinator is the only writer. Every mutation goes through
//! [`StateStore::update`], which builds the next [`UiSnapshot`] from the
//! current one and swaps it in as a whole, so readers never observe a
//! half-applied change. Large buffers are shared through `Arc` and copied on
//! write.

use crate::config::AppConfig;
use crate::pipeline::{LineLog, SampleWindow};
use crate::types::{AxisBounds, ConnectionStatus, DeviceDescriptor, DeviceId, IngestMode};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};

/// Immutable view of the whole engine state
#[derive(Debug, Clone)]
pub struct UiSnapshot {
    /// Incremented on every publish
    pub revision: u64,
    /// Devices from the last catalog refresh
    pub devices: Vec<DeviceDescriptor>,
    /// Currently selected device
    pub selected: Option<DeviceId>,
    /// Baud rate text as entered by the user
    pub baud_rate: String,
    /// Effective sample window capacity
    pub window_capacity: usize,
    /// Manual Y-axis bounds (None = automatic)
    pub y_bounds: Option<AxisBounds>,
    /// Connection status
    pub status: ConnectionStatus,
    /// Last user-visible error
    pub last_error: Option<String>,
    /// Active frame sink
    pub ingest_mode: IngestMode,
    /// Rolling sample buffer
    pub window: Arc<SampleWindow>,
    /// Raw lines (line-log mode)
    pub line_log: Arc<LineLog>,
    /// Lines dropped as protocol padding
    pub discarded_lines: u64,
}

impl Default for UiSnapshot {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl UiSnapshot {
    /// Initial snapshot for a configuration
    pub fn from_config(config: &AppConfig) -> Self {
        let window = SampleWindow::new(config.display.window_capacity);
        Self {
            revision: 0,
            devices: Vec::new(),
            selected: None,
            baud_rate: config.serial.baud_rate.clone(),
            window_capacity: window.capacity(),
            y_bounds: config.display.y_bounds,
            status: ConnectionStatus::Idle,
            last_error: None,
            ingest_mode: config.ingest_mode,
            window: Arc::new(window),
            line_log: Arc::new(LineLog::new(config.display.line_log_capacity)),
            discarded_lines: 0,
        }
    }

    /// Descriptor of the selected device
    pub fn selected_device(&self) -> Option<&DeviceDescriptor> {
        let id = self.selected?;
        self.devices.iter().find(|d| d.id == id)
    }
}

struct Shared {
    current: RwLock<Arc<UiSnapshot>>,
    subscribers: Mutex<Vec<Sender<Arc<UiSnapshot>>>>,
}

/// Writer side, owned by the coordinator
pub struct StateStore {
    shared: Arc<Shared>,
}

impl StateStore {
    pub fn new(initial: UiSnapshot) -> Self {
        Self {
            shared: Arc::new(Shared {
                current: RwLock::new(Arc::new(initial)),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Get a read handle for observers
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            shared: self.shared.clone(),
        }
    }

    pub fn latest(&self) -> Arc<UiSnapshot> {
        read_current(&self.shared)
    }

    /// Build the next snapshot from the current one and publish it atomically
    pub fn update<F>(&self, f: F) -> Arc<UiSnapshot>
    where
        F: FnOnce(&mut UiSnapshot),
    {
        let mut next = (*self.latest()).clone();
        f(&mut next);
        next.revision += 1;
        let next = Arc::new(next);

        {
            let mut current = self
                .shared
                .current
                .write()
                .unwrap_or_else(|e| e.into_inner());
            *current = next.clone();
        }

        let mut subscribers = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(next.clone()).is_ok());

        next
    }
}

/// Cloneable read handle
#[derive(Clone)]
pub struct SnapshotReader {
    shared: Arc<Shared>,
}

impl SnapshotReader {
    /// The most recently published snapshot
    pub fn latest(&self) -> Arc<UiSnapshot> {
        read_current(&self.shared)
    }

    /// Receive every snapshot published from now on, in order
    pub fn subscribe(&self) -> Receiver<Arc<UiSnapshot>> {
        let (tx, rx) = unbounded();
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }
}

fn read_current(shared: &Shared) -> Arc<UiSnapshot> {
    shared
        .current
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}
