//! # serial-scope: USB serial sample ingestion
//!
//! Manages the lifecycle of one USB serial device: enumeration, host
//! permission, opening and configuring the port, reading its byte stream and
//! turning `<type>,<x>,<y>` lines into a bounded rolling window of samples for
//! live display.
//!
//! ## Architecture
//!
//! - **Backend**: a coordination thread owns every state transition; a
//!   per-session read thread only performs blocking reads
//! - **Pipeline**: pure frame decoding, packet parsing and the sample window
//! - **State**: immutable snapshots published atomically to observers
//! - **Communication**: one crossbeam channel into the coordinator
//!
//! ## Configuration
//!
//! Configuration and remembered state live in the platform data directory
//! under `dev.serial-scope`:
//!
//! - **Linux**: `~/.local/share/dev.serial-scope/`
//! - **macOS**: `~/Library/Application Support/dev.serial-scope/`
//! - **Windows**: `%APPDATA%\dev.serial-scope\`
//!
//! ## Example
//!
//! ```ignore
//! use serial_scope::{backend::{SerialBackend, SerialPortHost}, config::AppConfig};
//!
//! let (backend, frontend) = SerialBackend::new(AppConfig::default(), Box::new(SerialPortHost::new()));
//! let worker = std::thread::spawn(move || backend.run());
//!
//! frontend.connect();
//! let snapshot = frontend.snapshot();
//! println!("{}: {} samples", snapshot.status, snapshot.window.len());
//!
//! frontend.shutdown();
//! worker.join().ok();
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use backend::{BackendCommand, FrontendHandle, SerialBackend, SerialPortHost};
pub use config::{AppConfig, AppState};
pub use error::{Result, ScopeError};
pub use state::UiSnapshot;
pub use types::{ConnectionStatus, DeviceDescriptor, DeviceId, SamplePoint};
