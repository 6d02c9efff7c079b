//! Error handling for serial-scope
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the application. The `Display` text of most variants is shown
//! to the user verbatim through the published snapshot, so keep it short.

use thiserror::Error;

/// Main error type for serial-scope operations
#[derive(Error, Debug)]
pub enum ScopeError {
    /// The host refused access to the device
    #[error("permission denied")]
    PermissionDenied,

    /// The device vanished from the catalog before it could be used
    #[error("device no longer available")]
    DeviceUnavailable,

    /// The host could not open a connection to the device
    #[error("failed to open device")]
    OpenDevice,

    /// The driver exposes no serial ports
    #[error("no serial ports available")]
    NoPorts,

    /// Opening or configuring the serial port failed
    #[error("failed to open port: {0}")]
    OpenPort(String),

    /// Connect was requested without a selected device
    #[error("no device selected")]
    NoDeviceSelected,

    /// Baud rate text is not a positive integer
    #[error("invalid baud rate: {0:?}")]
    InvalidBaudRate(String),

    /// Y-axis bound texts could not be parsed into a usable range
    #[error("invalid y-axis bounds: {0}")]
    InvalidAxisBounds(String),

    /// Device enumeration failed
    #[error("failed to enumerate devices: {0}")]
    Enumeration(String),

    /// Errors raised by the read loop
    #[error("read error: {0}")]
    Read(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors reported by the serialport crate
    #[error("{0}")]
    Serial(#[from] serialport::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ScopeError>,
    },
}

impl ScopeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ScopeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for serial-scope operations
pub type Result<T> = std::result::Result<T, ScopeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
