//! Host USB capability traits
//!
//! The engine never talks to an operating system directly. Everything it needs
//! from the host - enumeration, permission, opening a connection and the
//! serial port on it - goes through the traits in this module, so the real
//! [`SerialPortHost`](super::serial_host::SerialPortHost) and the scripted
//! [`MockUsbHost`](super::mock_host::MockUsbHost) are interchangeable.
//!
//! Implementations must be `Send`: the host is owned by the coordinator thread
//! and ports are read from the read-loop thread.

use crate::backend::HostEventSender;
use crate::error::Result;
use crate::types::{DeviceDescriptor, DeviceId};
use std::time::Duration;

/// A serial port exposed by a driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Position of the port on the driver
    pub index: usize,
    /// Host name of the port (e.g. `/dev/ttyUSB0`)
    pub name: String,
}

/// Opaque capability for opening one enumerated device
///
/// Handles are produced by [`UsbHost::enumerate`] and owned by the device
/// catalog, which throws all of them away on every refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverHandle {
    device_id: DeviceId,
    key: String,
    ports: Vec<PortInfo>,
}

impl DriverHandle {
    /// Create a handle; `key` is whatever the host needs to find the device again
    pub fn new(device_id: DeviceId, key: impl Into<String>, ports: Vec<PortInfo>) -> Self {
        Self {
            device_id,
            key: key.into(),
            ports,
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ports(&self) -> &[PortInfo] {
        &self.ports
    }
}

/// One result of enumeration
#[derive(Debug, Clone)]
pub struct EnumeratedDevice {
    pub descriptor: DeviceDescriptor,
    pub handle: DriverHandle,
}

/// Serial control lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlLine {
    /// Data Terminal Ready
    Dtr,
    /// Request To Send
    Rts,
}

/// Serial line framing; only 8 data bits, 1 stop bit, no parity is supported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
}

impl LineConfig {
    /// 8N1 at the given baud rate
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
        }
    }
}

impl std::fmt::Display for LineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} baud {}N{}", self.baud_rate, self.data_bits, self.stop_bits)
    }
}

/// Why a read failed
#[derive(Debug)]
pub enum ReadFailure {
    /// Hardware or transport is gone; the session cannot continue
    Transport(std::io::Error),
    /// Anything else; the read loop reports it and keeps going
    Transient(String),
}

impl std::fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadFailure::Transport(e) => write!(f, "transport failure: {}", e),
            ReadFailure::Transient(msg) => write!(f, "{}", msg),
        }
    }
}

/// An opened serial port
#[cfg_attr(test, mockall::automock)]
pub trait SerialPortIo: Send {
    /// Apply baud rate and framing
    fn configure(&mut self, config: &LineConfig) -> Result<()>;

    /// Drive a control line
    fn set_control_line(&mut self, line: ControlLine, level: bool) -> Result<()>;

    /// Blocking read with a bounded timeout
    ///
    /// `Ok(0)` means the timeout expired without data.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> std::result::Result<usize, ReadFailure>;

    /// Release the port
    fn close(&mut self) -> Result<()>;
}

/// An opened device connection
#[cfg_attr(test, mockall::automock)]
pub trait UsbConnection: Send {
    /// Open one of the driver's ports on this connection
    fn open_port(&mut self, port: &PortInfo) -> Result<Box<dyn SerialPortIo>>;

    /// Release the connection
    fn close(&mut self) -> Result<()>;
}

/// The host USB subsystem
pub trait UsbHost: Send {
    /// List currently attached candidate devices
    fn enumerate(&mut self) -> Result<Vec<EnumeratedDevice>>;

    /// Whether the host already allows opening this device
    fn has_permission(&self, handle: &DriverHandle) -> bool;

    /// Ask the host for permission
    ///
    /// Fire-and-forget: the outcome is delivered later as a
    /// [`HostEvent::PermissionResult`](super::HostEvent::PermissionResult)
    /// through `events`.
    fn request_permission(&mut self, handle: &DriverHandle, events: &HostEventSender);

    /// Open a connection to the device, `None` if the host refuses
    fn open_connection(&mut self, handle: &DriverHandle) -> Option<Box<dyn UsbConnection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_config_is_8n1() {
        let config = LineConfig::new(9600);
        assert_eq!(config.data_bits, 8);
        assert_eq!(config.stop_bits, 1);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.to_string(), "9600 baud 8N1");
    }

    #[test]
    fn test_driver_handle_accessors() {
        let handle = DriverHandle::new(
            DeviceId(4),
            "/dev/ttyACM0",
            vec![PortInfo {
                index: 0,
                name: "/dev/ttyACM0".to_string(),
            }],
        );
        assert_eq!(handle.device_id(), DeviceId(4));
        assert_eq!(handle.key(), "/dev/ttyACM0");
        assert_eq!(handle.ports().len(), 1);
    }
}
