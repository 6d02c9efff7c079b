//! Host implementation over the `serialport` crate
//!
//! Desktop systems expose USB serial adapters as ordinary serial ports
//! (`/dev/ttyUSB0`, `COM3`, ...). Each USB port becomes one device with one
//! port. Access control is enforced by the OS when the port is opened, so
//! permission requests are answered immediately.
//!
//! The OS gives no attach/detach callbacks to this crate, so
//! [`SerialPortHost::spawn_hotplug_monitor`] polls the port list and turns
//! differences into [`HostEvent`](super::HostEvent)s.

use crate::backend::host_trait::{
    ControlLine, DriverHandle, EnumeratedDevice, LineConfig, PortInfo, ReadFailure, SerialPortIo,
    UsbConnection, UsbHost,
};
use crate::backend::HostEventSender;
use crate::error::{Result, ScopeError};
use crate::types::{DeviceDescriptor, DeviceId};
use serialport::{DataBits, FlowControl, SerialPortType, StopBits};
use std::collections::{HashMap, HashSet};
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Baud rate used to open a port before it is configured
const OPEN_BAUD_RATE: u32 = 9600;

/// A USB serial port found by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
struct UsbSerialPort {
    name: String,
    title: String,
    vendor_id: u16,
    product_id: u16,
}

/// Assigns stable ids to port names for the life of the process
#[derive(Debug, Default)]
struct PortRegistry {
    ids: HashMap<String, DeviceId>,
    next: u32,
}

impl PortRegistry {
    fn id_for(&mut self, name: &str) -> DeviceId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        self.next += 1;
        let id = DeviceId(self.next);
        self.ids.insert(name.to_string(), id);
        id
    }

    fn lookup(&self, name: &str) -> Option<DeviceId> {
        self.ids.get(name).copied()
    }
}

/// [`UsbHost`] backed by the system's serial ports
#[derive(Debug, Clone, Default)]
pub struct SerialPortHost {
    registry: Arc<Mutex<PortRegistry>>,
}

impl SerialPortHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll the port list and report attach/detach until `running` is cleared
    pub fn spawn_hotplug_monitor(
        &self,
        events: HostEventSender,
        interval: Duration,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        let registry = self.registry.clone();
        std::thread::Builder::new()
            .name("hotplug-monitor".to_string())
            .spawn(move || {
                let mut known = current_port_names();
                tracing::debug!("Hotplug monitor started with {} port(s)", known.len());

                while running.load(Ordering::SeqCst) {
                    std::thread::sleep(interval);
                    let now = current_port_names();

                    for name in known.difference(&now) {
                        let id = lock(&registry).lookup(name);
                        tracing::info!("Serial port {} detached", name);
                        if !events.detached(id) {
                            return;
                        }
                    }
                    if now.difference(&known).next().is_some() {
                        tracing::info!("Serial port attached");
                        if !events.attached() {
                            return;
                        }
                    }
                    known = now;
                }
            })
    }
}

impl UsbHost for SerialPortHost {
    fn enumerate(&mut self) -> Result<Vec<EnumeratedDevice>> {
        let ports = usb_serial_ports()?;
        let mut registry = lock(&self.registry);

        Ok(ports
            .into_iter()
            .map(|port| {
                let id = registry.id_for(&port.name);
                let handle = DriverHandle::new(
                    id,
                    port.name.clone(),
                    vec![PortInfo {
                        index: 0,
                        name: port.name.clone(),
                    }],
                );
                EnumeratedDevice {
                    descriptor: DeviceDescriptor::new(id, port.title, port.vendor_id, port.product_id),
                    handle,
                }
            })
            .collect())
    }

    fn has_permission(&self, _handle: &DriverHandle) -> bool {
        true
    }

    fn request_permission(&mut self, handle: &DriverHandle, events: &HostEventSender) {
        events.permission_result(Some(handle.device_id()), true);
    }

    fn open_connection(&mut self, handle: &DriverHandle) -> Option<Box<dyn UsbConnection>> {
        match current_port_names().contains(handle.key()) {
            true => Some(Box::new(SerialConnection)),
            false => {
                tracing::warn!("Port {} is no longer present", handle.key());
                None
            }
        }
    }
}

/// Connection to a desktop serial adapter; the port itself carries all state
struct SerialConnection;

impl UsbConnection for SerialConnection {
    fn open_port(&mut self, port: &PortInfo) -> Result<Box<dyn SerialPortIo>> {
        let opened = serialport::new(&port.name, OPEN_BAUD_RATE)
            .timeout(Duration::from_millis(1))
            .open()?;
        Ok(Box::new(SystemSerialPort {
            port: Some(opened),
            timeout: Duration::from_millis(1),
        }))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct SystemSerialPort {
    port: Option<Box<dyn serialport::SerialPort>>,
    timeout: Duration,
}

impl SystemSerialPort {
    fn port(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| ScopeError::OpenPort("port already closed".to_string()))
    }
}

impl SerialPortIo for SystemSerialPort {
    fn configure(&mut self, config: &LineConfig) -> Result<()> {
        let port = self.port()?;
        port.set_baud_rate(config.baud_rate)?;
        port.set_data_bits(DataBits::Eight)?;
        port.set_stop_bits(StopBits::One)?;
        port.set_parity(serialport::Parity::None)?;
        port.set_flow_control(FlowControl::None)?;
        Ok(())
    }

    fn set_control_line(&mut self, line: ControlLine, level: bool) -> Result<()> {
        let port = self.port()?;
        match line {
            ControlLine::Dtr => port.write_data_terminal_ready(level)?,
            ControlLine::Rts => port.write_request_to_send(level)?,
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> std::result::Result<usize, ReadFailure> {
        let Some(port) = self.port.as_mut() else {
            return Err(ReadFailure::Transport(std::io::Error::new(
                ErrorKind::NotConnected,
                "port closed",
            )));
        };

        if self.timeout != timeout {
            port.set_timeout(timeout)
                .map_err(|e| ReadFailure::Transient(e.to_string()))?;
            self.timeout = timeout;
        }

        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => classify_read_error(e),
        }
    }

    fn close(&mut self) -> Result<()> {
        // serialport releases the handle on drop
        self.port = None;
        Ok(())
    }
}

/// Map an I/O error from a read onto the read loop's failure kinds
fn classify_read_error(e: std::io::Error) -> std::result::Result<usize, ReadFailure> {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => Ok(0),
        ErrorKind::BrokenPipe
        | ErrorKind::NotConnected
        | ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionReset
        | ErrorKind::UnexpectedEof
        | ErrorKind::NotFound
        | ErrorKind::PermissionDenied => Err(ReadFailure::Transport(e)),
        _ => Err(ReadFailure::Transient(e.to_string())),
    }
}

fn usb_serial_ports() -> Result<Vec<UsbSerialPort>> {
    let ports = serialport::available_ports()
        .map_err(|e| ScopeError::Enumeration(e.to_string()))?;

    Ok(ports
        .into_iter()
        .filter(|p| is_preferred_name(&p.port_name))
        .filter_map(|p| match p.port_type {
            SerialPortType::UsbPort(info) => Some(UsbSerialPort {
                title: port_title(&p.port_name, info.product.as_deref()),
                name: p.port_name,
                vendor_id: info.vid,
                product_id: info.pid,
            }),
            _ => None,
        })
        .collect())
}

fn current_port_names() -> HashSet<String> {
    match usb_serial_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.name).collect(),
        Err(e) => {
            tracing::warn!("Port scan failed: {}", e);
            HashSet::new()
        }
    }
}

/// On macOS only the calling-unit devices open without waiting for carrier
fn is_preferred_name(name: &str) -> bool {
    if cfg!(target_os = "macos") {
        !name.starts_with("/dev/tty.")
    } else {
        true
    }
}

fn port_title(port_name: &str, product: Option<&str>) -> String {
    match product {
        Some(product) if !product.trim().is_empty() => format!("{} ({})", product.trim(), port_name),
        _ => port_name.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
