//! Core data types shared between the backend and its consumers

use serde::{Deserialize, Serialize};

/// Stable integer identity of an attached device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A candidate device as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Identity of the device
    pub id: DeviceId,
    /// Human readable title (product name or port name)
    pub title: String,
    /// Vendor/product pair formatted as `vvvv:pppp`
    pub vid_pid: String,
}

impl DeviceDescriptor {
    /// Create a descriptor from raw USB identifiers
    pub fn new(id: DeviceId, title: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            id,
            title: title.into(),
            vid_pid: format!("{:04x}:{:04x}", vendor_id, product_id),
        }
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.title, self.vid_pid)
    }
}

/// A single numeric sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Get as plot point array
    pub fn as_array(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// Connection status of the single serial session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No session and no pending permission request
    #[default]
    Idle,
    /// Waiting for the host to answer a permission request
    Requesting(DeviceId),
    /// A session is open and the read loop is running
    Connected {
        device_id: DeviceId,
        baud_rate: u32,
    },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Idle => write!(f, "Idle"),
            ConnectionStatus::Requesting(id) => write!(f, "Requesting permission for {}", id),
            ConnectionStatus::Connected {
                device_id,
                baud_rate,
            } => write!(f, "Connected to {} @ {} baud", device_id, baud_rate),
        }
    }
}

/// Which frame-handling strategy is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// Parse packets and feed the sample window
    #[default]
    Plot,
    /// Keep the raw decoded lines
    LineLog,
}

impl std::fmt::Display for IngestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestMode::Plot => write!(f, "Plot"),
            IngestMode::LineLog => write!(f, "Line log"),
        }
    }
}

/// Manual Y-axis range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    pub min: f64,
    pub max: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_vid_pid_format() {
        let d = DeviceDescriptor::new(DeviceId(3), "CP2102", 0x10c4, 0xea60);
        assert_eq!(d.vid_pid, "10c4:ea60");
        assert_eq!(d.to_string(), "CP2102 (10c4:ea60)");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::Idle.to_string(), "Idle");
        let status = ConnectionStatus::Connected {
            device_id: DeviceId(7),
            baud_rate: 9600,
        };
        assert!(status.is_connected());
        assert_eq!(status.to_string(), "Connected to #7 @ 9600 baud");
    }

    #[test]
    fn test_ingest_mode_serde() {
        let json = serde_json::to_string(&IngestMode::LineLog).unwrap();
        assert_eq!(json, "\"line_log\"");
        let mode: IngestMode = serde_json::from_str("\"plot\"").unwrap();
        assert_eq!(mode, IngestMode::Plot);
    }
}
