//! Configuration management for serial-scope
//!
//! Two kinds of persisted data live here:
//!
//! - [`AppConfig`] - engine configuration (serial defaults, display limits,
//!   ingest mode, host options). Stored as JSON, every field has a default so
//!   partial files load cleanly.
//! - [`AppState`] - what the user last did (device, baud text), restored on
//!   the next start.
//!
//! Runtime parsing of the text fields the presentation layer hands us lives in
//! [`settings`].
//!
//! Both files are stored in the platform-appropriate data directory under
//! `dev.serial-scope`:
//!
//! - **Linux**: `~/.local/share/dev.serial-scope/`
//! - **macOS**: `~/Library/Application Support/dev.serial-scope/`
//! - **Windows**: `%APPDATA%\dev.serial-scope\`

pub mod settings;

pub use settings::*;

use crate::error::{Result, ResultExt, ScopeError};
use crate::types::{AxisBounds, IngestMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.serial-scope";

/// Config filename
pub const CONFIG_FILE: &str = "config.json";

/// App state filename
pub const APP_STATE_FILE: &str = "app_state.json";

/// Default baud rate text
pub const DEFAULT_BAUD_RATE: &str = "9600";

/// Default blocking read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Default read buffer size in bytes
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default sample window capacity
pub const DEFAULT_WINDOW_CAPACITY: usize = 10_000;

/// Default number of raw lines kept in line-log mode
pub const DEFAULT_LINE_LOG_CAPACITY: usize = 1000;

/// Default hot-plug polling interval in milliseconds
pub const DEFAULT_HOTPLUG_POLL_MS: u64 = 1000;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        ScopeError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            ScopeError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the default config file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

/// Get the path to the app state file
pub fn app_state_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(APP_STATE_FILE))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ScopeError::Config(format!("Failed to read {} {:?}: {}", what, path, e)))?;

    serde_json::from_str(&content)
        .map_err(|e| ScopeError::Config(format!("Failed to parse {} {:?}: {}", what, path, e)))
}

fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ScopeError::Config(format!("Failed to create {} directory: {}", what, e))
        })?;
    }

    let content = serde_json::to_string_pretty(value)
        .map_err(|e| ScopeError::Config(format!("Failed to serialize {}: {}", what, e)))?;

    std::fs::write(path, content)
        .map_err(|e| ScopeError::Config(format!("Failed to write {} {:?}: {}", what, path, e)))
}

// ==================== Engine Configuration ====================

/// Serial link defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate text used until the user enters another one
    pub baud_rate: String,
    /// Bounded timeout for each blocking read
    pub read_timeout_ms: u64,
    /// Size of the read buffer
    pub read_buffer_size: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE.to_string(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Display-side limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Capacity of the rolling sample window
    pub window_capacity: usize,
    /// Manual Y-axis bounds (None = automatic)
    pub y_bounds: Option<AxisBounds>,
    /// Number of raw lines kept in line-log mode
    pub line_log_capacity: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            y_bounds: None,
            line_log_capacity: DEFAULT_LINE_LOG_CAPACITY,
        }
    }
}

/// Host integration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// How often the hot-plug monitor polls for attach/detach
    pub hotplug_poll_ms: u64,
    /// Use the scripted mock host instead of real hardware
    pub use_mock: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            hotplug_poll_ms: DEFAULT_HOTPLUG_POLL_MS,
            use_mock: false,
        }
    }
}

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub display: DisplayConfig,
    pub ingest_mode: IngestMode,
    pub host: HostConfig,
}

impl AppConfig {
    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref(), "config file")
    }

    /// Load a config file, returning defaults if it is missing or broken
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config to disk as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path.as_ref(), self, "config file")
    }
}

// ==================== App State ====================

/// Application state persisted between runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    /// Title of the last connected device
    pub last_device_title: Option<String>,
    /// Baud text used for the last connection
    pub last_baud_rate: Option<String>,
}

impl AppState {
    /// Load app state from the default location
    pub fn load() -> Result<Self> {
        let path = app_state_path().ok_or_else(|| {
            ScopeError::Config("Could not determine app state path".to_string())
        })?;

        if !path.exists() {
            return Ok(Self::default());
        }

        read_json(&path, "app state")
    }

    /// Load app state, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load app state, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save app state to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir().context("Failed to save app state")?;
        write_json(&dir.join(APP_STATE_FILE), self, "app state")
    }

    /// Remember the device and baud text of a successful connection
    pub fn update_last_connection(&mut self, device_title: &str, baud_rate: &str) {
        self.last_device_title = Some(device_title.to_string());
        self.last_baud_rate = Some(baud_rate.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baud_rate, "9600");
        assert_eq!(config.serial.read_timeout_ms, 1000);
        assert_eq!(config.serial.read_buffer_size, 1024);
        assert_eq!(config.display.window_capacity, 10_000);
        assert_eq!(config.ingest_mode, IngestMode::Plot);
        assert!(!config.host.use_mock);
    }

    #[test]
    fn test_config_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.serial.baud_rate = "115200".to_string();
        config.display.y_bounds = Some(AxisBounds { min: -1.0, max: 1.0 });
        config.ingest_mode = IngestMode::LineLog;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.serial.baud_rate, "115200");
        assert_eq!(loaded.display.y_bounds, Some(AxisBounds { min: -1.0, max: 1.0 }));
        assert_eq!(loaded.ingest_mode, IngestMode::LineLog);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{ "display": { "window_capacity": 50 } }"#).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.display.window_capacity, 50);
        assert_eq!(loaded.display.line_log_capacity, DEFAULT_LINE_LOG_CAPACITY);
        assert_eq!(loaded.serial.baud_rate, DEFAULT_BAUD_RATE);
    }

    #[test]
    fn test_broken_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "not json").unwrap();

        assert!(AppConfig::load(&path).is_err());
        let config = AppConfig::load_or_default(&path);
        assert_eq!(config.display.window_capacity, DEFAULT_WINDOW_CAPACITY);
    }

    #[test]
    fn test_app_state_update() {
        let mut state = AppState::default();
        state.update_last_connection("CP2102", "115200");
        assert_eq!(state.last_device_title.as_deref(), Some("CP2102"));
        assert_eq!(state.last_baud_rate.as_deref(), Some("115200"));
    }
}
