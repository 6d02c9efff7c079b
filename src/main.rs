//! serial-scope - headless runner
//!
//! Connects to a USB serial device and logs connection changes and the
//! rolling sample window as data arrives.

use anyhow::Context;
use clap::Parser;
use serial_scope::{
    backend::{FrontendHandle, SerialBackend, SerialPortHost, UsbHost},
    config::{self, AppConfig, AppState},
    types::{ConnectionStatus, IngestMode},
    UiSnapshot,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How often the window summary is logged
const SUMMARY_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for the first enumeration before connecting
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "serial-scope", version, about = "Plot samples streamed by a USB serial device")]
struct Args {
    /// Config file (defaults to the app data directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the built-in mock device instead of real serial ports
    #[arg(long)]
    mock: bool,

    /// Baud rate
    #[arg(long)]
    baud: Option<String>,

    /// Connect to the first device whose title contains this text
    #[arg(long)]
    device: Option<String>,

    /// Keep raw lines instead of plotting samples
    #[arg(long)]
    line_log: bool,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,serial_scope=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("Starting serial-scope");

    let config_path = args.config.clone().or_else(config::config_path);
    let mut config = match &config_path {
        Some(path) if path.exists() => AppConfig::load_or_default(path),
        _ => AppConfig::default(),
    };

    let mut app_state = AppState::load_or_default();
    if let Some(baud) = args.baud.clone().or_else(|| app_state.last_baud_rate.clone()) {
        config.serial.baud_rate = baud;
    }
    if args.line_log {
        config.ingest_mode = IngestMode::LineLog;
    }

    let use_mock = args.mock || config.host.use_mock;
    let hotplug_interval = Duration::from_millis(config.host.hotplug_poll_ms.max(1));
    let (host, host_setup) = build_host(use_mock)?;

    let (backend, frontend) = SerialBackend::new(config, host);
    let running = backend.stop_handle();
    host_setup.start(&frontend, hotplug_interval, running.clone())?;

    let updates = frontend.subscribe();
    let worker = std::thread::Builder::new()
        .name("serial-backend".to_string())
        .spawn(move || backend.run())
        .context("failed to spawn backend thread")?;

    let wanted = args.device.clone().or_else(|| app_state.last_device_title.clone());
    if let Some(snapshot) = wait_for_devices(&frontend) {
        if let Some(wanted) = &wanted {
            if let Some(device) = snapshot.devices.iter().find(|d| d.title.contains(wanted.as_str())) {
                frontend.select_device(Some(device.id));
            }
        }
        frontend.connect();
    } else {
        tracing::warn!("No devices found, waiting for one to be attached");
    }

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let mut last: Option<Arc<UiSnapshot>> = None;
    let mut last_summary = Instant::now();

    while running.load(std::sync::atomic::Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }

        let snapshot = match updates.recv_timeout(Duration::from_millis(200)) {
            Ok(snapshot) => snapshot,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        log_changes(last.as_deref(), &snapshot);

        if let ConnectionStatus::Connected { .. } = snapshot.status {
            if let Some(device) = snapshot.selected_device() {
                app_state.update_last_connection(&device.title, &snapshot.baud_rate);
            }
        }

        if last_summary.elapsed() >= SUMMARY_INTERVAL {
            log_summary(&snapshot);
            last_summary = Instant::now();
        }
        last = Some(snapshot);
    }

    tracing::info!("Shutting down...");
    frontend.shutdown();
    if worker.join().is_err() {
        tracing::error!("Backend thread panicked");
    }

    if let Err(e) = app_state.save() {
        tracing::warn!("Failed to save app state: {}", e);
    }

    Ok(())
}

/// What to start once the backend's event channel exists
enum HostSetup {
    Serial(SerialPortHost),
    #[cfg(feature = "mock-host")]
    Mock(serial_scope::backend::MockUsbHost),
}

impl HostSetup {
    fn start(
        self,
        frontend: &FrontendHandle,
        hotplug_interval: Duration,
        running: Arc<std::sync::atomic::AtomicBool>,
    ) -> anyhow::Result<()> {
        match self {
            HostSetup::Serial(host) => {
                host.spawn_hotplug_monitor(frontend.host_events(), hotplug_interval, running)
                    .context("failed to spawn hot-plug monitor")?;
            }
            #[cfg(feature = "mock-host")]
            HostSetup::Mock(mock) => {
                mock.set_event_sender(frontend.host_events());
                mock.spawn_sine_feed(serial_scope::DeviceId(1), Duration::from_millis(10))
                    .context("failed to spawn mock feed")?;
            }
        }
        Ok(())
    }
}

fn build_host(use_mock: bool) -> anyhow::Result<(Box<dyn UsbHost>, HostSetup)> {
    #[cfg(feature = "mock-host")]
    if use_mock {
        tracing::info!("Using mock host");
        let mock = serial_scope::backend::MockUsbHost::demo();
        return Ok((Box::new(mock.clone()), HostSetup::Mock(mock)));
    }
    #[cfg(not(feature = "mock-host"))]
    if use_mock {
        anyhow::bail!("mock host requested but the mock-host feature is disabled");
    }

    let host = SerialPortHost::new();
    Ok((Box::new(host.clone()), HostSetup::Serial(host)))
}

fn wait_for_devices(frontend: &FrontendHandle) -> Option<Arc<UiSnapshot>> {
    let deadline = Instant::now() + DISCOVERY_TIMEOUT;
    while Instant::now() < deadline {
        let snapshot = frontend.snapshot();
        if !snapshot.devices.is_empty() {
            return Some(snapshot);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    None
}

fn log_changes(previous: Option<&UiSnapshot>, current: &UiSnapshot) {
    if previous.map(|p| &p.devices) != Some(&current.devices) {
        for device in &current.devices {
            tracing::info!("  {} {} [{}]", device.id, device.title, device.vid_pid);
        }
    }
    if previous.map(|p| p.status) != Some(current.status) {
        tracing::info!("Status: {}", current.status);
    }
    if previous.and_then(|p| p.last_error.as_ref()) != current.last_error.as_ref() {
        if let Some(error) = &current.last_error {
            tracing::warn!("Error: {}", error);
        }
    }
}

fn log_summary(snapshot: &UiSnapshot) {
    match snapshot.ingest_mode {
        IngestMode::Plot => match snapshot.window.latest() {
            Some(point) => tracing::info!(
                "{} samples (capacity {}), latest ({}, {}), {} discarded",
                snapshot.window.len(),
                snapshot.window_capacity,
                point.x,
                point.y,
                snapshot.discarded_lines
            ),
            None => tracing::debug!("Sample window empty"),
        },
        IngestMode::LineLog => {
            if let Some(line) = snapshot.line_log.iter().last() {
                tracing::info!(
                    "{} lines, latest [{}] {}",
                    snapshot.line_log.len(),
                    line.received_at.format("%H:%M:%S%.3f"),
                    line.text
                );
            }
        }
    }
}
