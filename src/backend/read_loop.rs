//! Per-session read loop
//!
//! One thread per session performing blocking reads with a bounded timeout.
//! Decoded frames are handed to the coordinator as [`SessionEvent`]s tagged
//! with the session id; the loop itself never mutates shared state.
//!
//! # Cancellation
//!
//! The coordinator publishes the active session id in a shared atomic. The
//! loop compares it with its own id before every read and exits on mismatch,
//! so a superseded loop stops within one read timeout.

use crate::backend::connection::SessionId;
use crate::backend::host_trait::{ReadFailure, SerialPortIo};
use crate::backend::{BackendEvent, SessionEvent};
use crate::config::{AppConfig, DEFAULT_READ_BUFFER_SIZE, DEFAULT_READ_TIMEOUT_MS};
use crate::pipeline::FrameDecoder;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Pause after a transient failure before reading again
const TRANSIENT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A port shared between the read loop and the coordinator's teardown
pub type SharedPort = Arc<Mutex<Box<dyn SerialPortIo>>>;

/// Read loop tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLoopConfig {
    /// Bounded timeout for each blocking read
    pub timeout: Duration,
    /// Read buffer size in bytes
    pub buffer_size: usize,
}

impl Default for ReadLoopConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ReadLoopConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.serial.read_timeout_ms.max(1)),
            buffer_size: config.serial.read_buffer_size.max(1),
        }
    }
}

/// The background reader for one session
pub struct ReadLoop {
    session: SessionId,
    active: Arc<AtomicU64>,
    port: SharedPort,
    events: Sender<BackendEvent>,
    config: ReadLoopConfig,
    decoder: FrameDecoder,
    utf8_pending: Vec<u8>,
}

impl ReadLoop {
    pub fn new(
        session: SessionId,
        active: Arc<AtomicU64>,
        port: SharedPort,
        events: Sender<BackendEvent>,
        config: ReadLoopConfig,
    ) -> Self {
        Self {
            session,
            active,
            port,
            events,
            config,
            decoder: FrameDecoder::new(),
            utf8_pending: Vec::new(),
        }
    }

    /// Start the loop on its own thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("serial-read-{}", self.session.0))
            .spawn(move || self.run())
    }

    /// Whether this loop still belongs to the active session
    fn is_current(&self) -> bool {
        self.active.load(Ordering::SeqCst) == self.session.0
    }

    /// Run until superseded or the transport fails
    pub fn run(mut self) {
        tracing::debug!("Read loop for session {} started", self.session.0);
        let mut buf = vec![0u8; self.config.buffer_size];

        while self.is_current() {
            let result = {
                let mut port = self.port.lock().unwrap_or_else(|e| e.into_inner());
                port.read(&mut buf, self.config.timeout)
            };

            match result {
                Ok(0) => {}
                Ok(n) => {
                    let text = decode_utf8_chunk(&mut self.utf8_pending, &buf[..n]);
                    let frames = self.decoder.handle(&text);
                    if !frames.is_empty() {
                        tracing::trace!("Session {}: {} frame(s)", self.session.0, frames.len());
                        if !self.report(SessionEvent::Frames {
                            session: self.session,
                            frames,
                        }) {
                            break;
                        }
                    }
                }
                Err(ReadFailure::Transport(e)) => {
                    tracing::error!("Session {}: transport lost: {}", self.session.0, e);
                    self.report(SessionEvent::TransportLost {
                        session: self.session,
                        message: e.to_string(),
                    });
                    break;
                }
                Err(ReadFailure::Transient(message)) => {
                    tracing::warn!("Session {}: read failed: {}", self.session.0, message);
                    if !self.report(SessionEvent::ReadError {
                        session: self.session,
                        message,
                    }) {
                        break;
                    }
                    std::thread::sleep(TRANSIENT_ERROR_BACKOFF);
                }
            }
        }

        tracing::debug!("Read loop for session {} exiting", self.session.0);
    }

    fn report(&self, event: SessionEvent) -> bool {
        if self.events.send(BackendEvent::Session(event)).is_err() {
            tracing::debug!("Coordinator gone, stopping read loop {}", self.session.0);
            return false;
        }
        true
    }
}

/// Decode bytes as UTF-8, holding back an incomplete trailing sequence
///
/// Invalid bytes are replaced; a multi-byte character split across two reads
/// is decoded once its remaining bytes arrive.
pub fn decode_utf8_chunk(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    let mut data = std::mem::take(pending);
    data.extend_from_slice(bytes);

    let mut text = String::with_capacity(data.len());
    let mut rest = data.as_slice();
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                text.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    // truncated sequence at the end, wait for the rest
                    None => {
                        pending.extend_from_slice(after);
                        break;
                    }
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[len..];
                    }
                }
            }
        }
    }
    text
}
