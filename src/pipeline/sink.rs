//! Frame sinks - what happens to a decoded line
//!
//! The connection, permission and read-loop machinery is shared; only the
//! final step differs between consumers. A [`FrameSink`] takes each decoded
//! frame and applies it to the snapshot the coordinator is about to publish.
//!
//! - [`PlotSink`] parses packets and drives the [`SampleWindow`](super::SampleWindow)
//! - [`LineLogSink`] keeps the raw lines in a bounded [`LineLog`]

use crate::pipeline::packet::Packet;
use crate::state::UiSnapshot;
use crate::types::IngestMode;
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::sync::Arc;

/// Strategy applied to every decoded frame
pub trait FrameSink: Send {
    /// Which ingest mode this sink implements
    fn mode(&self) -> IngestMode;

    /// Apply one frame to the snapshot being built
    fn accept(&mut self, frame: &str, snapshot: &mut UiSnapshot);

    /// Apply a batch of frames in order
    fn accept_all(&mut self, frames: &[String], snapshot: &mut UiSnapshot) {
        for frame in frames {
            self.accept(frame, snapshot);
        }
    }
}

/// Create the sink for an ingest mode
pub fn sink_for(mode: IngestMode) -> Box<dyn FrameSink> {
    match mode {
        IngestMode::Plot => Box::new(PlotSink),
        IngestMode::LineLog => Box::new(LineLogSink),
    }
}

/// Parses packets into the sample window
#[derive(Debug, Default)]
pub struct PlotSink;

impl FrameSink for PlotSink {
    fn mode(&self) -> IngestMode {
        IngestMode::Plot
    }

    fn accept(&mut self, frame: &str, snapshot: &mut UiSnapshot) {
        match Packet::parse(frame) {
            Some(Packet::Sample(point)) => Arc::make_mut(&mut snapshot.window).append(point),
            Some(Packet::Reset) => {
                tracing::debug!("Reset packet received, clearing sample window");
                Arc::make_mut(&mut snapshot.window).reset();
            }
            Some(Packet::Reserved { kind }) => {
                tracing::trace!("Ignoring packet with reserved type {}", kind);
            }
            None => {
                tracing::trace!("Discarding malformed line {:?}", frame);
                snapshot.discarded_lines += 1;
            }
        }
    }
}

/// Keeps raw lines for a text log view
#[derive(Debug, Default)]
pub struct LineLogSink;

impl FrameSink for LineLogSink {
    fn mode(&self) -> IngestMode {
        IngestMode::LineLog
    }

    fn accept(&mut self, frame: &str, snapshot: &mut UiSnapshot) {
        Arc::make_mut(&mut snapshot.line_log).push(frame);
    }
}

/// A raw line with its arrival time
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub received_at: DateTime<Local>,
    pub text: String,
}

/// Bounded log of raw lines, oldest evicted first
#[derive(Debug, Clone, PartialEq)]
pub struct LineLog {
    lines: VecDeque<LogLine>,
    capacity: usize,
}

impl LineLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, text: &str) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(LogLine {
            received_at: Local::now(),
            text: text.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }
}
