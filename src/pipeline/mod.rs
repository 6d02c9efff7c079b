//! Ingestion pipeline: bytes → frames → packets → sample window.
//!
//! Everything in here is synchronous and free of I/O so it can be unit tested
//! on its own. The read loop drives [`FrameDecoder`]; the coordinator hands the
//! resulting frames to the active [`FrameSink`].
//!
//! # Architecture
//!
//! ```text
//! [ReadLoop] ──chunk──► [FrameDecoder] ──frames──► [FrameSink]
//!                                                   ├── PlotSink ──► [Packet] ──► [SampleWindow]
//!                                                   └── LineLogSink ──► [LineLog]
//! ```

pub mod frame;
pub mod packet;
pub mod sink;
pub mod window;

pub use frame::{split_frames, FrameDecoder};
pub use packet::{Packet, PACKET_RESET, PACKET_SAMPLE};
pub use sink::{sink_for, FrameSink, LineLog, LineLogSink, LogLine, PlotSink};
pub use window::SampleWindow;
