//! The live-output pipeline: framed records, the serialized viewer sink,
//! the polling log tailer, the timeout engine, and the connection registry
//! used by the shutdown broadcaster.

pub mod frame;
pub mod monitor;
pub mod registry;
pub mod sink;
pub mod tailer;

pub use frame::{Frame, OutputStream};
pub use monitor::{monitor_task, MonitorTimings};
pub use registry::ConnectionRegistry;
pub use sink::{FrameSink, SinkClosed, WsSink};
pub use tailer::tail_file;
