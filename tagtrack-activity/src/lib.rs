//! Tracked item model for tagtrack.
//!
//! This crate holds the values the correlation engine produces and the seam
//! through which they leave it:
//! - [`Event`]: one structured, timed record derived from a log line
//! - [`Activity`]: an ordered group of events describing one unit of work
//! - [`Snapshot`]: a named bag of typed properties
//! - [`EventSink`]: the receiver of finished items, with channel, JSON-lines
//!   and tracing-backed implementations

mod events;
mod handle;
mod sink;
mod timestamp;

pub use events::{
    Activity, ActivityStatus, CompCode, DataType, Event, InvalidValue, OpType, Property,
    PropertyValue, RecordError, Severity, Snapshot, Source, SourceType, Tracked,
};
pub use handle::{ChannelSink, channel};
pub use sink::{EventSink, JsonLinesSink, SINK_TARGET, SinkError, TracingSink, tracing_level};
pub use timestamp::Timestamp;
