//! Boundary between the correlation engine and whatever ships tracked items.
//!
//! The engine only ever hands fully formed, immutable [`Tracked`] values to an
//! [`EventSink`]. Serialization, transport and delivery guarantees belong to
//! the sink.

use std::io::Write;
use std::sync::Mutex;

use tracing::Level;

use crate::events::{Severity, Tracked};

/// Target used by [`TracingSink`]; layers feeding the engine must skip it.
pub const SINK_TARGET: &str = "tagtrack::sink";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize tracked item: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("sink receiver has been dropped")]
    Closed,
}

/// Receives finished events and activities
pub trait EventSink: Send + Sync {
    fn emit(&self, item: Tracked) -> Result<(), SinkError>;

    /// Flush buffered output, if any.
    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes one JSON document per tracked item
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&self, item: Tracked) -> Result<(), SinkError> {
        let line = serde_json::to_string(&item)?;
        let mut writer = self.writer.lock().expect("sink writer mutex poisoned");
        writeln!(writer, "{line}")?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().expect("sink writer mutex poisoned");
        writer.flush()?;
        Ok(())
    }
}

/// Map an internal severity back onto a tracing level.
pub fn tracing_level(severity: Severity) -> Level {
    match severity {
        Severity::None | Severity::Info => Level::INFO,
        Severity::Trace => Level::TRACE,
        Severity::Debug => Level::DEBUG,
        Severity::Notice | Severity::Warning => Level::WARN,
        Severity::Error
        | Severity::Critical
        | Severity::Failure
        | Severity::Fatal
        | Severity::Halt => Level::ERROR,
    }
}

/// Routes tracked items back into `tracing` as JSON payloads.
///
/// Events are emitted under [`SINK_TARGET`] at the level derived from the
/// item's severity, so ordinary subscribers (fmt, json) can persist them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, item: Tracked) -> Result<(), SinkError> {
        let json = serde_json::to_string(&item)?;
        match tracing_level(item.severity()) {
            Level::ERROR => tracing::error!(target: SINK_TARGET, tracked = %json),
            Level::WARN => tracing::warn!(target: SINK_TARGET, tracked = %json),
            Level::INFO => tracing::info!(target: SINK_TARGET, tracked = %json),
            Level::DEBUG => tracing::debug!(target: SINK_TARGET, tracked = %json),
            _ => tracing::trace!(target: SINK_TARGET, tracked = %json),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Activity, Source, SourceType};
    use crate::Timestamp;

    #[test]
    fn test_tracing_level_table() {
        assert_eq!(tracing_level(Severity::None), Level::INFO);
        assert_eq!(tracing_level(Severity::Trace), Level::TRACE);
        assert_eq!(tracing_level(Severity::Debug), Level::DEBUG);
        assert_eq!(tracing_level(Severity::Notice), Level::WARN);
        assert_eq!(tracing_level(Severity::Warning), Level::WARN);
        assert_eq!(tracing_level(Severity::Halt), Level::ERROR);
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_item() {
        let sink = JsonLinesSink::new(Vec::new());
        for name in ["a", "b"] {
            let activity = Activity::start(
                name,
                Severity::Info,
                "res",
                Source::new("app", SourceType::Appl),
                Timestamp::from_micros(0),
            );
            sink.emit(Tracked::Activity(activity)).unwrap();
        }
        sink.flush().unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: Tracked = serde_json::from_str(line).unwrap();
            assert!(parsed.as_activity().is_some());
        }
    }
}
