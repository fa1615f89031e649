//! Raw log records as handed over by the host logging framework.

use std::time::{SystemTime, UNIX_EPOCH};

use strum::{Display, EnumIter, EnumString};
use tagtrack_activity::RecordError;

/// Severity vocabulary of the host logging framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum LogLevel {
    Off,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::TRACE => LogLevel::Trace,
        }
    }
}

/// Where in the program a record was produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub method: Option<String>,
    pub line: Option<u32>,
}

impl SourceLocation {
    /// `file:line`, or just the file when the line is unknown.
    pub fn describe(&self) -> Option<String> {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => Some(format!("{file}:{line}")),
            (Some(file), None) => Some(file.clone()),
            _ => None,
        }
    }
}

/// One log call, consumed within a single correlator call
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// `None` when the host level is absent or unrecognised
    pub level: Option<LogLevel>,
    pub thread: String,
    pub logger: String,
    pub message: String,
    pub error: Option<RecordError>,
    pub location: Option<SourceLocation>,
    /// Structured fields supplied next to the message (span or event fields).
    /// They act as annotations with lower precedence than the message text.
    pub fields: Vec<(String, String)>,
}

impl RawRecord {
    /// Create a record stamped with the current time and thread name.
    pub fn new(logger: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        let thread = std::thread::current()
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", std::thread::current().id()));
        Self {
            timestamp_ms,
            level: Some(level),
            thread,
            logger: logger.into(),
            message: message.into(),
            error: None,
            location: None,
            fields: Vec::new(),
        }
    }

    pub fn timestamp_ms(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = thread.into();
        self
    }

    pub fn error(mut self, error: RecordError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}
