//! Tracked item types: events, activities, snapshots and their vocabularies.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr};

use crate::Timestamp;

/// Internal severity vocabulary, ordered from least to most severe.
///
/// Ordinals are stable and accepted wherever a numeric severity is allowed.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    FromRepr,
)]
#[repr(u8)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Severity {
    None = 0,
    Trace = 1,
    Debug = 2,
    #[default]
    Info = 3,
    Notice = 4,
    Warning = 5,
    Error = 6,
    Critical = 7,
    Failure = 8,
    Fatal = 9,
    Halt = 10,
}

/// Coarse outcome of an operation, independent of its severity
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    FromRepr,
)]
#[repr(u8)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum CompCode {
    #[default]
    Success = 0,
    Warning = 1,
    Error = 2,
}

/// Kind of operation an event describes
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    FromRepr,
)]
#[repr(u8)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum OpType {
    Other = 0,
    Start = 1,
    Stop = 2,
    Open = 3,
    Close = 4,
    Send = 5,
    Receive = 6,
    Inquire = 7,
    Set = 8,
    Browse = 9,
    Add = 10,
    Update = 11,
    Remove = 12,
    Clear = 13,
    Datagram = 14,
    Call = 15,
    Activity = 16,
    #[default]
    Event = 17,
    Request = 18,
    Response = 19,
}

/// Lifecycle state of an activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ActivityStatus {
    /// No activity is open
    #[default]
    Noop,
    Started,
    Exception,
    End,
}

/// Type of the source that produced a tracked item
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum SourceType {
    #[default]
    Appl,
    Server,
    Service,
    Process,
    Runtime,
    Host,
    Container,
    Network,
    Datacenter,
    User,
}

/// Identity of whatever produced a tracked item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
}

impl Source {
    pub fn new(name: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            source_type,
        }
    }
}

/// Declared data type of a user-defined property
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Integer,
    Long,
    Float,
    Number,
    Double,
    Boolean,
}

impl DataType {
    /// Resolve the single-letter type specifier used in `%i/key` style annotations.
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_lowercase() {
            's' => Some(DataType::String),
            'i' => Some(DataType::Integer),
            'l' => Some(DataType::Long),
            'f' => Some(DataType::Float),
            'n' => Some(DataType::Number),
            'd' => Some(DataType::Double),
            'b' => Some(DataType::Boolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot convert '{raw}' to {data_type}")]
pub struct InvalidValue {
    pub raw: String,
    pub data_type: DataType,
}

/// A typed property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    String(String),
    Integer(i32),
    Long(i64),
    Float(f32),
    Number(serde_json::Number),
    Double(f64),
    Boolean(bool),
}

impl PropertyValue {
    /// Convert raw annotation text into a value of the declared type.
    pub fn parse(data_type: DataType, raw: &str) -> Result<Self, InvalidValue> {
        let text = raw.trim();
        let invalid = || InvalidValue {
            raw: raw.to_string(),
            data_type,
        };
        match data_type {
            DataType::String => Ok(PropertyValue::String(raw.to_string())),
            DataType::Integer => text.parse().map(PropertyValue::Integer).map_err(|_| invalid()),
            DataType::Long => text.parse().map(PropertyValue::Long).map_err(|_| invalid()),
            DataType::Float => text.parse().map(PropertyValue::Float).map_err(|_| invalid()),
            DataType::Double => text.parse().map(PropertyValue::Double).map_err(|_| invalid()),
            DataType::Number => {
                if let Ok(n) = text.parse::<i64>() {
                    Ok(PropertyValue::Number(n.into()))
                } else {
                    text.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(PropertyValue::Number)
                        .ok_or_else(invalid)
                }
            }
            DataType::Boolean => {
                if text.eq_ignore_ascii_case("true") {
                    Ok(PropertyValue::Boolean(true))
                } else if text.eq_ignore_ascii_case("false") {
                    Ok(PropertyValue::Boolean(false))
                } else {
                    Err(invalid())
                }
            }
        }
    }
}

/// A single key/value entry of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: PropertyValue,
    /// Secondary semantic tag such as `currency` or `age`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value_type: Option<String>,
}

impl Property {
    pub fn new(key: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            key: key.into(),
            value,
            value_type: None,
        }
    }

    pub fn with_value_type(mut self, value_type: Option<String>) -> Self {
        self.value_type = value_type;
        self
    }
}

/// A named bag of typed properties attached to an event or activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl Snapshot {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Add a property, replacing an existing one with the same key in place.
    pub fn add(&mut self, property: Property) {
        match self.properties.iter_mut().find(|p| p.key == property.key) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.key == key)
    }
}

/// Error attached to a log record, flattened into its message chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub causes: Vec<String>,
}

impl RecordError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Capture an error and its `source()` chain.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            causes,
        }
    }
}

/// Single structured, timed record derived from one log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub op_type: OpType,
    pub severity: Severity,
    pub comp_code: CompCode,
    #[serde(default)]
    pub reason_code: i32,
    pub resource: String,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correlator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exception: Option<String>,
    pub start: Timestamp,
    pub end: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message_age_usec: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub snapshots: Vec<Snapshot>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<RecordError>,
}

impl Event {
    /// Elapsed time between start and end, in microseconds
    pub fn elapsed_usec(&self) -> u64 {
        self.end.micros_since(self.start)
    }
}

/// Correlated, time-bounded group of events describing one unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub status: ActivityStatus,
    pub severity: Severity,
    pub resource: String,
    pub source: Source,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub snapshots: Vec<Snapshot>,
    pub start: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<RecordError>,
}

impl Activity {
    /// Open a new activity; its timer starts at `at`.
    pub fn start(
        name: impl Into<String>,
        severity: Severity,
        resource: impl Into<String>,
        source: Source,
        at: Timestamp,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            status: ActivityStatus::Started,
            severity,
            resource: resource.into(),
            source,
            events: Vec::new(),
            snapshots: Vec::new(),
            start: at,
            end: None,
            error: None,
        }
    }

    pub fn append(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Number of items linked into this activity
    pub fn item_count(&self) -> usize {
        self.events.len()
    }

    /// Close the activity. Status becomes EXCEPTION when an error is attached, END otherwise.
    pub fn stop(&mut self, error: Option<RecordError>, at: Timestamp) {
        self.status = if error.is_some() {
            ActivityStatus::Exception
        } else {
            ActivityStatus::End
        };
        self.error = error;
        self.end = Some(at.max(self.start));
    }

    /// Elapsed time of a closed activity, in microseconds
    pub fn elapsed_usec(&self) -> Option<u64> {
        self.end.map(|end| end.micros_since(self.start))
    }
}

/// Envelope for everything handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Tracked {
    Event(Event),
    Activity(Activity),
}

impl Tracked {
    pub fn severity(&self) -> Severity {
        match self {
            Tracked::Event(event) => event.severity,
            Tracked::Activity(activity) => activity.severity,
        }
    }

    pub fn as_activity(&self) -> Option<&Activity> {
        match self {
            Tracked::Activity(activity) => Some(activity),
            Tracked::Event(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Tracked::Event(event) => Some(event),
            Tracked::Activity(_) => None,
        }
    }
}
