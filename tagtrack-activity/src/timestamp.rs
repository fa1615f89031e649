//! RFC 3339 timestamp wrapper with microsecond resolution.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Point in wall-clock time, serialized as an RFC 3339 string with microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub SystemTime);

impl Timestamp {
    pub fn now() -> Self {
        Self(SystemTime::now())
    }

    /// Build a timestamp from microseconds since the Unix epoch.
    pub fn from_micros(usec: u64) -> Self {
        Self(UNIX_EPOCH + Duration::from_micros(usec))
    }

    /// Build a timestamp from milliseconds since the Unix epoch.
    pub fn from_millis(msec: u64) -> Self {
        Self(UNIX_EPOCH + Duration::from_millis(msec))
    }

    /// Microseconds since the Unix epoch. Times before the epoch collapse to 0.
    pub fn as_micros(&self) -> u64 {
        self.0
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    /// Microseconds elapsed from `earlier` to `self`, 0 if `earlier` is later.
    pub fn micros_since(&self, earlier: Timestamp) -> u64 {
        self.as_micros().saturating_sub(earlier.as_micros())
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        Self(time)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_rfc3339_micros(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let s = String::deserialize(deserializer)?;
        humantime::parse_rfc3339(&s)
            .map(Timestamp)
            .map_err(D::Error::custom)
    }
}
