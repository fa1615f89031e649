//! Host level to severity / completion code translation, plus the parsers for
//! the `sev`, `ccd` and `opt` overrides.

use std::str::FromStr;

use strum::IntoEnumIterator;
use tagtrack_activity::{CompCode, OpType, Severity};

use crate::error::FieldError;
use crate::record::LogLevel;
use crate::tags::ControlKey;

/// Internal severity and completion code for one host level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelMapping {
    pub severity: Severity,
    pub comp_code: CompCode,
}

const fn mapping(severity: Severity, comp_code: CompCode) -> LevelMapping {
    LevelMapping {
        severity,
        comp_code,
    }
}

const DEFAULT_MAPPING: LevelMapping = mapping(Severity::Info, CompCode::Success);

/// Map a host level. Absent levels map to INFO / SUCCESS.
pub fn map_level(level: Option<LogLevel>) -> LevelMapping {
    let Some(level) = level else {
        return DEFAULT_MAPPING;
    };
    match level {
        LogLevel::Off => mapping(Severity::None, CompCode::Success),
        LogLevel::Fatal => mapping(Severity::Fatal, CompCode::Error),
        LogLevel::Error => mapping(Severity::Error, CompCode::Error),
        LogLevel::Warn => mapping(Severity::Warning, CompCode::Warning),
        LogLevel::Info => DEFAULT_MAPPING,
        LogLevel::Debug => mapping(Severity::Debug, CompCode::Success),
        LogLevel::Trace => mapping(Severity::Trace, CompCode::Success),
    }
}

// Resolve by case-insensitive name first, then by ordinal.
fn parse_vocabulary<T>(
    key: ControlKey,
    value: &str,
    from_repr: impl Fn(u8) -> Option<T>,
) -> Result<T, FieldError>
where
    T: FromStr + IntoEnumIterator + std::fmt::Display,
{
    let text = value.trim();
    if let Ok(parsed) = T::from_str(text) {
        return Ok(parsed);
    }
    text.parse::<u8>()
        .ok()
        .and_then(from_repr)
        .ok_or_else(|| FieldError::InvalidEnum {
            key,
            value: value.to_string(),
            expected: T::iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "),
        })
}

pub fn parse_severity(value: &str) -> Result<Severity, FieldError> {
    parse_vocabulary(ControlKey::Sev, value, Severity::from_repr)
}

pub fn parse_comp_code(value: &str) -> Result<CompCode, FieldError> {
    parse_vocabulary(ControlKey::Ccd, value, CompCode::from_repr)
}

pub fn parse_op_type(value: &str) -> Result<OpType, FieldError> {
    parse_vocabulary(ControlKey::Opt, value, OpType::from_repr)
}
