use miette::Diagnostic;
use tagtrack_activity::SinkError;
use thiserror::Error;

use crate::tags::ControlKey;

/// A single annotation that could not be converted. The field is skipped, the
/// record is still processed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum FieldError {
    #[error("#{key}={value}: expected an integer")]
    #[diagnostic(code(tagtrack::field::number))]
    InvalidNumber { key: ControlKey, value: String },

    #[error("#{key}={value}: expected one of {expected}")]
    #[diagnostic(code(tagtrack::field::enumeration))]
    InvalidEnum {
        key: ControlKey,
        value: String,
        expected: String,
    },
}

impl FieldError {
    pub fn key(&self) -> ControlKey {
        match self {
            FieldError::InvalidNumber { key, .. } | FieldError::InvalidEnum { key, .. } => *key,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CorrelationError {
    #[error("cannot begin activity '{requested}': activity '{current}' is still open")]
    #[diagnostic(
        code(tagtrack::correlation::already_open),
        help("activities do not nest, end '{current}' first")
    )]
    AlreadyOpen { current: String, requested: String },

    #[error("cannot end activity: no activity is open")]
    #[diagnostic(code(tagtrack::correlation::not_open))]
    NotOpen,

    #[error(transparent)]
    #[diagnostic(code(tagtrack::sink))]
    Sink(#[from] SinkError),
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    #[diagnostic(code(tagtrack::config::read))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    #[diagnostic(code(tagtrack::config::parse))]
    Parse(String),

    #[error("invalid config: {0}")]
    #[diagnostic(code(tagtrack::config::invalid))]
    Invalid(String),
}
