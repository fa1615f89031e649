//! Replays annotated log lines through a correlator.
//!
//! Each non-empty line is `LEVEL message`, where LEVEL is one of the host
//! levels (case-insensitive). Lines without a recognised level are INFO.

use std::io::BufRead;

use miette::Diagnostic;
use serde_json::{Map, Value, json};
use tagtrack_core::{
    Annotation, CorrelationContext, CorrelationError, Correlator, LogLevel, ParsedMessage,
    RawRecord,
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Diagnostic)]
pub enum ReplayError {
    #[error("failed to read input")]
    #[diagnostic(code(tagtrack::replay::read))]
    Read(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Correlation(#[from] CorrelationError),
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Logger name given to every record
    pub logger: String,
    /// Thread name given to every record
    pub thread: String,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            logger: "tagtrack.replay".to_string(),
            thread: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Lines processed successfully
    pub records: usize,
    /// Lines rejected by the correlator (nested begin, end without begin)
    pub skipped: usize,
    /// Whether an activity was still open at end of input
    pub closed_at_eof: bool,
}

/// Split a leading level token off a line.
pub fn split_level(line: &str) -> (Option<LogLevel>, &str) {
    let line = line.trim();
    let (token, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match token.parse::<LogLevel>() {
        Ok(level) => (Some(level), rest.trim_start()),
        Err(_) => (None, line),
    }
}

pub fn replay<R: BufRead>(
    input: R,
    correlator: &Correlator,
    options: &ReplayOptions,
) -> Result<ReplaySummary, ReplayError> {
    let mut ctx = CorrelationContext::new();
    let mut summary = ReplaySummary::default();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (level, message) = split_level(&line);
        let record = RawRecord::new(&options.logger, level.unwrap_or(LogLevel::Info), message)
            .thread(&options.thread);

        match correlator.process(&mut ctx, &record) {
            Ok(processed) => {
                debug!(target: "tagtrack::replay", line = index + 1, ?processed);
                summary.records += 1;
            }
            Err(CorrelationError::Sink(err)) => return Err(CorrelationError::Sink(err).into()),
            Err(err) => {
                warn!(target: "tagtrack::replay", line = index + 1, "{err}");
                summary.skipped += 1;
            }
        }
    }

    summary.closed_at_eof = correlator.close(&mut ctx)?.is_some();
    correlator.flush()?;
    Ok(summary)
}

/// JSON view of a parsed message: its text, control annotations and user fields.
pub fn describe(parsed: &ParsedMessage) -> Value {
    let mut annotations = Map::new();
    let mut fields = Map::new();
    for annotation in parsed.annotations.iter() {
        match annotation {
            Annotation::Control(key, value) => {
                annotations.insert(key.to_string(), Value::String(value.clone()));
            }
            Annotation::Field(field) => {
                let mut value = serde_json::to_value(&field.value).unwrap_or(Value::Null);
                if let (Some(vt), Some(object)) = (&field.value_type, value.as_object_mut()) {
                    object.insert("value_type".to_string(), Value::String(vt.clone()));
                }
                fields.insert(field.name.clone(), value);
            }
        }
    }
    json!({
        "text": parsed.text,
        "annotations": annotations,
        "fields": fields,
    })
}
