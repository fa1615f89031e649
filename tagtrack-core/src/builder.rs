//! Turns a raw record plus its annotations into a timed [`Event`].
//!
//! Every field starts from what the record already carries (logger, thread,
//! source location, host level, elapsed time since the previous record) and is
//! then overridden by the matching annotation, if any. A field whose
//! annotation cannot be converted keeps its default; the failure is logged and
//! reported on [`Built::rejected`].

use std::str::FromStr;

use tagtrack_activity::{Event, OpType, Snapshot, Source, SourceType, Timestamp};
use tracing::warn;

use crate::config::Config;
use crate::error::FieldError;
use crate::record::RawRecord;
use crate::severity::{map_level, parse_comp_code, parse_op_type, parse_severity};
use crate::tags::{Annotation, ControlKey, ParsedMessage, UserField};

/// Outcome of [`EventBuilder::build`]
#[derive(Debug, Clone)]
pub struct Built {
    pub event: Event,
    /// Annotations skipped because their value could not be converted
    pub rejected: Vec<FieldError>,
}

/// Timing annotations, resolved after every other field
#[derive(Debug, Default)]
struct Timing {
    elapsed_usec: Option<u64>,
    start_usec: Option<u64>,
    end_usec: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct EventBuilder {
    source_type: SourceType,
    snapshot_category: String,
    strip_annotations: bool,
}

impl EventBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            source_type: config.source_type,
            snapshot_category: config.snapshot_category.clone(),
            strip_annotations: config.strip_annotations,
        }
    }

    /// Source named after the logger. An `app` annotation replaces it.
    pub fn default_source(&self, logger: &str) -> Source {
        Source::new(logger, self.source_type)
    }

    /// Build the event for `record`.
    ///
    /// `since_last_usec` is the monotonic time since the previous record of the
    /// same context; an `elt` annotation replaces it.
    pub fn build(&self, record: &RawRecord, parsed: &ParsedMessage, since_last_usec: u64) -> Built {
        let level = map_level(record.level);
        let location = record.location.as_ref();

        let mut event = Event {
            id: uuid::Uuid::new_v4().to_string(),
            name: location
                .and_then(|l| l.method.clone())
                .unwrap_or_else(|| record.logger.clone()),
            op_type: OpType::default(),
            severity: level.severity,
            comp_code: level.comp_code,
            reason_code: 0,
            resource: record.logger.clone(),
            source: self.default_source(&record.logger),
            tag: Some(record.thread.clone()),
            correlator: None,
            user: None,
            location: location.and_then(|l| l.describe()),
            message: if self.strip_annotations {
                parsed.text.clone()
            } else {
                record.message.clone()
            },
            exception: record.error.as_ref().map(|e| e.message.clone()),
            start: Timestamp::from_millis(record.timestamp_ms),
            end: Timestamp::from_millis(record.timestamp_ms),
            message_age_usec: None,
            snapshots: Vec::new(),
            error: record.error.clone(),
        };

        let mut timing = Timing::default();
        let mut rejected = Vec::new();
        let mut fields: Vec<&UserField> = Vec::new();

        for annotation in parsed.annotations.iter() {
            match annotation {
                Annotation::Control(key, value) => {
                    if let Err(err) = apply(&mut event, &mut timing, *key, value) {
                        warn!(target: "tagtrack::builder", logger = %record.logger, "{err}, field ignored");
                        rejected.push(err);
                    }
                }
                Annotation::Field(field) => {
                    if !field.raw.trim().is_empty() {
                        fields.push(field);
                    }
                }
            }
        }

        if !fields.is_empty() {
            let mut snapshot = Snapshot::new(self.snapshot_category.clone(), event.name.clone());
            for field in fields {
                snapshot.add(field.to_property());
            }
            event.snapshots.push(snapshot);
        }

        let elapsed = timing.elapsed_usec.unwrap_or(since_last_usec);
        let record_usec = record.timestamp_ms.saturating_mul(1000);
        let start = timing
            .start_usec
            .unwrap_or_else(|| record_usec.saturating_sub(elapsed));
        let mut end = timing.end_usec.unwrap_or_else(|| start.saturating_add(elapsed));
        if end < start {
            warn!(target: "tagtrack::builder", start, end, "end time precedes start time, clamping");
            end = start;
        }
        event.start = Timestamp::from_micros(start);
        event.end = Timestamp::from_micros(end);

        Built { event, rejected }
    }
}

fn number<T: FromStr>(key: ControlKey, value: &str) -> Result<T, FieldError> {
    value.trim().parse().map_err(|_| FieldError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}

// Zero means "not supplied" for the absolute timestamps.
fn timestamp(key: ControlKey, value: &str) -> Result<Option<u64>, FieldError> {
    number::<u64>(key, value).map(|usec| (usec > 0).then_some(usec))
}

fn apply(
    event: &mut Event,
    timing: &mut Timing,
    key: ControlKey,
    value: &str,
) -> Result<(), FieldError> {
    if value.trim().is_empty() {
        return Ok(());
    }
    let text = || value.to_string();
    match key {
        ControlKey::Beg | ControlKey::End => {}
        ControlKey::App => event.source.name = text(),
        ControlKey::Usr => event.user = Some(text()),
        ControlKey::Cid => event.correlator = Some(text()),
        ControlKey::Tag => event.tag = Some(text()),
        ControlKey::Loc => event.location = Some(text()),
        ControlKey::Opn => event.name = text(),
        ControlKey::Opt => event.op_type = parse_op_type(value)?,
        ControlKey::Rsn => event.resource = text(),
        ControlKey::Msg => event.message = text(),
        ControlKey::Sev => event.severity = parse_severity(value)?,
        ControlKey::Ccd => event.comp_code = parse_comp_code(value)?,
        ControlKey::Rcd => event.reason_code = number(key, value)?,
        ControlKey::Exc => event.exception = Some(text()),
        ControlKey::Elt => timing.elapsed_usec = Some(number(key, value)?),
        ControlKey::Age => event.message_age_usec = Some(number(key, value)?),
        ControlKey::Stt => timing.start_usec = timestamp(key, value)?,
        ControlKey::Ent => timing.end_usec = timestamp(key, value)?,
    }
    Ok(())
}
