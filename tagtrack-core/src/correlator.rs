//! Activity correlation state machine.
//!
//! Each [`CorrelationContext`] is either NOOP (no activity open) or OPEN. A
//! record carrying `#beg=` or `#end=` drives the transitions; every other
//! record becomes an [`Event`](tagtrack_activity::Event) that is appended to
//! the open activity, or, while NOOP, emitted on its own (a datagram) or
//! wrapped into a one-event activity when a metrics snapshot is due.
//!
//! State transitions are applied before anything is handed to the sink, so a
//! failing sink never leaves a context half-way between states.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tagtrack_activity::{Activity, EventSink, Snapshot, Source, Timestamp, Tracked};
use tracing::{debug, trace, warn};

use crate::builder::EventBuilder;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::CorrelationError;
use crate::record::RawRecord;
use crate::scheduler::MetricsScheduler;
use crate::severity::{map_level, parse_severity};
use crate::tags::{Annotations, ControlKey, ParsedMessage, parse_message};

/// Correlation state of one execution context, usually a thread.
///
/// Owned by the caller and passed into every [`Correlator::process`] call.
#[derive(Debug, Default)]
pub struct CorrelationContext {
    current: Option<Activity>,
    last_record: Option<Instant>,
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.current.is_none()
    }

    /// The open activity, if any
    pub fn current(&self) -> Option<&Activity> {
        self.current.as_ref()
    }

    /// Microseconds since the previous call, 0 on the first one.
    fn since_last(&mut self, now: Instant) -> u64 {
        let elapsed = self
            .last_record
            .map(|last| {
                u64::try_from(now.saturating_duration_since(last).as_micros()).unwrap_or(u64::MAX)
            })
            .unwrap_or(0);
        self.last_record = Some(now);
        elapsed
    }
}

/// Supplies the snapshots attached to a metrics-bearing activity.
pub trait MetricsProvider: Send + Sync {
    fn snapshots(&self, at: SystemTime) -> Vec<Snapshot>;
}

/// Attaches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetrics;

impl MetricsProvider for NoMetrics {
    fn snapshots(&self, _at: SystemTime) -> Vec<Snapshot> {
        Vec::new()
    }
}

/// What a single [`Correlator::process`] call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// An activity was opened
    Started { activity_id: String },
    /// The open activity was closed and emitted
    Ended { activity_id: String },
    /// The event was appended to the open activity
    Appended {
        activity_id: String,
        event_id: String,
        count: usize,
    },
    /// The event filled the open activity, which was closed and emitted
    Flushed {
        activity_id: String,
        event_id: String,
    },
    /// The event was wrapped into a metrics-bearing activity and emitted
    Snapshot {
        activity_id: String,
        event_id: String,
    },
    /// The event was emitted on its own
    Datagram { event_id: String },
}

pub struct Correlator {
    builder: EventBuilder,
    sink: Arc<dyn EventSink>,
    scheduler: Arc<MetricsScheduler>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsProvider>,
    max_activity_size: usize,
    delimiter: char,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("builder", &self.builder)
            .field("scheduler", &self.scheduler)
            .field("max_activity_size", &self.max_activity_size)
            .field("delimiter", &self.delimiter)
            .finish_non_exhaustive()
    }
}

impl Correlator {
    pub fn new(config: &Config, sink: Arc<dyn EventSink>) -> Self {
        Self {
            builder: EventBuilder::new(config),
            sink,
            scheduler: Arc::new(MetricsScheduler::from_config(config)),
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NoMetrics),
            max_activity_size: config.max_activity_size.max(1),
            delimiter: config.delimiter,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Share a scheduler between correlators so they snapshot on one timeline.
    pub fn with_scheduler(mut self, scheduler: Arc<MetricsScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn scheduler(&self) -> &Arc<MetricsScheduler> {
        &self.scheduler
    }

    /// Parse the record's message and merge its structured fields underneath.
    pub fn parse(&self, record: &RawRecord) -> ParsedMessage {
        let mut parsed = parse_message(&record.message, self.delimiter);
        if !record.fields.is_empty() {
            let mut annotations = Annotations::from_fields(&record.fields);
            annotations.merge(std::mem::take(&mut parsed.annotations));
            parsed.annotations = annotations;
        }
        parsed
    }

    pub fn process(
        &self,
        ctx: &mut CorrelationContext,
        record: &RawRecord,
    ) -> Result<Processed, CorrelationError> {
        let parsed = self.parse(record);
        if parsed.annotations.is_activity_instruction() {
            return self.instruct(ctx, record, &parsed.annotations);
        }

        let since_last = ctx.since_last(self.clock.monotonic());
        let event = self.builder.build(record, &parsed, since_last).event;
        let event_id = event.id.clone();

        if let Some(mut activity) = ctx.current.take() {
            activity.append(event);
            let count = activity.item_count();
            let activity_id = activity.id.clone();

            if count < self.max_activity_size {
                trace!(target: "tagtrack::correlator", activity = %activity.name, count, "event appended");
                ctx.current = Some(activity);
                return Ok(Processed::Appended {
                    activity_id,
                    event_id,
                    count,
                });
            }

            debug!(target: "tagtrack::correlator", activity = %activity.name, count, "activity full, closing");
            activity.stop(record.error.clone(), record_time(record));
            self.sink.emit(Tracked::Activity(activity))?;
            return Ok(Processed::Flushed {
                activity_id,
                event_id,
            });
        }

        let now = self.clock.now();
        if self.scheduler.should_snapshot(record.error.is_some(), now) {
            let mut activity = Activity::start(
                record.thread.clone(),
                event.severity,
                record.logger.clone(),
                event.source.clone(),
                event.start,
            );
            activity.snapshots = self.metrics.snapshots(now);
            let end = event.end;
            activity.append(event);
            activity.stop(record.error.clone(), end);

            let activity_id = activity.id.clone();
            debug!(target: "tagtrack::correlator", activity = %activity.name, "emitting metrics snapshot");
            self.sink.emit(Tracked::Activity(activity))?;
            return Ok(Processed::Snapshot {
                activity_id,
                event_id,
            });
        }

        self.sink.emit(Tracked::Event(event))?;
        Ok(Processed::Datagram { event_id })
    }

    /// Force-close the open activity with status END, if there is one.
    pub fn close(&self, ctx: &mut CorrelationContext) -> Result<Option<String>, CorrelationError> {
        let Some(mut activity) = ctx.current.take() else {
            return Ok(None);
        };
        debug!(target: "tagtrack::correlator", activity = %activity.name, "closing open activity");
        activity.stop(None, Timestamp::from(self.clock.now()));
        let activity_id = activity.id.clone();
        self.sink.emit(Tracked::Activity(activity))?;
        Ok(Some(activity_id))
    }

    /// Flush the sink.
    pub fn flush(&self) -> Result<(), CorrelationError> {
        Ok(self.sink.flush()?)
    }

    fn instruct(
        &self,
        ctx: &mut CorrelationContext,
        record: &RawRecord,
        annotations: &Annotations,
    ) -> Result<Processed, CorrelationError> {
        let begun = match annotations.control(ControlKey::Beg) {
            Some(name) => Some(self.begin(ctx, record, annotations, name)?),
            None => None,
        };

        if annotations.control(ControlKey::End).is_some() {
            let Some(mut activity) = ctx.current.take() else {
                return Err(CorrelationError::NotOpen);
            };
            activity.stop(record.error.clone(), record_time(record));
            let activity_id = activity.id.clone();
            debug!(
                target: "tagtrack::correlator",
                activity = %activity.name,
                status = %activity.status,
                events = activity.item_count(),
                "activity ended"
            );
            self.sink.emit(Tracked::Activity(activity))?;
            return Ok(Processed::Ended { activity_id });
        }

        Ok(Processed::Started {
            activity_id: begun.unwrap_or_default(),
        })
    }

    fn begin(
        &self,
        ctx: &mut CorrelationContext,
        record: &RawRecord,
        annotations: &Annotations,
        name: &str,
    ) -> Result<String, CorrelationError> {
        let name = match name.trim() {
            "" => record.thread.clone(),
            name => name.to_string(),
        };
        if let Some(current) = &ctx.current {
            return Err(CorrelationError::AlreadyOpen {
                current: current.name.clone(),
                requested: name,
            });
        }

        let value = |key| annotations.control(key).filter(|v| !v.trim().is_empty());

        let mut severity = map_level(record.level).severity;
        if let Some(sev) = value(ControlKey::Sev) {
            match parse_severity(sev) {
                Ok(parsed) => severity = parsed,
                Err(err) => warn!(target: "tagtrack::correlator", "{err}, field ignored"),
            }
        }

        let mut source = self.builder.default_source(&record.logger);
        if let Some(app) = value(ControlKey::App) {
            source = Source::new(app, source.source_type);
        }
        let resource = value(ControlKey::Rsn).unwrap_or(record.logger.as_str());

        let activity = Activity::start(name, severity, resource, source, record_time(record));
        debug!(target: "tagtrack::correlator", activity = %activity.name, id = %activity.id, "activity started");
        let activity_id = activity.id.clone();
        ctx.current = Some(activity);
        Ok(activity_id)
    }
}

fn record_time(record: &RawRecord) -> Timestamp {
    Timestamp::from_millis(record.timestamp_ms)
}
