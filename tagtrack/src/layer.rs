//! `tracing` integration.
//!
//! [`TagtrackLayer`] turns every event that reaches it into a [`RawRecord`] and
//! feeds it through a [`Correlator`], one [`CorrelationContext`] per thread.
//! Fields of enclosing spans and structured fields on the event act as
//! annotations, ranked below annotations written in the message itself.
//! A field named `error` becomes the record's attached error. When a thread
//! exits, its context is dropped and any activity it left open is closed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::thread::ThreadId;

use tagtrack_activity::{EventSink, RecordError};
use tagtrack_core::{Config, CorrelationContext, Correlator, RawRecord, SourceLocation};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber, span, warn};
use tracing_subscriber::{Layer, layer, registry::LookupSpan};

/// Events with targets under this prefix are never correlated.
const OWN_TARGET_PREFIX: &str = "tagtrack";

/// Span fields kept as an extension on the span
#[derive(Debug, Clone, Default)]
struct SpanFields(Vec<(String, String)>);

impl SpanFields {
    fn set(&mut self, key: &str, value: String) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key.to_string(), value)),
        }
    }
}

impl Visit for SpanFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.set(field.name(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field.name(), value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.set(field.name(), value.to_string());
    }
}

/// Message, error and remaining fields of one event
#[derive(Debug, Default)]
struct EventFields {
    message: Option<String>,
    error: Option<RecordError>,
    fields: Vec<(String, String)>,
}

impl EventFields {
    fn push(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = Some(value),
            "error" => self.error = Some(RecordError::new(value)),
            // Metadata forwarded by tracing-log
            name if name.starts_with("log.") => {}
            name => self.fields.push((name.to_string(), value)),
        }
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field.name(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field.name(), value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        if field.name() == "error" {
            self.error = Some(RecordError::from_error(value));
        } else {
            self.push(field.name(), value.to_string());
        }
    }
}

struct Shared {
    correlator: Correlator,
    contexts: Mutex<HashMap<ThreadId, CorrelationContext>>,
}

impl Shared {
    fn process(self: &Arc<Self>, record: &RawRecord) {
        let thread = std::thread::current().id();
        // The context is taken out so the map is not locked while the sink runs
        let known = self
            .contexts
            .lock()
            .expect("context map mutex poisoned")
            .remove(&thread);
        if known.is_none() {
            ThreadExit::watch(self);
        }
        let mut ctx = known.unwrap_or_default();

        if let Err(err) = self.correlator.process(&mut ctx, record) {
            warn!(target: "tagtrack::layer", logger = %record.logger, "{err}");
        }

        self.contexts
            .lock()
            .expect("context map mutex poisoned")
            .insert(thread, ctx);
    }

    /// Drop the context of `thread`, closing its open activity with status END.
    fn release(&self, thread: ThreadId) {
        let ctx = self
            .contexts
            .lock()
            .expect("context map mutex poisoned")
            .remove(&thread);
        let Some(mut ctx) = ctx else {
            return;
        };
        if let Err(err) = self.correlator.close(&mut ctx) {
            warn!(target: "tagtrack::layer", "{err}");
        }
    }
}

/// Releases the contexts a thread holds in every live layer when it exits.
struct ThreadExit {
    thread: ThreadId,
    layers: Vec<Weak<Shared>>,
}

thread_local! {
    static THREAD_EXIT: RefCell<ThreadExit> = RefCell::new(ThreadExit {
        thread: std::thread::current().id(),
        layers: Vec::new(),
    });
}

impl ThreadExit {
    fn watch(shared: &Arc<Shared>) {
        // Fails only while the thread is already tearing down its locals
        let _ = THREAD_EXIT.try_with(|exit| {
            let mut exit = exit.borrow_mut();
            exit.layers.retain(|layer| layer.strong_count() > 0);
            if !exit.layers.iter().any(|layer| std::ptr::eq(layer.as_ptr(), Arc::as_ptr(shared))) {
                exit.layers.push(Arc::downgrade(shared));
            }
        });
    }
}

impl Drop for ThreadExit {
    fn drop(&mut self) {
        for shared in self.layers.iter().filter_map(Weak::upgrade) {
            shared.release(self.thread);
        }
    }
}

/// Handle that stays usable after the layer moved into a subscriber.
#[derive(Clone)]
pub struct TagtrackHandle {
    shared: Arc<Shared>,
}

impl TagtrackHandle {
    /// Close every open activity with status END, then flush the sink.
    ///
    /// Returns the number of activities that were closed.
    pub fn flush(&self) -> Result<usize, tagtrack_core::CorrelationError> {
        let contexts: Vec<CorrelationContext> = self
            .shared
            .contexts
            .lock()
            .expect("context map mutex poisoned")
            .drain()
            .map(|(_, ctx)| ctx)
            .collect();

        let mut closed = 0;
        for mut ctx in contexts {
            if self.shared.correlator.close(&mut ctx)?.is_some() {
                closed += 1;
            }
        }
        self.shared.correlator.flush()?;
        Ok(closed)
    }

    /// Number of threads that currently have an activity open
    pub fn open_activities(&self) -> usize {
        self.shared
            .contexts
            .lock()
            .expect("context map mutex poisoned")
            .values()
            .filter(|ctx| !ctx.is_noop())
            .count()
    }
}

pub struct TagtrackLayer {
    shared: Arc<Shared>,
    span_annotations: bool,
}

impl TagtrackLayer {
    pub fn new(config: &Config, sink: Arc<dyn EventSink>) -> Self {
        Self::with_correlator(config, Correlator::new(config, sink))
    }

    /// Use a pre-built correlator, for example one with a custom clock or
    /// metrics provider.
    pub fn with_correlator(config: &Config, correlator: Correlator) -> Self {
        Self {
            shared: Arc::new(Shared {
                correlator,
                contexts: Mutex::new(HashMap::new()),
            }),
            span_annotations: config.span_annotations,
        }
    }

    pub fn handle(&self) -> TagtrackHandle {
        TagtrackHandle {
            shared: self.shared.clone(),
        }
    }
}

impl<S> Layer<S> for TagtrackLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: layer::Context<'_, S>) {
        if !self.span_annotations {
            return;
        }
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = SpanFields::default();
        attrs.record(&mut fields);
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: layer::Context<'_, S>) {
        if !self.span_annotations {
            return;
        }
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            values.record(fields);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: layer::Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(OWN_TARGET_PREFIX) {
            return;
        }

        let mut visitor = EventFields::default();
        event.record(&mut visitor);

        let mut fields = Vec::new();
        if self.span_annotations
            && let Some(scope) = ctx.event_scope(event)
        {
            for span in scope.from_root() {
                if let Some(span_fields) = span.extensions().get::<SpanFields>() {
                    fields.extend(span_fields.0.iter().cloned());
                }
            }
        }
        fields.extend(visitor.fields);

        let mut record = RawRecord::new(
            meta.target(),
            (*meta.level()).into(),
            visitor.message.unwrap_or_default(),
        )
        .location(SourceLocation {
            file: meta.file().map(str::to_string),
            method: meta.module_path().map(str::to_string),
            line: meta.line(),
        });
        record.error = visitor.error;
        record.fields = fields;

        self.shared.process(&record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tagtrack_activity::{ActivityStatus, Tracked, channel};
    use tracing_subscriber::prelude::*;

    fn quiet_config() -> Config {
        Config {
            // Far enough out that no record becomes a metrics snapshot
            metrics_frequency: u64::MAX / 1_000_000,
            metrics_on_exception: false,
            ..Config::default()
        }
    }

    #[test]
    fn test_events_become_datagrams() {
        let (sink, mut rx) = channel();
        let config = quiet_config();
        let layer = TagtrackLayer::new(&config, Arc::new(sink));
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "orders", "saved #rsn=orders.db #rcd=2");
        });

        let Ok(Tracked::Event(event)) = rx.try_recv() else {
            panic!("expected an event");
        };
        assert_eq!(event.resource, "orders.db");
        assert_eq!(event.reason_code, 2);
        assert_eq!(event.source.name, "orders");
        assert!(event.location.is_some());
    }

    #[test]
    fn test_span_fields_and_flush() {
        let (sink, mut rx) = channel();
        let config = quiet_config();
        let layer = TagtrackLayer::new(&config, Arc::new(sink));
        let handle = layer.handle();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("request", usr = "alice", rsn = "api");
            let _guard = span.enter();
            tracing::info!(target: "orders", "#beg=Checkout");
            tracing::info!(target: "orders", order = 42, "charged #rsn=cards");
        });

        assert!(rx.try_recv().is_err());
        assert_eq!(handle.open_activities(), 1);
        assert_eq!(handle.flush().unwrap(), 1);
        assert_eq!(handle.open_activities(), 0);

        let Ok(Tracked::Activity(activity)) = rx.try_recv() else {
            panic!("expected an activity");
        };
        assert_eq!(activity.name, "Checkout");
        assert_eq!(activity.status, ActivityStatus::End);
        assert_eq!(activity.resource, "api");

        let event = &activity.events[0];
        assert_eq!(event.user.as_deref(), Some("alice"));
        assert_eq!(event.resource, "cards");
        let snapshot = &event.snapshots[0];
        assert!(snapshot.get("order").is_some());
    }

    #[test]
    fn test_exited_thread_releases_its_context() {
        let (sink, mut rx) = channel();
        let layer = TagtrackLayer::new(&quiet_config(), Arc::new(sink));
        let handle = layer.handle();
        let dispatch = tracing::Dispatch::new(tracing_subscriber::registry().with(layer));

        let worker = dispatch.clone();
        std::thread::spawn(move || {
            tracing::dispatcher::with_default(&worker, || {
                tracing::info!(target: "jobs", "#beg=Batch");
                tracing::info!(target: "jobs", "first");
            });
        })
        .join()
        .unwrap();

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(target: "jobs", "main thread record");
        });

        let Ok(Tracked::Activity(activity)) = rx.try_recv() else {
            panic!("expected the worker's activity");
        };
        assert_eq!(activity.name, "Batch");
        assert_eq!(activity.status, ActivityStatus::End);
        assert_eq!(activity.events.len(), 1);
        assert_eq!(handle.open_activities(), 0);
        assert_eq!(handle.shared.contexts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_own_targets_are_ignored() {
        let (sink, mut rx) = channel();
        let layer = TagtrackLayer::new(&quiet_config(), Arc::new(sink));
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "tagtrack::sink", "#beg=Loop");
        });

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_tracing_sink_does_not_feed_back() {
        let config = Config {
            max_activity_size: 2,
            ..quiet_config()
        };
        let layer = TagtrackLayer::new(&config, Arc::new(tagtrack_activity::TracingSink));
        let handle = layer.handle();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "jobs", "#beg=Job");
            tracing::info!(target: "jobs", "one");
            assert_eq!(handle.open_activities(), 1);
            // Fills the activity; the emitted item re-enters tracing under tagtrack::sink
            tracing::info!(target: "jobs", "two");
            assert_eq!(handle.open_activities(), 0);
        });
    }

    #[test]
    fn test_error_field_is_attached() {
        let (sink, mut rx) = channel();
        let config = Config {
            max_activity_size: 1,
            ..quiet_config()
        };
        let layer = TagtrackLayer::new(&config, Arc::new(sink));
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "jobs", "#beg=Job");
            let err = std::io::Error::other("disk full");
            tracing::error!(
                target: "jobs",
                error = &err as &(dyn std::error::Error + 'static),
                "write failed"
            );
        });

        let Ok(Tracked::Activity(activity)) = rx.try_recv() else {
            panic!("expected an activity");
        };
        assert_eq!(activity.status, ActivityStatus::Exception);
        assert_eq!(activity.error.map(|e| e.message), Some("disk full".to_string()));
    }
}
