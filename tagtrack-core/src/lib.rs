//! Correlation engine for hash-tag annotated log records.
//!
//! A [`RawRecord`] flows through the [`tags`] parser, the [`EventBuilder`] and
//! the [`Correlator`], which decides per [`CorrelationContext`] whether the
//! record opens or closes an activity, is appended to the open one, or leaves
//! as a standalone event. Finished items go to an
//! [`EventSink`](tagtrack_activity::EventSink).

pub mod builder;
pub mod clock;
pub mod config;
pub mod correlator;
pub mod error;
pub mod record;
pub mod scheduler;
pub mod severity;
pub mod tags;

pub use builder::{Built, EventBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use correlator::{CorrelationContext, Correlator, MetricsProvider, NoMetrics, Processed};
pub use error::{ConfigError, CorrelationError, FieldError};
pub use record::{LogLevel, RawRecord, SourceLocation};
pub use scheduler::MetricsScheduler;
pub use severity::{LevelMapping, map_level};
pub use tags::{Annotation, Annotations, ControlKey, ParsedMessage, UserField, parse_message};
