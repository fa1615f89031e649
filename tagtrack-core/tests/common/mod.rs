//! Shared harness for tagtrack-core integration tests.

// Each test file compiles separately, so not all helpers are used in each binary
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tagtrack_activity::{Tracked, channel};
use tagtrack_core::{
    Config, CorrelationContext, CorrelationError, Correlator, LogLevel, ManualClock, Processed,
    RawRecord,
};
use tokio::sync::mpsc::UnboundedReceiver;

/// Wall-clock start of every harness, in milliseconds since the epoch
pub const START_MS: u64 = 1_700_000_000_000;

/// A correlator wired to a manual clock and a channel sink
pub struct Harness {
    pub correlator: Correlator,
    pub clock: Arc<ManualClock>,
    pub ctx: CorrelationContext,
    rx: UnboundedReceiver<Tracked>,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        let (sink, rx) = channel();
        let clock = Arc::new(ManualClock::at_millis(START_MS));
        let correlator = Correlator::new(&config, Arc::new(sink)).with_clock(clock.clone());
        Self {
            correlator,
            clock,
            ctx: CorrelationContext::new(),
            rx,
        }
    }

    /// Harness whose first metrics interval has already been used up, so plain
    /// records come out as datagrams.
    pub fn quiet(config: Config) -> Self {
        let harness = Self::new(config);
        let now = std::time::UNIX_EPOCH + Duration::from_millis(START_MS);
        harness.correlator.scheduler().should_snapshot(false, now);
        harness
    }

    /// Record stamped with the harness clock
    pub fn record(&self, level: LogLevel, message: &str) -> RawRecord {
        RawRecord::new("com.example.Orders", level, message)
            .timestamp_ms(self.clock.now_millis())
            .thread("worker-1")
    }

    pub fn process(&mut self, record: &RawRecord) -> Result<Processed, CorrelationError> {
        self.correlator.process(&mut self.ctx, record)
    }

    /// Process a plain record with the given level and message
    pub fn log(&mut self, level: LogLevel, message: &str) -> Result<Processed, CorrelationError> {
        let record = self.record(level, message);
        self.process(&record)
    }

    pub fn drain(&mut self) -> Vec<Tracked> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }
}
