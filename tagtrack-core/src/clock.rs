use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time source of the correlator
pub trait Clock: Send + Sync {
    /// Wall-clock time
    fn now(&self) -> SystemTime;

    /// Monotonic time, used for elapsed-time inference between records
    fn monotonic(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    state: Mutex<(SystemTime, Duration)>,
}

impl ManualClock {
    /// Start at `epoch_ms` milliseconds after the Unix epoch.
    pub fn at_millis(epoch_ms: u64) -> Self {
        Self {
            base: Instant::now(),
            state: Mutex::new((UNIX_EPOCH + Duration::from_millis(epoch_ms), Duration::ZERO)),
        }
    }

    /// Move both wall-clock and monotonic time forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().expect("clock mutex poisoned");
        state.0 += by;
        state.1 += by;
    }

    /// Wall-clock time in milliseconds since the Unix epoch
    pub fn now_millis(&self) -> u64 {
        self.now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_millis(0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.state.lock().expect("clock mutex poisoned").0
    }

    fn monotonic(&self) -> Instant {
        self.base + self.state.lock().expect("clock mutex poisoned").1
    }
}
