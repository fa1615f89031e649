//! Process-wide decision of when a record carries a metrics snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::trace;

use crate::config::Config;

/// Shared last-snapshot timestamp plus the snapshot policy.
///
/// The timestamp is only ever changed by [`MetricsScheduler::should_snapshot`]
/// and only when it answers `true`; concurrent callers race on a
/// compare-and-swap, so a single interval yields a single snapshot.
#[derive(Debug)]
pub struct MetricsScheduler {
    on_exception: bool,
    frequency_ms: u64,
    /// Milliseconds since the Unix epoch, 0 before the first snapshot
    last_snapshot_ms: AtomicU64,
}

impl MetricsScheduler {
    pub fn new(on_exception: bool, frequency: Duration) -> Self {
        Self {
            on_exception,
            frequency_ms: u64::try_from(frequency.as_millis()).unwrap_or(u64::MAX),
            last_snapshot_ms: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.metrics_on_exception, config.metrics_frequency())
    }

    pub fn should_snapshot(&self, has_error: bool, now: SystemTime) -> bool {
        let now_ms = now
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);

        if has_error && self.on_exception {
            // Never move the timestamp backwards
            self.last_snapshot_ms.fetch_max(now_ms, Ordering::AcqRel);
            trace!(target: "tagtrack::scheduler", "snapshot on error");
            return true;
        }

        let mut last = self.last_snapshot_ms.load(Ordering::Acquire);
        loop {
            if now_ms.saturating_sub(last) < self.frequency_ms {
                return false;
            }
            match self.last_snapshot_ms.compare_exchange_weak(
                last,
                now_ms,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    trace!(target: "tagtrack::scheduler", last, now_ms, "snapshot interval elapsed");
                    return true;
                }
                Err(current) => last = current,
            }
        }
    }

    /// Time of the last positive decision, `None` before the first one.
    pub fn last_snapshot(&self) -> Option<SystemTime> {
        match self.last_snapshot_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_interval_gate() {
        let scheduler = MetricsScheduler::new(true, Duration::from_secs(60));

        assert!(scheduler.should_snapshot(false, at(1_000)));
        assert_eq!(scheduler.last_snapshot(), Some(at(1_000)));

        assert!(!scheduler.should_snapshot(false, at(1_059)));
        assert_eq!(scheduler.last_snapshot(), Some(at(1_000)));

        assert!(scheduler.should_snapshot(false, at(1_060)));
        assert_eq!(scheduler.last_snapshot(), Some(at(1_060)));
    }

    #[test]
    fn test_huge_frequency_saturates() {
        // 18_446_744_073_709_552 s is 2^64 + 384 ms
        let scheduler = MetricsScheduler::new(false, Duration::from_secs(18_446_744_073_709_552));
        assert!(!scheduler.should_snapshot(false, at(1_000)));
        assert!(!scheduler.should_snapshot(false, at(2_000_000_000)));
        assert_eq!(scheduler.last_snapshot(), None);
    }

    #[test]
    fn test_error_always_snapshots_when_enabled() {
        let scheduler = MetricsScheduler::new(true, Duration::from_secs(60));
        assert!(scheduler.should_snapshot(false, at(1_000)));
        assert!(scheduler.should_snapshot(true, at(1_001)));
        assert!(scheduler.should_snapshot(true, at(1_002)));
        assert_eq!(scheduler.last_snapshot(), Some(at(1_002)));
    }

    #[test]
    fn test_error_without_policy_uses_interval() {
        let scheduler = MetricsScheduler::new(false, Duration::from_secs(60));
        assert!(scheduler.should_snapshot(true, at(1_000)));
        assert!(!scheduler.should_snapshot(true, at(1_001)));
    }

    #[test]
    fn test_one_snapshot_per_interval_across_threads() {
        let scheduler = Arc::new(MetricsScheduler::new(false, Duration::from_secs(60)));
        let hits = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = scheduler.clone();
                let hits = hits.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if scheduler.should_snapshot(false, at(5_000)) {
                            hits.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
