use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by an [`AllocationNotifier`](super::notifier::AllocationNotifier).
#[derive(Debug, Default)]
pub struct NotifierMetrics {
    notifications: AtomicU64,
    forwarded: AtomicU64,
    null_references: AtomicU64,
    sink_failures: AtomicU64,
}

impl NotifierMetrics {
    pub const fn new() -> Self {
        Self {
            notifications: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            null_references: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
        }
    }

    pub fn record_notification(&self) { self.notifications.fetch_add(1, Ordering::Relaxed); }
    pub fn record_forwarded(&self) { self.forwarded.fetch_add(1, Ordering::Relaxed); }
    pub fn record_null(&self) { self.null_references.fetch_add(1, Ordering::Relaxed); }
    pub fn record_failure(&self) { self.sink_failures.fetch_add(1, Ordering::Relaxed); }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            notifications: self.notifications.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            null_references: self.null_references.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`NotifierMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub notifications: u64,
    pub forwarded: u64,
    pub null_references: u64,
    pub sink_failures: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "notifications={} forwarded={} nulls={} failures={}",
            self.notifications, self.forwarded, self.null_references, self.sink_failures
        )
    }
}
