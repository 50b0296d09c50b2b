//! The allocation notifier.
//!
//! Every `count.agent.NewEvent.newEvent(Object)` call in the instrumented
//! program ends up in [`AllocationNotifier::new_event`], which hands the
//! reference to its sink unchanged. Delivery is fire-and-forget: sink errors
//! are counted and logged, never returned to the caller.

use std::fmt::Display;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::metrics::{MetricsSnapshot, NotifierMetrics};
use crate::sink::NotifySink;

/// Consecutive failures logged at `warn` before delivery goes quiet.
pub(crate) const FAILURE_WARN_LIMIT: u32 = 10;

/// How the `count`-th consecutive delivery failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureReport {
    Warn,
    /// Last warning before going quiet.
    WarnAndSuppress,
    Quiet,
}

impl FailureReport {
    pub(crate) fn for_count(count: u32) -> Self {
        match count {
            c if c < FAILURE_WARN_LIMIT => FailureReport::Warn,
            FAILURE_WARN_LIMIT => FailureReport::WarnAndSuppress,
            _ => FailureReport::Quiet,
        }
    }
}

/// Logs a delivery failure according to [`FailureReport::for_count`].
pub(crate) fn report_failure(what: &str, count: u32, err: &dyn Display) {
    match FailureReport::for_count(count) {
        FailureReport::Warn => {
            log::warn!("{} (consecutive failures: {}): {}", what, count, err);
        }
        FailureReport::WarnAndSuppress => log::warn!(
            "{} (consecutive failures: {}): {}. Suppressing further warnings until delivery recovers.",
            what,
            count,
            err
        ),
        FailureReport::Quiet => {}
    }
}

pub struct AllocationNotifier<S> {
    sink: S,
    metrics: NotifierMetrics,
    consecutive_failures: AtomicU32,
}

impl<S> AllocationNotifier<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            metrics: NotifierMetrics::new(),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Signals that `object` has just been instantiated.
    ///
    /// `None` stands for a null reference, which is counted and not forwarded.
    #[inline]
    pub fn new_event<O: ?Sized>(&self, object: Option<&O>)
    where
        S: NotifySink<O>,
    {
        self.metrics.record_notification();

        let Some(object) = object else {
            self.metrics.record_null();
            log::debug!("Ignoring new event for a null reference");
            return;
        };

        match self.sink.notify(object) {
            Ok(()) => {
                self.metrics.record_forwarded();
                if self.consecutive_failures.load(Ordering::Relaxed) != 0 {
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                }
            }
            Err(e) => self.record_failure(&e),
        }
    }

    /// Accounts for a notification that failed before it reached the sink.
    pub fn undeliverable(&self, err: &dyn Display) {
        self.metrics.record_notification();
        self.record_failure(err);
    }

    fn record_failure(&self, err: &dyn Display) {
        self.metrics.record_failure();
        // Saturates so a sink that never recovers stays quiet.
        let previous = self
            .consecutive_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| Some(c.saturating_add(1)))
            .unwrap_or_else(|c| c);
        report_failure("New event not delivered", previous.saturating_add(1), err);
    }
}
