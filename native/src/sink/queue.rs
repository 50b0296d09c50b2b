//! Queued delivery.
//!
//! [`QueuedSink`] keeps object-construction sites off the delivery path: the
//! calling thread only performs a `try_send` into a bounded channel, and a
//! background thread hands each reference to the downstream sink. When the
//! channel is full the notification is dropped and counted.

use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::NotifySink;
use crate::core::config::MAX_QUEUE_CAPACITY;
use crate::core::notifier::report_failure;
use crate::diagnostics::logging;
use crate::error::SinkError;

const THREAD_NAME: &str = "count-agent-notify";

#[derive(Default)]
struct QueueState {
    /// Accepted but not yet delivered.
    pending: AtomicUsize,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    consecutive_failures: AtomicU32,
}

pub struct QueuedSink<O> {
    tx: SyncSender<O>,
    state: Arc<QueueState>,
}

impl<O: Send + 'static> QueuedSink<O> {
    /// Starts the drain thread and returns the sink feeding it.
    pub fn spawn<D>(downstream: D, capacity: usize) -> io::Result<Self>
    where
        D: NotifySink<O> + 'static,
    {
        Self::spawn_with(downstream, capacity, || {})
    }

    /// Like [`spawn`](Self::spawn), running `on_start` on the drain thread
    /// before the first delivery.
    ///
    /// `capacity` is clamped to `1..=MAX_QUEUE_CAPACITY`.
    pub fn spawn_with<D, F>(downstream: D, capacity: usize, on_start: F) -> io::Result<Self>
    where
        D: NotifySink<O> + 'static,
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<O>(capacity.clamp(1, MAX_QUEUE_CAPACITY));
        let state = Arc::new(QueueState::default());
        let drain_state = Arc::clone(&state);

        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                logging::set_context("[notify]");
                on_start();

                while let Ok(object) = rx.recv() {
                    match downstream.notify(&object) {
                        Ok(()) => {
                            drain_state.delivered.fetch_add(1, Ordering::Relaxed);
                            drain_state.consecutive_failures.store(0, Ordering::Relaxed);
                        }
                        Err(e) => {
                            drain_state.failed.fetch_add(1, Ordering::Relaxed);
                            // Only this thread writes the streak.
                            let streak = drain_state
                                .consecutive_failures
                                .load(Ordering::Relaxed)
                                .saturating_add(1);
                            drain_state.consecutive_failures.store(streak, Ordering::Relaxed);
                            report_failure("Queued new event not delivered", streak, &e);
                        }
                    }
                    drop(object);
                    drain_state.pending.fetch_sub(1, Ordering::Release);
                }
                log::debug!("Notification queue closed, drain thread exiting");
            })?;

        Ok(Self { tx, state })
    }
}

impl<O> QueuedSink<O> {
    /// Waits until every accepted notification has been delivered. Returns
    /// `false` if `timeout` elapsed first.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.state.pending.load(Ordering::Acquire) != 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    pub fn delivered(&self) -> u64 {
        self.state.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.state.failed.load(Ordering::Relaxed)
    }

    /// Downstream failures since the last successful delivery.
    pub fn consecutive_failures(&self) -> u32 {
        self.state.consecutive_failures.load(Ordering::Relaxed)
    }
}

impl<O: Clone + Send + 'static> NotifySink<O> for QueuedSink<O> {
    fn notify(&self, object: &O) -> Result<(), SinkError> {
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(object.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.state.pending.fetch_sub(1, Ordering::AcqRel);
                self.state.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SinkError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.state.pending.fetch_sub(1, Ordering::AcqRel);
                Err(SinkError::Closed)
            }
        }
    }
}
