//! # Notification Sinks
//!
//! A [`NotifySink`] is the far side of the boundary call: whatever receives
//! "this object was just instantiated". The agent ships three built-in sinks
//! and a [`QueuedSink`] that moves delivery off the calling thread.

pub mod queue;

pub use queue::QueuedSink;

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::core::config::SinkKind;
use crate::error::SinkError;

/// Line written for every notification by [`ConsoleSink`].
pub const NEW_EVENT_LINE: &str = "New Event";

/// Receiver of instantiation notifications.
///
/// Implementations are called concurrently from every thread that constructs
/// objects, so `notify` must not block for long and must not alter `object`.
pub trait NotifySink<O: ?Sized>: Send + Sync {
    fn notify(&self, object: &O) -> Result<(), SinkError>;
}

impl<O: ?Sized, S: NotifySink<O> + ?Sized> NotifySink<O> for Box<S> {
    fn notify(&self, object: &O) -> Result<(), SinkError> {
        (**self).notify(object)
    }
}

impl<O: ?Sized, S: NotifySink<O> + ?Sized> NotifySink<O> for Arc<S> {
    fn notify(&self, object: &O) -> Result<(), SinkError> {
        (**self).notify(object)
    }
}

/// Prints [`NEW_EVENT_LINE`] for every notification.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new<W: Write + Send + 'static>(out: W) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }
}

impl<O: ?Sized> NotifySink<O> for ConsoleSink {
    fn notify(&self, _object: &O) -> Result<(), SinkError> {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(out, "{}", NEW_EVENT_LINE)?;
        out.flush()?;
        Ok(())
    }
}

/// Emits an `info` record on target `count_agent::event` per notification.
pub struct LogSink;

impl<O: ?Sized> NotifySink<O> for LogSink {
    fn notify(&self, _object: &O) -> Result<(), SinkError> {
        log::info!(target: "count_agent::event", "{}", NEW_EVENT_LINE);
        Ok(())
    }
}

/// Accepts and discards every notification.
pub struct Silent;

impl<O: ?Sized> NotifySink<O> for Silent {
    fn notify(&self, _object: &O) -> Result<(), SinkError> {
        Ok(())
    }
}

/// The sinks selectable through the `sink=` agent option.
pub enum BuiltinSink {
    Console(ConsoleSink),
    Log(LogSink),
    Silent(Silent),
}

impl BuiltinSink {
    pub fn from_kind(kind: SinkKind) -> Self {
        match kind {
            SinkKind::Console => BuiltinSink::Console(ConsoleSink::stdout()),
            SinkKind::Log => BuiltinSink::Log(LogSink),
            SinkKind::None => BuiltinSink::Silent(Silent),
        }
    }
}

impl<O: ?Sized> NotifySink<O> for BuiltinSink {
    #[inline]
    fn notify(&self, object: &O) -> Result<(), SinkError> {
        match self {
            BuiltinSink::Console(s) => s.notify(object),
            BuiltinSink::Log(s) => s.notify(object),
            BuiltinSink::Silent(s) => s.notify(object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writer that appends into a shared buffer so tests can inspect output.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_console_sink_prints_one_line_per_event() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::new(buf.clone());

        sink.notify(&"a").unwrap();
        sink.notify(&42).unwrap();

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(out, "New Event\nNew Event\n");
    }

    #[test]
    fn test_console_sink_reports_io_errors() {
        let sink = ConsoleSink::new(BrokenPipe);
        let err = NotifySink::<str>::notify(&sink, "x").unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
    }

    #[test]
    fn test_builtin_sink_from_kind() {
        assert!(matches!(BuiltinSink::from_kind(SinkKind::Console), BuiltinSink::Console(_)));
        assert!(matches!(BuiltinSink::from_kind(SinkKind::Log), BuiltinSink::Log(_)));
        assert!(matches!(BuiltinSink::from_kind(SinkKind::None), BuiltinSink::Silent(_)));
        assert!(BuiltinSink::from_kind(SinkKind::None).notify(&()).is_ok());
        assert!(BuiltinSink::from_kind(SinkKind::Log).notify(&()).is_ok());
    }
}
