//! # Native Agent Logging
//!
//! This module provides the `log` facade implementation for the agent.
//!
//! Records are formatted on the calling thread and handed to a bounded
//! channel; a background thread writes them to stderr. The JVM threads that
//! construct objects therefore never wait on stderr, and records are dropped
//! (and counted) when the channel is full.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::cell::RefCell;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::{Once, OnceLock};
use std::thread;

/// Prefix of every line the agent writes to stderr.
const PREFIX: &str = "[count-agent]";

/// 20,000 buffered records before the logger starts dropping.
const CHANNEL_CAPACITY: usize = 20_000;

static SENDER: OnceLock<SyncSender<String>> = OnceLock::new();

/// Counter for records dropped due to channel congestion.
static DROPPED_LOGS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Per-thread prefix added after the level, e.g. a thread role.
    static LOG_CONTEXT: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Sets the current thread's logging context.
pub fn set_context(context: &str) {
    LOG_CONTEXT.with(|c| {
        *c.borrow_mut() = context.to_string();
    });
}

pub fn dropped_logs() -> u64 {
    DROPPED_LOGS.load(Ordering::Relaxed)
}

const CRATE_TARGET: &str = "count_agent";

/// Reads the level from `RUST_LOG`, defaulting to `Info`.
pub fn level_from_env() -> LevelFilter {
    parse_level(std::env::var("RUST_LOG").ok().as_deref())
}

/// Reads env_logger-style directives (`warn,count_agent=debug`). Directives
/// for `count_agent` or its modules win over a bare level; the most verbose
/// of them applies. Directives for other crates are ignored.
fn parse_level(value: Option<&str>) -> LevelFilter {
    let mut global = None;
    let mut own: Option<LevelFilter> = None;

    for directive in value.unwrap_or_default().split(',').map(str::trim) {
        match directive.split_once('=') {
            Some((target, level)) => {
                let target = target.trim();
                let ours = target == CRATE_TARGET
                    || target.strip_prefix(CRATE_TARGET).is_some_and(|rest| rest.starts_with("::"));
                if let (true, Ok(level)) = (ours, level.trim().parse::<LevelFilter>()) {
                    own = Some(own.map_or(level, |current| current.max(level)));
                }
            }
            None => {
                if let Ok(level) = directive.parse() {
                    global = Some(level);
                }
            }
        }
    }

    own.or(global).unwrap_or(LevelFilter::Info)
}

fn format_line(level: Level, context: &str, args: &std::fmt::Arguments<'_>) -> String {
    if context.is_empty() {
        format!("{} {:<5} {}", PREFIX, level, args)
    } else {
        format!("{} {:<5} {} {}", PREFIX, level, context, args)
    }
}

struct AgentLogger;

impl Log for AgentLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        // Filtering is handled via log::set_max_level during initialization.
        true
    }

    fn log(&self, record: &Record) {
        if let Some(tx) = SENDER.get() {
            let line = LOG_CONTEXT.with(|c| format_line(record.level(), &c.borrow(), record.args()));
            if tx.try_send(line).is_err() {
                DROPPED_LOGS.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn flush(&self) {}
}

/// Installs the agent logger at `level`.
///
/// Idempotent: only the first call has any effect. If another logger is
/// already registered in the process the agent keeps using it.
pub fn init(level: LevelFilter) {
    static START: Once = Once::new();
    START.call_once(|| {
        if let Err(e) = init_internal(level) {
            eprintln!("{} Logging initialization failed: {}", PREFIX, e);
        }
    });
}

fn init_internal(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, rx) = std::sync::mpsc::sync_channel::<String>(CHANNEL_CAPACITY);

    log::set_logger(&AgentLogger)?;
    log::set_max_level(level);

    if SENDER.set(tx).is_err() {
        return Err("SENDER already initialized".into());
    }

    thread::Builder::new()
        .name("count-agent-log".to_string())
        .spawn(move || {
            let stderr = std::io::stderr();
            while let Ok(line) = rx.recv() {
                let mut out = stderr.lock();
                let _ = writeln!(out, "{}", line);
            }
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(None), LevelFilter::Info);
        assert_eq!(parse_level(Some("debug")), LevelFilter::Debug);
        assert_eq!(parse_level(Some(" WARN ")), LevelFilter::Warn);
        assert_eq!(parse_level(Some("off")), LevelFilter::Off);
        assert_eq!(parse_level(Some("")), LevelFilter::Info);
        assert_eq!(parse_level(Some("loud")), LevelFilter::Info);
    }

    #[test]
    fn test_parse_level_reads_env_logger_directives() {
        assert_eq!(parse_level(Some("count_agent=trace")), LevelFilter::Trace);
        assert_eq!(parse_level(Some("warn,count_agent=debug")), LevelFilter::Debug);
        assert_eq!(parse_level(Some("count_agent=error,debug")), LevelFilter::Error);
        assert_eq!(
            parse_level(Some("count_agent=info,count_agent::event=trace")),
            LevelFilter::Trace
        );
        assert_eq!(parse_level(Some("hyper=trace,warn")), LevelFilter::Warn);
        assert_eq!(parse_level(Some("count_agentx=trace")), LevelFilter::Info);
    }

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line(Level::Info, "", &format_args!("Agent Started")),
            "[count-agent] INFO  Agent Started"
        );
        assert_eq!(
            format_line(Level::Warn, "[notify]", &format_args!("queue full")),
            "[count-agent] WARN  [notify] queue full"
        );
    }
}
