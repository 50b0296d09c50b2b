//! Error types for the agent, its configuration and its sinks.

use thiserror::Error;

/// Errors raised while parsing the agent option string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An option segment had no `=`.
    #[error("option '{0}' is missing a value (expected key=value)")]
    MissingValue(String),

    /// An option key the agent does not understand.
    #[error("unknown option: {0}")]
    UnknownKey(String),

    /// A known key with a value that does not parse.
    #[error("invalid value '{value}' for option '{key}'")]
    InvalidValue { key: String, value: String },
}

/// Errors returned by a [`NotifySink`](crate::sink::NotifySink) for a single notification.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing the notification failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The delivery queue is at capacity; the notification was dropped.
    #[error("notification queue is full")]
    QueueFull,

    /// The delivery thread is gone.
    #[error("notification queue is closed")]
    Closed,
}

/// Errors raised while bringing the agent up.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("JNI error: {0}")]
    Jni(#[from] jni::errors::Error),

    /// The notification drain thread could not be started.
    #[error("failed to spawn notification thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("JavaVM pointer is null")]
    InvalidVm,
}
