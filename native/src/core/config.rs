//! Agent option parsing.
//!
//! The JVM hands the agent everything after `=` in
//! `-agentpath:/path/to/libcount_agent.so=<options>` as one string. The agent
//! reads it as comma-separated `key=value` pairs:
//!
//! - `sink=console|log|none` selects where notifications go (default `console`)
//! - `queue=<capacity>` delivers through a bounded background queue; `0` (the
//!   default) delivers on the calling thread; capped at [`MAX_QUEUE_CAPACITY`]
//! - `log=<level>` sets the native log level, overriding `RUST_LOG`. Without
//!   it the level comes from `RUST_LOG`, read as env_logger directives: a
//!   `count_agent=<level>` directive wins over a bare `<level>`

use std::str::FromStr;

use log::LevelFilter;

use crate::error::ConfigError;

/// Largest accepted `queue=` value. The channel allocates every slot up front.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Which built-in sink receives notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkKind {
    /// Prints `New Event` to stdout for every notification.
    #[default]
    Console,
    /// Emits a `log` record for every notification.
    Log,
    /// Discards notifications.
    None,
}

impl FromStr for SinkKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" | "stdout" => Ok(SinkKind::Console),
            "log" => Ok(SinkKind::Log),
            "none" | "off" => Ok(SinkKind::None),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub sink: SinkKind,
    /// Capacity of the delivery queue. Zero means direct delivery.
    pub queue_capacity: usize,
    pub log_level: LevelFilter,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            queue_capacity: 0,
            log_level: LevelFilter::Info,
        }
    }
}

impl AgentConfig {
    /// Parses an agent option string. `default_level` applies when no `log=`
    /// option is present.
    pub fn parse(options: &str, default_level: LevelFilter) -> Result<Self, ConfigError> {
        let mut config = AgentConfig {
            log_level: default_level,
            ..Default::default()
        };

        for segment in options.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| ConfigError::MissingValue(segment.to_string()))?;
            let (key, value) = (key.trim(), value.trim());

            let invalid = || ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            };

            match key {
                "sink" => config.sink = value.parse().map_err(|_| invalid())?,
                "queue" => {
                    config.queue_capacity = value
                        .parse::<usize>()
                        .ok()
                        .filter(|capacity| *capacity <= MAX_QUEUE_CAPACITY)
                        .ok_or_else(invalid)?
                }
                "log" => config.log_level = value.parse().map_err(|_| invalid())?,
                _ => return Err(ConfigError::UnknownKey(key.to_string())),
            }
        }

        Ok(config)
    }

    pub fn is_queued(&self) -> bool {
        self.queue_capacity > 0
    }
}

impl FromStr for AgentConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentConfig::parse(s, LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_options_yield_defaults() {
        let config = AgentConfig::parse("", LevelFilter::Warn).unwrap();
        assert_eq!(config.sink, SinkKind::Console);
        assert_eq!(config.queue_capacity, 0);
        assert_eq!(config.log_level, LevelFilter::Warn);
        assert!(!config.is_queued());
    }

    #[test]
    fn test_all_keys() {
        let config: AgentConfig = " sink=log , queue=512,log=DEBUG ".parse().unwrap();
        assert_eq!(config.sink, SinkKind::Log);
        assert_eq!(config.queue_capacity, 512);
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert!(config.is_queued());
    }

    #[test]
    fn test_queue_capacity_upper_bound_is_accepted() {
        let config: AgentConfig = format!("queue={}", MAX_QUEUE_CAPACITY).parse().unwrap();
        assert_eq!(config.queue_capacity, MAX_QUEUE_CAPACITY);
    }

    #[test]
    fn test_empty_segments_are_ignored() {
        let config: AgentConfig = ",,sink=none,".parse().unwrap();
        assert_eq!(config.sink, SinkKind::None);
    }

    #[test]
    fn test_log_option_overrides_default_level() {
        let config = AgentConfig::parse("log=off", LevelFilter::Trace).unwrap();
        assert_eq!(config.log_level, LevelFilter::Off);
    }

    #[test]
    fn test_rejects_bad_options() {
        assert_eq!(
            "verbose".parse::<AgentConfig>(),
            Err(ConfigError::MissingValue("verbose".to_string()))
        );
        assert_eq!(
            "color=red".parse::<AgentConfig>(),
            Err(ConfigError::UnknownKey("color".to_string()))
        );
        assert_eq!(
            "queue=-1".parse::<AgentConfig>(),
            Err(ConfigError::InvalidValue {
                key: "queue".to_string(),
                value: "-1".to_string()
            })
        );
        assert_eq!(
            "queue=18446744073709551615".parse::<AgentConfig>(),
            Err(ConfigError::InvalidValue {
                key: "queue".to_string(),
                value: "18446744073709551615".to_string()
            })
        );
        assert!(format!("queue={}", MAX_QUEUE_CAPACITY + 1)
            .parse::<AgentConfig>()
            .is_err());
        assert!("queue=2000000000".parse::<AgentConfig>().is_err());
        assert!("sink=socket".parse::<AgentConfig>().is_err());
        assert!("log=loud".parse::<AgentConfig>().is_err());
    }
}
