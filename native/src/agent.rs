//! Process-wide agent state.
//!
//! One [`Agent`] exists per JVM. `Agent_OnLoad` builds it from the option
//! string; if the library was only loaded through `System.loadLibrary`, the
//! first `nativeNewEvent` call builds it from the defaults instead.

use std::sync::OnceLock;
use std::time::Duration;

use jni::objects::{GlobalRef, JObject};
use jni::{JNIEnv, JavaVM};

use crate::core::config::AgentConfig;
use crate::core::metrics::MetricsSnapshot;
use crate::core::notifier::AllocationNotifier;
use crate::diagnostics::logging;
use crate::error::AgentError;
use crate::sink::{BuiltinSink, QueuedSink};

static AGENT: OnceLock<Agent> = OnceLock::new();

enum Delivery {
    /// The sink runs on the JVM thread that constructed the object.
    Direct(AllocationNotifier<BuiltinSink>),
    /// Local references are promoted to global references and queued.
    Queued(AllocationNotifier<QueuedSink<GlobalRef>>),
}

pub struct Agent {
    config: AgentConfig,
    delivery: Delivery,
}

impl Agent {
    /// Builds the agent described by `config`. `vm` is attached to the queue's
    /// drain thread so global references can be released there.
    pub fn from_config(config: AgentConfig, vm: Option<JavaVM>) -> Result<Self, AgentError> {
        if !config.is_queued() {
            return Ok(Self::direct(config));
        }

        let sink = BuiltinSink::from_kind(config.sink);
        let queued = QueuedSink::spawn_with(sink, config.queue_capacity, move || {
            if let Some(vm) = vm {
                if let Err(e) = vm.attach_current_thread_permanently() {
                    log::warn!("Failed to attach notification thread to the JVM: {:?}", e);
                }
            }
        })?;

        Ok(Self {
            config,
            delivery: Delivery::Queued(AllocationNotifier::new(queued)),
        })
    }

    /// Builds an agent that delivers on the calling thread, ignoring
    /// `config.queue_capacity`.
    pub fn direct(config: AgentConfig) -> Self {
        let sink = BuiltinSink::from_kind(config.sink);
        Self {
            config,
            delivery: Delivery::Direct(AllocationNotifier::new(sink)),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn is_queued(&self) -> bool {
        matches!(self.delivery, Delivery::Queued(_))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        match &self.delivery {
            Delivery::Direct(n) => n.metrics(),
            Delivery::Queued(n) => n.metrics(),
        }
    }

    /// Forwards a `nativeNewEvent(object)` call.
    pub fn new_event<'local>(&self, env: &JNIEnv<'local>, object: JObject<'local>) {
        match &self.delivery {
            Delivery::Direct(notifier) => notifier.new_event(non_null(&object)),
            Delivery::Queued(notifier) => match non_null(&object) {
                None => notifier.new_event::<GlobalRef>(None),
                // The local reference dies when the native call returns.
                Some(local) => match env.new_global_ref(*local) {
                    Ok(global) => notifier.new_event(Some(&global)),
                    Err(e) => notifier.undeliverable(&e),
                },
            },
        }
    }

    /// Drains any queued notifications and logs a summary.
    pub fn shutdown(&self, timeout: Duration) {
        if let Delivery::Queued(notifier) = &self.delivery {
            let queue = notifier.sink();
            if !queue.flush(timeout) {
                log::warn!(
                    "Agent stopping with {} notifications still queued after {:?}",
                    queue.pending(),
                    timeout
                );
            }
            log::info!(
                "Notification queue: delivered={} dropped={} failed={}",
                queue.delivered(),
                queue.dropped(),
                queue.failed()
            );
        }
        log::info!("Agent stopped: {}", self.metrics());

        let dropped_logs = logging::dropped_logs();
        if dropped_logs > 0 {
            eprintln!("[count-agent] {} log records dropped", dropped_logs);
        }
    }
}

/// Maps a JNI null reference to `None`.
fn non_null<'a, 'local>(object: &'a JObject<'local>) -> Option<&'a JObject<'local>> {
    (!object.is_null()).then_some(object)
}

/// Builds and installs the agent for an `Agent_OnLoad` call.
pub fn load(vm: JavaVM, options: &str) -> Result<(), AgentError> {
    install(&AGENT, options, Some(vm)).map(|_| ())
}

/// Parses `options` and installs the resulting agent into `slot`. Returns
/// `false` when an agent was already installed; its options are kept.
fn install(slot: &OnceLock<Agent>, options: &str, vm: Option<JavaVM>) -> Result<bool, AgentError> {
    let config = AgentConfig::parse(options, logging::level_from_env())?;
    logging::init(config.log_level);

    if slot.get().is_some() {
        log::warn!("Agent already loaded; ignoring options '{}'", options);
        return Ok(false);
    }

    log::debug!("Agent options: {:?}", config);
    let agent = Agent::from_config(config, vm)?;
    if slot.set(agent).is_err() {
        log::warn!("Agent already loaded; ignoring options '{}'", options);
        return Ok(false);
    }

    log::info!("Agent Started");
    Ok(true)
}

/// Shuts the installed agent down for an `Agent_OnUnload` call.
pub fn unload(timeout: Duration) {
    if let Some(agent) = AGENT.get() {
        agent.shutdown(timeout);
    }
}

pub fn global() -> Option<&'static Agent> {
    AGENT.get()
}

/// Returns the installed agent, building a direct-delivery agent from the
/// defaults when `Agent_OnLoad` never ran.
pub fn get_or_init() -> &'static Agent {
    get_or_init_in(&AGENT)
}

fn get_or_init_in(slot: &OnceLock<Agent>) -> &Agent {
    slot.get_or_init(|| {
        let config = AgentConfig {
            log_level: logging::level_from_env(),
            ..Default::default()
        };
        logging::init(config.log_level);
        log::info!("Agent Started without Agent_OnLoad; using default options");
        Agent::direct(config)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SinkKind;

    fn silent(queue_capacity: usize) -> AgentConfig {
        AgentConfig {
            sink: SinkKind::None,
            queue_capacity,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_capacity_delivers_directly() {
        let agent = Agent::from_config(silent(0), None).unwrap();
        assert!(!agent.is_queued());
        assert_eq!(agent.metrics(), MetricsSnapshot::default());
        agent.shutdown(Duration::from_millis(10));
    }

    #[test]
    fn test_queue_capacity_selects_queued_delivery() {
        let agent = Agent::from_config(silent(64), None).unwrap();
        assert!(agent.is_queued());
        assert_eq!(agent.config().queue_capacity, 64);
        agent.shutdown(Duration::from_millis(100));
    }

    #[test]
    fn test_direct_ignores_queue_capacity() {
        let agent = Agent::direct(silent(64));
        assert!(!agent.is_queued());
    }

    #[test]
    fn test_direct_delivery_maps_null_to_none() {
        let agent = Agent::direct(silent(0));
        let Delivery::Direct(notifier) = &agent.delivery else {
            panic!("expected direct delivery");
        };
        // Never dereferenced: the silent sink ignores the object.
        let object = JObject::from(0x10 as jni::sys::jobject);

        assert!(non_null(&JObject::null()).is_none());
        assert!(non_null(&object).is_some());
        notifier.new_event(non_null(&JObject::null()));
        notifier.new_event(non_null(&object));

        let snap = agent.metrics();
        assert_eq!(snap.notifications, 2);
        assert_eq!(snap.null_references, 1);
        assert_eq!(snap.forwarded, 1);
    }

    #[test]
    fn test_install_rejects_bad_options() {
        let slot = OnceLock::new();
        let err = install(&slot, "queue=lots", None).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_second_install_keeps_the_first_agent() {
        let slot = OnceLock::new();
        assert!(install(&slot, "sink=none,queue=8", None).unwrap());
        assert!(!install(&slot, "sink=none", None).unwrap());

        let agent = slot.get().unwrap();
        assert!(agent.is_queued());
        assert_eq!(agent.config().queue_capacity, 8);
        agent.shutdown(Duration::from_millis(100));
    }

    #[test]
    fn test_lazy_agent_uses_defaults() {
        let slot = OnceLock::new();
        let agent = get_or_init_in(&slot);
        assert!(!agent.is_queued());
        assert_eq!(agent.config().sink, SinkKind::Console);
        assert!(matches!(agent.delivery, Delivery::Direct(_)));
    }

    #[test]
    fn test_lazy_lookup_returns_installed_agent() {
        let slot = OnceLock::new();
        install(&slot, "sink=none,queue=4", None).unwrap();
        let agent = get_or_init_in(&slot);
        assert!(agent.is_queued());
        assert_eq!(agent.config().sink, SinkKind::None);
        agent.shutdown(Duration::from_millis(100));
    }
}
