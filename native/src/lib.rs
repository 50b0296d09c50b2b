//! # count-agent
//!
//! Native side of `count.agent.NewEvent`. The Java class declares
//!
//! ```java
//! private static native void nativeNewEvent(Object object);
//! ```
//!
//! and calls it from `newEvent(Object)` each time an instrumented program
//! constructs an object. This library implements that native method and the
//! JVMTI agent entry points, so it is attached with
//! `java -agentpath:/path/to/libcount_agent.so=<options> ...`.
//! See [`core::config`] for the option syntax.

pub mod agent;
pub mod core;
pub mod diagnostics;
pub mod error;
pub mod sink;

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use jni::objects::{JClass, JObject};
use jni::sys::{self, jint, JNI_ERR, JNI_OK};
use jni::{JNIEnv, JavaVM};

/// How long `Agent_OnUnload` waits for queued notifications.
const UNLOAD_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Indicates that `object` has just been instantiated.
///
/// Uses the agent installed by `Agent_OnLoad`, or a default one if the
/// library was loaded without it.
pub fn new_event<'local>(env: &JNIEnv<'local>, object: JObject<'local>) {
    agent::get_or_init().new_event(env, object);
}

/// `count.agent.NewEvent.nativeNewEvent(Object)`.
#[no_mangle]
#[allow(non_snake_case)]
pub extern "system" fn Java_count_agent_NewEvent_nativeNewEvent<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    object: JObject<'local>,
) {
    // A panic must not unwind into the JVM.
    caught(
        "handling new event",
        panic::catch_unwind(AssertUnwindSafe(|| new_event(&env, object))),
    );
}

/// Called by the JVM when the agent is attached at startup.
///
/// # Safety
/// `vm` must be the JavaVM pointer supplied by the JVM and `options` either
/// null or a NUL-terminated string.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "system" fn Agent_OnLoad(
    vm: *mut sys::JavaVM,
    options: *mut c_char,
    _reserved: *mut c_void,
) -> jint {
    let options = if options.is_null() {
        String::new()
    } else {
        CStr::from_ptr(options).to_string_lossy().into_owned()
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        if vm.is_null() {
            return Err(error::AgentError::InvalidVm);
        }
        let vm = JavaVM::from_raw(vm)?;
        agent::load(vm, &options)
    }));

    load_status(&options, caught("starting agent", result))
}

/// Reports a panic caught at an export boundary. Returns `None` if `result`
/// held one.
fn caught<T>(action: &str, result: std::thread::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(_) => {
            eprintln!("[count-agent] panic while {}", action);
            None
        }
    }
}

/// Status code returned to the JVM from `Agent_OnLoad`.
fn load_status(options: &str, outcome: Option<Result<(), error::AgentError>>) -> jint {
    match outcome {
        Some(Ok(())) => JNI_OK,
        Some(Err(e)) => {
            eprintln!("[count-agent] Failed to start agent with options '{}': {}", options, e);
            JNI_ERR
        }
        None => JNI_ERR,
    }
}

/// Called by the JVM when the agent is unloaded.
///
/// # Safety
/// Must only be called by the JVM.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "system" fn Agent_OnUnload(_vm: *mut sys::JavaVM) {
    caught("stopping agent", panic::catch_unwind(|| agent::unload(UNLOAD_FLUSH_TIMEOUT)));
}
