//! # Native Diagnostics and Logging
//!
//! This module coordinates native-side logging for the agent.

pub mod logging;
