//! # Core Agent Infrastructure
//!
//! This module provides the pieces every delivery path shares: the allocation
//! notifier itself, the agent option parser, and notification metrics.

pub mod config;
pub mod metrics;
pub mod notifier;
