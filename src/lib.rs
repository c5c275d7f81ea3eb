//! Health check execution engine
//!
//! Runs pluggable availability probes with result caching, single-flight
//! execution, timeouts, sticky results, grace period escalation and
//! scheduling, and aggregates them into tag-filtered reports.

pub mod config;
pub mod health;
pub mod metrics;

pub use health::{
    Executor, ExecutorSettings, Probe, ProbeDescriptor, ProbeResult, Report, RunOptions, Schedule,
    Status, TagFilter,
};
