//! Health check execution engine
//!
//! This module provides:
//! - The [`Probe`] contract and its result types
//! - Cached, single-flight, timeout-bounded probe execution
//! - Sticky results and grace period escalation
//! - Interval and cron scheduling of probes
//! - Tag-filtered, aggregated reports via [`Executor`]

mod adjustable;
mod aggregate;
mod cache;
mod escalation;
mod executor;
mod filter;
mod probe;
mod record;
mod registry;
mod result;
mod runner;
mod schedule;
mod scheduler;
mod sticky;

pub use adjustable::{AdjustableProbe, AdjustableStatus, Adjustment, ADJUSTABLE_STATUS_NAME};
pub use aggregate::{aggregate, aggregate_statuses};
pub use cache::{CachedResult, ResultCache};
pub use escalation::{GracePeriodEscalator, Streak};
pub use executor::{Executor, ProbeSnapshot, Report, ReportEntry, ReportOrder, RunOptions};
pub use filter::{FilterError, TagFilter};
pub use probe::{ExecutorSettings, Probe, ProbeDescriptor, ProbeSettings, StickyRetention};
pub use record::ExecutionRecord;
pub use registry::{RegistrationError, RegistryStats};
pub use result::{
    ExecutionMeta, LogEntry, LogLevel, ProbeResult, ProbeResultBuilder, Status, UnknownStatus,
};
pub use schedule::{parse_duration, Schedule, ScheduleError};
pub use sticky::StickyResultTracker;
