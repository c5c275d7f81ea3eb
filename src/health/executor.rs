//! Top-level probe orchestration
//!
//! [`Executor::run`] selects probes by tag filter, evaluates them in parallel
//! and aggregates the results:
//!
//! 1. A valid cache entry is used as the raw result, otherwise the probe is
//!    executed (or its in-flight execution joined), bounded by a timeout.
//! 2. A timeout yields WARN, or CRITICAL once the execution is exceedingly late.
//! 3. The grace period escalator, then the sticky tracker, produce the
//!    effective result, which is recorded.
//! 4. The worst effective status is the overall status.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info};

use super::aggregate::aggregate;
use super::filter::{FilterError, TagFilter};
use super::probe::{ExecutorSettings, Probe, ProbeDescriptor};
use super::record::ExecutionRecord;
use super::registry::{ProbeHandle, ProbeRegistry, RegistrationError, RegistryStats};
use super::result::{ExecutionMeta, ProbeResult, Status};
use super::runner::ProbeRunner;
use super::schedule::Schedule;
use super::scheduler::Scheduler;
use crate::metrics::metrics;

// ============================================================================
// Report
// ============================================================================

/// Result of one probe within a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub descriptor: Arc<ProbeDescriptor>,
    /// Effective result after escalation and stickiness
    pub result: ProbeResult,
    pub meta: ExecutionMeta,
}

impl ReportEntry {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn status(&self) -> Status {
        self.result.status()
    }
}

/// Aggregated outcome of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    status: Status,
    entries: Vec<ReportEntry>,
}

impl Report {
    pub fn new(entries: Vec<ReportEntry>) -> Self {
        let status = aggregate(entries.iter().map(|e| &e.result));
        Self { status, entries }
    }

    /// Worst status among the entries, OK when empty
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ReportEntry> {
        self.entries
    }

    pub fn get(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sub-report of the entries matching `filter`, re-aggregated
    pub fn select(&self, filter: &TagFilter) -> Report {
        Report::new(
            self.entries
                .iter()
                .filter(|e| filter.matches(&e.descriptor.tags))
                .cloned()
                .collect(),
        )
    }
}

/// Order of report entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportOrder {
    /// Registration order
    #[default]
    Registration,
    /// Probe name, ascending
    Name,
    /// Worst status first, ties in registration order
    Severity,
}

/// Per-run options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Overrides every probe's own timeout
    pub timeout: Option<Duration>,
    pub order: ReportOrder,
    /// Skip the cache lookup; an in-flight execution is still joined
    pub force_instant: bool,
}

impl RunOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_order(mut self, order: ReportOrder) -> Self {
        self.order = order;
        self
    }

    pub fn force_instant(mut self) -> Self {
        self.force_instant = true;
        self
    }
}

/// Read-only view of a registered probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSnapshot {
    pub descriptor: Arc<ProbeDescriptor>,
    pub record: ExecutionRecord,
    pub running: bool,
    pub scheduled: bool,
}

// ============================================================================
// Executor
// ============================================================================

/// Registers probes and evaluates them on request
///
/// Must be created within a tokio runtime if scheduled probes are registered.
/// Dropping the executor cancels every timer task.
pub struct Executor {
    settings: ExecutorSettings,
    registry: ProbeRegistry,
    runner: Arc<ProbeRunner>,
    scheduler: Scheduler,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutorSettings::default())
    }
}

impl Executor {
    pub fn new(settings: ExecutorSettings) -> Self {
        let runner = Arc::new(ProbeRunner::new(settings.exceedingly_late_threshold));
        let scheduler = Scheduler::new(runner.clone(), settings.scheduler_enabled);
        info!(
            timeout_ms = settings.timeout.as_millis() as u64,
            cache_ttl_ms = settings.default_cache_ttl.as_millis() as u64,
            grace_period_ms = settings.grace_period.as_millis() as u64,
            "Executor created"
        );
        Self {
            registry: ProbeRegistry::new(settings.clone()),
            settings,
            runner,
            scheduler,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Register a probe, starting its timer if it has a schedule
    pub fn register(
        &self,
        descriptor: ProbeDescriptor,
        probe: Arc<dyn Probe>,
    ) -> Result<(), RegistrationError> {
        let handle = self.registry.register(descriptor, probe)?;
        self.scheduler.schedule(&handle);
        metrics().set_registered(self.registry.len());
        Ok(())
    }

    /// Unregister a probe, discarding its record, cache entry and timer
    ///
    /// An execution in flight runs to completion but its result is dropped.
    pub fn unregister(&self, name: &str) -> bool {
        self.scheduler.unschedule(name);
        let Some(handle) = self.registry.unregister(name) else {
            return false;
        };
        self.runner.forget(&handle.name);
        metrics().remove_series(name);
        metrics().set_registered(self.registry.len());
        info!(probe = %name, "Unregistered probe");
        true
    }

    /// Evaluate the probes matching a textual tag filter
    pub async fn run(&self, tags: &str, timeout: Option<Duration>) -> Result<Report, FilterError> {
        let filter = TagFilter::parse(tags)?;
        let options = RunOptions {
            timeout,
            ..RunOptions::default()
        };
        Ok(self.run_with(&filter, options).await)
    }

    /// Evaluate every registered probe
    pub async fn run_all(&self) -> Report {
        self.run_with(&TagFilter::all(), RunOptions::default()).await
    }

    /// Evaluate the probes matching `filter`
    pub async fn run_with(&self, filter: &TagFilter, options: RunOptions) -> Report {
        let handles = self.registry.select(filter);
        debug!(filter = %filter, probes = handles.len(), "Running probes");

        let mut entries = join_all(handles.iter().map(|h| self.evaluate(h, &options))).await;
        match options.order {
            ReportOrder::Registration => {}
            ReportOrder::Name => entries.sort_by(|a, b| a.name().cmp(b.name())),
            ReportOrder::Severity => entries.sort_by(|a, b| b.status().cmp(&a.status())),
        }

        let report = Report::new(entries);
        metrics().record_run(report.status());
        report
    }

    async fn evaluate(&self, handle: &Arc<ProbeHandle>, options: &RunOptions) -> ReportEntry {
        let cached = if options.force_instant {
            None
        } else {
            self.runner.cache.get(&handle.name)
        };

        let cached = match cached {
            Some(cached) => {
                metrics().record_cache_lookup(true);
                cached
            }
            None => {
                metrics().record_cache_lookup(false);
                let timeout = options.timeout.unwrap_or(handle.settings.timeout);
                self.runner.run_bounded(handle, timeout).await
            }
        };

        let result = self
            .runner
            .apply_policy(handle, &cached.result, &cached.meta, Instant::now());
        ReportEntry {
            descriptor: handle.descriptor(),
            result,
            meta: cached.meta,
        }
    }

    /// Clear sticky, escalation and record tracking of `name` and expire its
    /// cache entry
    pub fn reset(&self, name: &str) -> bool {
        let Some(handle) = self.registry.get(name) else {
            return false;
        };
        self.runner.reset(name);
        self.runner.cache.invalidate(name);
        handle.record.write().reset_tracking();
        info!(probe = %name, "Probe state reset");
        true
    }

    /// Replace the schedule of `name`, restarting its timer
    pub fn reschedule(&self, name: &str, schedule: Option<Schedule>) -> Result<(), RegistrationError> {
        let handle = self
            .registry
            .get(name)
            .ok_or_else(|| RegistrationError::NotRegistered(name.to_string()))?;

        if let Some(schedule) = &schedule {
            schedule
                .validate()
                .map_err(|source| RegistrationError::InvalidSchedule {
                    name: name.to_string(),
                    source,
                })?;
        }

        let mut descriptor = (*handle.descriptor()).clone();
        descriptor.schedule = schedule;
        handle.replace_descriptor(descriptor);
        self.scheduler.schedule(&handle);
        info!(probe = %name, scheduled = self.scheduler.is_scheduled(name), "Probe rescheduled");
        Ok(())
    }

    pub fn descriptor(&self, name: &str) -> Option<Arc<ProbeDescriptor>> {
        self.registry.get(name).map(|h| h.descriptor())
    }

    /// Execution record of `name`
    pub fn record(&self, name: &str) -> Option<ExecutionRecord> {
        self.registry.get(name).map(|h| h.record.read().clone())
    }

    /// Snapshots of every probe in registration order
    pub fn records(&self) -> Vec<ProbeSnapshot> {
        self.registry
            .all()
            .into_iter()
            .map(|handle| ProbeSnapshot {
                descriptor: handle.descriptor(),
                record: handle.record.read().clone(),
                running: handle.is_running(),
                scheduled: self.scheduler.is_scheduled(&handle.name),
            })
            .collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Number of probes with a running timer
    pub fn scheduled(&self) -> usize {
        self.scheduler.len()
    }

    /// Cancel every timer task
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}
