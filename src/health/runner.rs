//! Single-flight probe execution
//!
//! Every real execution of a probe, whether requested by a caller or fired by
//! the scheduler, goes through [`ProbeRunner::start_or_join`]. At most one
//! execution per probe is in flight; later requests join it. The execution is
//! driven by its own task, so callers that stop waiting (timeouts) do not
//! cancel it, and its result still lands in the cache and the record.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cache::{CachedResult, ResultCache};
use super::escalation::GracePeriodEscalator;
use super::registry::ProbeHandle;
use super::result::{ExecutionMeta, ProbeResult, Status};
use super::sticky::StickyResultTracker;
use crate::metrics::{metrics, FAULT_ERROR, FAULT_PANIC};

/// An execution in progress, shared by everyone waiting for it
#[derive(Clone)]
pub(crate) struct InFlight {
    id: u64,
    pub(crate) started_at: Instant,
    pub(crate) outcome: Shared<BoxFuture<'static, CachedResult>>,
}

/// Shared execution state: cache, sticky results and escalation streaks
pub(crate) struct ProbeRunner {
    pub(crate) cache: ResultCache,
    pub(crate) sticky: StickyResultTracker,
    pub(crate) escalator: GracePeriodEscalator,
    exceedingly_late_threshold: Duration,
    next_execution: AtomicU64,
}

impl ProbeRunner {
    pub(crate) fn new(exceedingly_late_threshold: Duration) -> Self {
        Self {
            cache: ResultCache::new(),
            sticky: StickyResultTracker::new(),
            escalator: GracePeriodEscalator::new(),
            exceedingly_late_threshold,
            next_execution: AtomicU64::new(0),
        }
    }

    /// Join the in-flight execution of `handle`, or start one
    ///
    /// Returns the execution and whether this call started it.
    pub(crate) fn start_or_join(self: &Arc<Self>, handle: &Arc<ProbeHandle>) -> (InFlight, bool) {
        let mut slot = handle.inflight.lock();
        if let Some(inflight) = slot.as_ref() {
            debug!(probe = %handle.name, "Joining in-flight execution");
            return (inflight.clone(), false);
        }

        let id = self.next_execution.fetch_add(1, Ordering::SeqCst);
        let started_at = Instant::now();
        let outcome = self
            .clone()
            .execute(handle.clone(), id, started_at)
            .boxed()
            .shared();
        let inflight = InFlight {
            id,
            started_at,
            outcome: outcome.clone(),
        };
        *slot = Some(inflight.clone());
        drop(slot);

        // Drive the execution even if every waiter gives up
        tokio::spawn(outcome);
        debug!(probe = %handle.name, execution = id, "Started execution");
        (inflight, true)
    }

    /// Execute `handle` (or join its execution) and wait at most `timeout`
    ///
    /// On timeout a WARN result is synthesized, or CRITICAL if the execution
    /// has been running longer than the exceedingly-late threshold.
    pub(crate) async fn run_bounded(
        self: &Arc<Self>,
        handle: &Arc<ProbeHandle>,
        timeout: Duration,
    ) -> CachedResult {
        let (inflight, _) = self.start_or_join(handle);
        match tokio::time::timeout(timeout, inflight.outcome.clone()).await {
            Ok(done) => done,
            Err(_) => self.timeout_fallback(handle, &inflight, timeout),
        }
    }

    fn timeout_fallback(&self, handle: &ProbeHandle, inflight: &InFlight, waited: Duration) -> CachedResult {
        let now = Instant::now();
        let running_for = now.saturating_duration_since(inflight.started_at);

        let result = if running_for > self.exceedingly_late_threshold {
            warn!(
                probe = %handle.name,
                running_ms = running_for.as_millis() as u64,
                threshold_ms = self.exceedingly_late_threshold.as_millis() as u64,
                "Probe exceedingly late"
            );
            metrics().record_timeout(&handle.name, Status::Critical);
            ProbeResult::critical(format!(
                "Probe still running after {}ms, exceeding the late threshold of {}ms",
                running_for.as_millis(),
                self.exceedingly_late_threshold.as_millis()
            ))
        } else {
            warn!(
                probe = %handle.name,
                waited_ms = waited.as_millis() as u64,
                running_ms = running_for.as_millis() as u64,
                "Probe timed out, still running"
            );
            metrics().record_timeout(&handle.name, Status::Warn);
            ProbeResult::warn(format!(
                "Timeout: probe still running after {}ms (waited {}ms)",
                running_for.as_millis(),
                waited.as_millis()
            ))
        };

        CachedResult {
            result,
            meta: ExecutionMeta {
                computed_at: now,
                duration: running_for,
                timed_out: true,
            },
        }
    }

    async fn execute(self: Arc<Self>, handle: Arc<ProbeHandle>, id: u64, started_at: Instant) -> CachedResult {
        let probe = handle.probe.clone();
        let outcome = tokio::spawn(async move { probe.execute().await }).await;
        let duration = started_at.elapsed();

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(probe = %handle.name, error = %e, "Probe failed");
                metrics().record_fault(&handle.name, FAULT_ERROR);
                ProbeResult::fault(format!("Probe failed: {:#}", e))
            }
            Err(e) => {
                let description = describe_join_error(e);
                warn!(probe = %handle.name, error = %description, "Probe panicked");
                metrics().record_fault(&handle.name, FAULT_PANIC);
                ProbeResult::fault(format!("Probe panicked: {}", description))
            }
        };

        let cached = CachedResult {
            result,
            meta: ExecutionMeta {
                computed_at: Instant::now(),
                duration,
                timed_out: false,
            },
        };
        self.complete(&handle, id, &cached);
        cached
    }

    fn complete(&self, handle: &ProbeHandle, id: u64, cached: &CachedResult) {
        debug!(
            probe = %handle.name,
            execution = id,
            status = %cached.result.status(),
            duration_ms = cached.meta.duration.as_millis() as u64,
            "Execution finished"
        );
        metrics().record_execution(&handle.name, cached.result.status(), cached.meta.duration);

        if !handle.is_retired() {
            self.cache.put(
                &handle.name,
                cached.result.clone(),
                cached.meta,
                handle.settings.cache_ttl,
            );
            handle.record.write().record_execution(cached.meta.duration);
            self.apply_policy(handle, &cached.result, &cached.meta, Instant::now());
        }

        let mut slot = handle.inflight.lock();
        if slot.as_ref().is_some_and(|inflight| inflight.id == id) {
            *slot = None;
        }
    }

    /// Escalate, apply stickiness, and record the effective result
    pub(crate) fn apply_policy(
        &self,
        handle: &ProbeHandle,
        raw: &ProbeResult,
        meta: &ExecutionMeta,
        now: Instant,
    ) -> ProbeResult {
        let name = handle.name.as_str();
        let settings = handle.settings;

        // A timeout fallback says nothing about the probe's own status
        let escalated = if meta.timed_out {
            raw.clone()
        } else {
            self.escalator
                .apply(name, raw, meta.computed_at, settings.grace_period)
        };
        let effective = match settings.sticky_retention {
            Some(retention) => self
                .sticky
                .apply(name, &escalated, meta.computed_at, retention, now),
            None => escalated,
        };

        // A late caller may race unregistration; leave no state behind
        if handle.is_retired() {
            self.forget(name);
            return effective;
        }

        let streak = self.escalator.streak(name);
        let changed = handle.record.write().observe(&effective, meta, streak);
        if changed {
            if raw.status() == Status::TemporarilyUnavailable && effective.status() == Status::Critical {
                metrics().record_escalation(name);
            }
            info!(
                probe = %name,
                status = %effective.status(),
                timed_out = meta.timed_out,
                "Probe status changed"
            );
            metrics().set_probe_status(name, effective.status());
        }
        self.cache.record_effective(name, effective.clone());
        effective
    }

    /// Clear sticky and escalation state of `name`
    pub(crate) fn reset(&self, name: &str) {
        self.sticky.reset(name);
        self.escalator.reset(name);
    }

    /// Drop all shared state of `name`
    pub(crate) fn forget(&self, name: &str) {
        self.sticky.forget(name);
        self.escalator.forget(name);
        self.cache.remove(name);
    }
}

fn describe_join_error(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload: Box<dyn Any + Send> = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
