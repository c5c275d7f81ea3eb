//! Per-probe execution bookkeeping
//!
//! An [`ExecutionRecord`] lives exactly as long as its probe is registered and
//! reflects the latest effective result together with the streak and
//! non-OK timestamps used for display.

use std::time::Duration;

use tokio::time::Instant;

use super::escalation::Streak;
use super::result::{ExecutionMeta, ProbeResult, Status};

/// Execution state of a single probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRecord {
    /// Latest effective result (after escalation and stickiness)
    pub last_result: Option<ProbeResult>,
    /// When the latest result was computed
    pub computed_at: Option<Instant>,
    /// Computation time of the oldest result of the current non-OK run
    pub non_ok_since: Option<Instant>,
    /// Consecutive TEMPORARILY_UNAVAILABLE results
    pub unavailable_count: u32,
    /// When the TEMPORARILY_UNAVAILABLE run began
    pub unavailable_since: Option<Instant>,
    /// Real executions completed since registration
    pub execution_count: u64,
    /// Duration of the latest real execution
    pub last_duration: Option<Duration>,
    /// Whether the latest observation was a timeout fallback
    pub last_timed_out: bool,
}

impl ExecutionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of the latest effective result
    pub fn status(&self) -> Option<Status> {
        self.last_result.as_ref().map(ProbeResult::status)
    }

    /// Record an effective result
    ///
    /// Observations older than the current one are ignored. Returns true if the
    /// shown status changed.
    pub fn observe(
        &mut self,
        effective: &ProbeResult,
        meta: &ExecutionMeta,
        streak: Option<Streak>,
    ) -> bool {
        if self.computed_at.is_some_and(|current| meta.computed_at < current) {
            return false;
        }

        let old_status = self.status();

        if effective.is_ok() {
            self.non_ok_since = None;
        } else if self.non_ok_since.is_none() {
            self.non_ok_since = Some(meta.computed_at);
        }

        match streak {
            Some(streak) => {
                self.unavailable_count = streak.count;
                self.unavailable_since = Some(streak.started_at);
            }
            None => {
                self.unavailable_count = 0;
                self.unavailable_since = None;
            }
        }

        self.last_result = Some(effective.clone());
        self.computed_at = Some(meta.computed_at);
        self.last_timed_out = meta.timed_out;

        old_status != self.status()
    }

    /// Count a completed real execution
    pub fn record_execution(&mut self, duration: Duration) {
        self.execution_count += 1;
        self.last_duration = Some(duration);
    }

    /// Clear streak and non-OK bookkeeping
    pub fn reset_tracking(&mut self) {
        self.non_ok_since = None;
        self.unavailable_count = 0;
        self.unavailable_since = None;
    }

    /// Time since the latest result was computed
    pub fn time_since_computed(&self) -> Option<Duration> {
        self.computed_at.map(|t| t.elapsed())
    }
}
