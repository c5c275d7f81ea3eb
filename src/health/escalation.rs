//! Grace period escalation of TEMPORARILY_UNAVAILABLE
//!
//! A probe may report TEMPORARILY_UNAVAILABLE while it is expected to recover
//! on its own. If the streak lasts longer than the grace period the status is
//! escalated to CRITICAL. Any other status ends the streak.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use super::result::{ProbeResult, Status};

/// Unbroken run of TEMPORARILY_UNAVAILABLE results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streak {
    /// Computation time of the first result of the run
    pub started_at: Instant,
    /// Computation time of the latest counted result
    pub last_seen: Instant,
    /// Number of distinct results in the run
    pub count: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tracking {
    /// Computation time of the newest result seen, kept across resets
    last_observed: Option<Instant>,
    streak: Option<Streak>,
}

/// Per-probe streak tracking and escalation
#[derive(Debug, Default)]
pub struct GracePeriodEscalator {
    tracking: DashMap<String, Tracking>,
}

impl GracePeriodEscalator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result to show for `result`, computed at `computed_at`
    ///
    /// A result is counted once per computation time, so re-applying a cached
    /// result does not lengthen the streak. Results older than the newest one
    /// seen are passed through without touching the streak.
    pub fn apply(
        &self,
        name: &str,
        result: &ProbeResult,
        computed_at: Instant,
        grace: Duration,
    ) -> ProbeResult {
        let streak = {
            let mut tracking = self.tracking.entry(name.to_string()).or_default();
            if tracking.last_observed.is_some_and(|last| computed_at < last) {
                return result.clone();
            }
            tracking.last_observed = Some(computed_at);

            if result.status() != Status::TemporarilyUnavailable {
                tracking.streak = None;
                return result.clone();
            }

            let streak = tracking.streak.get_or_insert(Streak {
                started_at: computed_at,
                last_seen: computed_at,
                count: 1,
            });
            if computed_at > streak.last_seen {
                streak.count += 1;
                streak.last_seen = computed_at;
            }
            *streak
        };

        let elapsed = computed_at.saturating_duration_since(streak.started_at);
        if elapsed < grace {
            return result.clone();
        }

        debug!(
            probe = %name,
            elapsed_ms = elapsed.as_millis() as u64,
            grace_ms = grace.as_millis() as u64,
            "Escalating TEMPORARILY_UNAVAILABLE to CRITICAL"
        );
        result.rewritten(
            Status::Critical,
            format!(
                "{} persisted for {}s, exceeding the grace period of {}s; escalated to {}",
                Status::TemporarilyUnavailable,
                elapsed.as_secs(),
                grace.as_secs(),
                Status::Critical
            ),
        )
    }

    /// Current streak of `name`, if it is TEMPORARILY_UNAVAILABLE
    pub fn streak(&self, name: &str) -> Option<Streak> {
        self.tracking.get(name).and_then(|t| t.streak)
    }

    /// End the streak of `name`
    ///
    /// The newest computation time is kept, so an older result arriving late
    /// cannot start a new streak.
    pub fn reset(&self, name: &str) -> bool {
        self.tracking
            .get_mut(name)
            .and_then(|mut t| t.streak.take())
            .is_some()
    }

    /// Drop everything known about `name`
    pub fn forget(&self, name: &str) {
        self.tracking.remove(name);
    }
}
