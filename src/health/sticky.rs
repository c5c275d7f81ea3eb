//! Sticky non-OK results
//!
//! A probe configured with a sticky retention keeps reporting its most recent
//! non-OK result for a while after it recovers, so that consumers such as load
//! balancers are not told "healthy" prematurely.

use dashmap::DashMap;
use tokio::time::Instant;

use super::probe::StickyRetention;
use super::result::ProbeResult;

const STICKY_NOTE: &str = "Probe reports OK again, non-OK result retained by sticky retention";

#[derive(Debug, Clone)]
struct StickyEntry {
    result: ProbeResult,
    /// Computation time of the retained result
    recorded_at: Instant,
}

#[derive(Debug, Clone, Default)]
struct StickyState {
    /// Computation time of the newest result seen, kept across resets
    last_observed: Option<Instant>,
    retained: Option<StickyEntry>,
}

/// Most recent non-OK result per probe
#[derive(Debug, Default)]
pub struct StickyResultTracker {
    states: DashMap<String, StickyState>,
}

impl StickyResultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective result for a freshly observed one
    ///
    /// `computed_at` is when `fresh` was computed; it is the timestamp the
    /// retention window is measured from, so applying the same result twice
    /// yields the same outcome. A non-OK result older than the newest one seen
    /// is never retained.
    pub fn apply(
        &self,
        name: &str,
        fresh: &ProbeResult,
        computed_at: Instant,
        retention: StickyRetention,
        now: Instant,
    ) -> ProbeResult {
        let mut state = self.states.entry(name.to_string()).or_default();
        let stale = state.last_observed.is_some_and(|last| computed_at < last);
        if !stale {
            state.last_observed = Some(computed_at);
        }

        if !fresh.is_ok() {
            if !stale {
                state.retained = Some(StickyEntry {
                    result: fresh.clone(),
                    recorded_at: computed_at,
                });
            }
            return fresh.clone();
        }

        let retained = state
            .retained
            .as_ref()
            .filter(|entry| retention.retains(now.saturating_duration_since(entry.recorded_at)))
            .map(|entry| entry.result.clone());

        match retained {
            Some(sticky) => sticky.rewritten(sticky.status(), STICKY_NOTE),
            None => {
                state.retained = None;
                fresh.clone()
            }
        }
    }

    /// Retained result and its computation time, if any
    pub fn get(&self, name: &str) -> Option<(ProbeResult, Instant)> {
        self.states.get(name).and_then(|state| {
            state
                .retained
                .as_ref()
                .map(|entry| (entry.result.clone(), entry.recorded_at))
        })
    }

    /// Forget the retained result for `name`
    ///
    /// The newest computation time is kept, so an older non-OK result arriving
    /// late is not retained again.
    pub fn reset(&self, name: &str) -> bool {
        self.states
            .get_mut(name)
            .and_then(|mut state| state.retained.take())
            .is_some()
    }

    /// Drop everything known about `name`
    pub fn forget(&self, name: &str) {
        self.states.remove(name);
    }
}
