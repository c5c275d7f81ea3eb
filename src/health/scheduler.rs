//! Background execution of scheduled probes
//!
//! Each scheduled probe gets its own long-running task. Ticks start an
//! execution through the shared runner and never wait for it; a tick that finds
//! an execution already in flight is skipped.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng as _;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::ProbeHandle;
use super::runner::ProbeRunner;
use super::schedule::Schedule;
use crate::metrics::{metrics, TICK_SKIPPED, TICK_STARTED};

/// Timer tasks of scheduled probes, keyed by probe name
pub(crate) struct Scheduler {
    runner: Arc<ProbeRunner>,
    /// Cancellation tokens for timer tasks (name -> token)
    tasks: DashMap<String, CancellationToken>,
    /// Parent of every task token
    shutdown: CancellationToken,
    enabled: bool,
}

impl Scheduler {
    pub(crate) fn new(runner: Arc<ProbeRunner>, enabled: bool) -> Self {
        if !enabled {
            info!("Scheduler is disabled");
        }
        Self {
            runner,
            tasks: DashMap::new(),
            shutdown: CancellationToken::new(),
            enabled,
        }
    }

    /// Start the timer task of `handle`, replacing any previous one
    ///
    /// Does nothing if the probe has no schedule, the scheduler is disabled or
    /// has been shut down.
    pub(crate) fn schedule(&self, handle: &Arc<ProbeHandle>) {
        self.unschedule(&handle.name);

        let Some(schedule) = handle.descriptor().schedule.clone() else {
            return;
        };
        if !self.enabled || self.shutdown.is_cancelled() {
            return;
        }

        let cancel_token = self.shutdown.child_token();
        self.tasks.insert(handle.name.clone(), cancel_token.clone());

        let runner = self.runner.clone();
        let handle = handle.clone();
        info!(probe = %handle.name, schedule = %schedule, "Scheduling probe");

        match schedule {
            Schedule::Interval(every) => {
                tokio::spawn(run_interval(runner, handle, every, cancel_token));
            }
            Schedule::Cron(_) => {
                tokio::spawn(run_cron(runner, handle, schedule, cancel_token));
            }
        }
    }

    /// Cancel the timer task of `name`
    pub(crate) fn unschedule(&self, name: &str) -> bool {
        match self.tasks.remove(name) {
            Some((_, token)) => {
                token.cancel();
                debug!(probe = %name, "Timer task cancelled");
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_scheduled(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel every timer task; later `schedule` calls are ignored
    pub(crate) fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        let cancelled = self.tasks.len();
        self.tasks.clear();
        info!(tasks = cancelled, "Scheduler shut down");
    }
}

async fn run_interval(
    runner: Arc<ProbeRunner>,
    handle: Arc<ProbeHandle>,
    every: Duration,
    cancel_token: CancellationToken,
) {
    // Random initial delay to stagger probes (0-100% of interval)
    let span_ms = (every.as_millis() as u64).max(1);
    let initial_delay = Duration::from_millis(rand::thread_rng().gen_range(0..span_ms));

    let mut ticker = tokio::time::interval_at(Instant::now() + initial_delay, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!(probe = %handle.name, "Timer task stopped");
                break;
            }
            _ = ticker.tick() => {
                if !tick(&runner, &handle) {
                    break;
                }
            }
        }
    }
}

async fn run_cron(
    runner: Arc<ProbeRunner>,
    handle: Arc<ProbeHandle>,
    schedule: Schedule,
    cancel_token: CancellationToken,
) {
    loop {
        let Some(delay) = schedule.next_cron_delay() else {
            info!(probe = %handle.name, schedule = %schedule, "No upcoming fire time, timer task stopped");
            break;
        };

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!(probe = %handle.name, "Timer task stopped");
                break;
            }
            _ = tokio::time::sleep(delay) => {
                if !tick(&runner, &handle) {
                    break;
                }
            }
        }
    }
}

/// Fire one tick; returns false once the probe is gone
fn tick(runner: &Arc<ProbeRunner>, handle: &Arc<ProbeHandle>) -> bool {
    if handle.is_retired() {
        return false;
    }

    let (_, started) = runner.start_or_join(handle);
    if started {
        metrics().record_tick(&handle.name, TICK_STARTED);
    } else {
        warn!(probe = %handle.name, "Previous execution still running, tick skipped");
        metrics().record_tick(&handle.name, TICK_SKIPPED);
    }
    true
}
