//! Probe contract and registration descriptors

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;

use super::result::ProbeResult;
use super::schedule::Schedule;

/// A pluggable availability check
///
/// `execute` is expected to return quickly. Checks against slow dependencies
/// should probe them in the background and report the latest known state.
/// Returning an error or panicking is a probe fault and is reported as
/// `HEALTH_CHECK_ERROR` by the executor.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn execute(&self) -> anyhow::Result<ProbeResult>;
}

/// How long a non-OK result stays visible after the probe recovers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StickyRetention {
    /// Shown until the window elapses
    For(Duration),
    /// Shown until a newer non-OK result or an explicit reset
    Indefinite,
}

impl StickyRetention {
    /// Whether a sticky value recorded `age` ago is still shown
    pub fn retains(self, age: Duration) -> bool {
        match self {
            StickyRetention::For(window) => age < window,
            StickyRetention::Indefinite => true,
        }
    }
}

/// Identity and execution settings of a probe
///
/// Overrides left unset fall back to the executor-wide defaults when the
/// probe is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDescriptor {
    pub name: String,
    pub tags: BTreeSet<String>,
    pub schedule: Option<Schedule>,
    pub cache_ttl: Option<Duration>,
    pub sticky_retention: Option<StickyRetention>,
    pub timeout: Option<Duration>,
    pub grace_period: Option<Duration>,
}

impl ProbeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeSet::new(),
            schedule: None,
            cache_ttl: None,
            sticky_retention: None,
            timeout: None,
            grace_period: None,
        }
    }

    pub fn with_tags<I>(mut self, tags: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_sticky_retention(mut self, retention: StickyRetention) -> Self {
        self.sticky_retention = Some(retention);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = Some(grace);
        self
    }
}

/// Executor-wide defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// How long a caller waits for an execution
    pub timeout: Duration,
    /// Elapsed execution time after which a timeout is reported as CRITICAL
    pub exceedingly_late_threshold: Duration,
    /// Cache TTL for probes without an override
    pub default_cache_ttl: Duration,
    /// How long TEMPORARILY_UNAVAILABLE is tolerated before escalation
    pub grace_period: Duration,
    /// Whether scheduled probes get background timers
    pub scheduler_enabled: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            exceedingly_late_threshold: Duration::from_millis(300_000),
            default_cache_ttl: Duration::from_millis(2000),
            grace_period: Duration::from_millis(60_000),
            scheduler_enabled: true,
        }
    }
}

/// Settings of one probe after merging its overrides with the defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub cache_ttl: Duration,
    pub timeout: Duration,
    pub grace_period: Duration,
    pub sticky_retention: Option<StickyRetention>,
}

impl ProbeSettings {
    /// Merge a descriptor's overrides over the executor defaults
    ///
    /// Interval-scheduled probes without an explicit TTL keep their result
    /// cached for at least one interval.
    pub fn merge(descriptor: &ProbeDescriptor, defaults: &ExecutorSettings) -> Self {
        let cache_ttl = descriptor.cache_ttl.unwrap_or_else(|| {
            match descriptor.schedule.as_ref().and_then(Schedule::fixed_interval) {
                Some(every) => every.max(defaults.default_cache_ttl),
                None => defaults.default_cache_ttl,
            }
        });

        Self {
            cache_ttl,
            timeout: descriptor.timeout.unwrap_or(defaults.timeout),
            grace_period: descriptor.grace_period.unwrap_or(defaults.grace_period),
            sticky_retention: descriptor.sticky_retention,
        }
    }
}
