//! Operator-adjustable status
//!
//! [`AdjustableProbe`] reports whatever result was last injected into it.
//! [`AdjustableStatus`] registers one under arbitrary tags so an operator can
//! force WARN, CRITICAL or TEMPORARILY_UNAVAILABLE into any tag selection, for
//! example to drain a node from a load balancer.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use super::executor::Executor;
use super::probe::{Probe, ProbeDescriptor};
use super::registry::RegistrationError;
use super::result::{ProbeResult, Status};

/// Name under which [`AdjustableStatus`] registers its probe
pub const ADJUSTABLE_STATUS_NAME: &str = "adjustable-status";

/// Probe returning an injected result, OK when nothing is injected
#[derive(Debug, Default)]
pub struct AdjustableProbe {
    injected: RwLock<Option<ProbeResult>>,
}

impl AdjustableProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe starting out with `status`
    pub fn with_status(status: Status, message: impl Into<String>) -> Self {
        let probe = Self::new();
        probe.set(status, message);
        probe
    }

    pub fn set(&self, status: Status, message: impl Into<String>) {
        self.set_result(ProbeResult::with_status(status, message));
    }

    pub fn set_result(&self, result: ProbeResult) {
        *self.injected.write() = Some(result);
    }

    pub fn clear(&self) {
        *self.injected.write() = None;
    }

    pub fn current(&self) -> Option<ProbeResult> {
        self.injected.read().clone()
    }
}

#[async_trait]
impl Probe for AdjustableProbe {
    async fn execute(&self) -> anyhow::Result<ProbeResult> {
        Ok(self
            .current()
            .unwrap_or_else(|| ProbeResult::ok("No status adjustment in effect")))
    }
}

/// Active adjustment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    pub status: Status,
    pub tags: BTreeSet<String>,
}

/// Injects synthetic results for arbitrary tags into an executor
pub struct AdjustableStatus {
    executor: Arc<Executor>,
    probe: Arc<AdjustableProbe>,
    active: Mutex<Option<Adjustment>>,
}

impl AdjustableStatus {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self {
            executor,
            probe: Arc::new(AdjustableProbe::new()),
            active: Mutex::new(None),
        }
    }

    pub fn add_warn_for_tags<I, S>(&self, tags: I) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.adjust(Status::Warn, tags)
    }

    pub fn add_critical_for_tags<I, S>(&self, tags: I) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.adjust(Status::Critical, tags)
    }

    pub fn add_temporarily_unavailable_for_tags<I, S>(&self, tags: I) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.adjust(Status::TemporarilyUnavailable, tags)
    }

    /// Replace any active adjustment with `status` for `tags`
    ///
    /// On failure the previous adjustment, if any, stays in effect.
    fn adjust<I, S>(&self, status: Status, tags: I) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        let mut active = self.active.lock();

        let previous = active.take();
        let previous_result = self.probe.current();
        if previous.is_some() {
            self.executor.unregister(ADJUSTABLE_STATUS_NAME);
        }

        self.probe.set(
            status,
            format!(
                "Status adjusted to {} for tags [{}]",
                status,
                tags.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
        );
        if let Err(e) = self.executor.register(Self::descriptor(&tags), self.probe.clone()) {
            match previous_result {
                Some(result) => self.probe.set_result(result),
                None => self.probe.clear(),
            }
            if let Some(previous) = previous {
                match self
                    .executor
                    .register(Self::descriptor(&previous.tags), self.probe.clone())
                {
                    Ok(()) => *active = Some(previous),
                    Err(restore) => {
                        self.probe.clear();
                        warn!(error = %restore, "Failed to restore previous status adjustment");
                    }
                }
            }
            return Err(e);
        }

        info!(status = %status, tags = ?tags, "Status adjustment in effect");
        *active = Some(Adjustment { status, tags });
        Ok(())
    }

    fn descriptor(tags: &BTreeSet<String>) -> ProbeDescriptor {
        ProbeDescriptor::new(ADJUSTABLE_STATUS_NAME)
            .with_tags(tags.iter().cloned())
            .with_cache_ttl(Duration::ZERO)
    }

    /// Remove the active adjustment
    pub fn reset(&self) -> bool {
        let mut active = self.active.lock();
        self.probe.clear();
        match active.take() {
            Some(adjustment) => {
                self.executor.unregister(ADJUSTABLE_STATUS_NAME);
                info!(status = %adjustment.status, "Status adjustment removed");
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> Option<Adjustment> {
        self.active.lock().clone()
    }
}
