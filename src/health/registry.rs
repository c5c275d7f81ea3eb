//! Registry of live probes
//!
//! Probes are keyed by name and remember their registration order, which is
//! the default order of every report. Each entry owns the probe's execution
//! record and in-flight slot, so unregistering drops all of it at once.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::filter::{is_valid_tag, TagFilter};
use super::probe::{ExecutorSettings, Probe, ProbeDescriptor, ProbeSettings};
use super::record::ExecutionRecord;
use super::result::Status;
use super::runner::InFlight;
use super::schedule::ScheduleError;

/// Error rejecting a registration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("Probe name must not be empty")]
    EmptyName,
    #[error("Probe already registered: {0}")]
    DuplicateName(String),
    #[error("Invalid tag '{tag}' on probe {name}")]
    InvalidTag { name: String, tag: String },
    #[error("Invalid schedule for probe {name}: {source}")]
    InvalidSchedule {
        name: String,
        #[source]
        source: ScheduleError,
    },
    #[error("Probe not registered: {0}")]
    NotRegistered(String),
}

/// A registered probe and its mutable state
pub(crate) struct ProbeHandle {
    pub(crate) name: String,
    /// Registration order
    pub(crate) seq: u64,
    pub(crate) settings: ProbeSettings,
    pub(crate) probe: Arc<dyn Probe>,
    pub(crate) record: RwLock<ExecutionRecord>,
    pub(crate) inflight: Mutex<Option<InFlight>>,
    descriptor: RwLock<Arc<ProbeDescriptor>>,
    retired: AtomicBool,
}

impl ProbeHandle {
    pub(crate) fn descriptor(&self) -> Arc<ProbeDescriptor> {
        self.descriptor.read().clone()
    }

    pub(crate) fn replace_descriptor(&self, descriptor: ProbeDescriptor) {
        *self.descriptor.write() = Arc::new(descriptor);
    }

    /// Whether an execution is currently in flight
    pub(crate) fn is_running(&self) -> bool {
        self.inflight.lock().is_some()
    }

    /// Whether the probe has been unregistered
    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for ProbeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeHandle")
            .field("name", &self.name)
            .field("seq", &self.seq)
            .field("settings", &self.settings)
            .field("retired", &self.is_retired())
            .finish()
    }
}

/// Registry of probes keyed by name
pub(crate) struct ProbeRegistry {
    probes: DashMap<String, Arc<ProbeHandle>>,
    next_seq: AtomicU64,
    defaults: ExecutorSettings,
}

impl ProbeRegistry {
    pub(crate) fn new(defaults: ExecutorSettings) -> Self {
        Self {
            probes: DashMap::new(),
            next_seq: AtomicU64::new(0),
            defaults,
        }
    }

    /// Validate and add a probe
    pub(crate) fn register(
        &self,
        descriptor: ProbeDescriptor,
        probe: Arc<dyn Probe>,
    ) -> Result<Arc<ProbeHandle>, RegistrationError> {
        Self::validate(&descriptor)?;

        match self.probes.entry(descriptor.name.clone()) {
            Entry::Occupied(_) => Err(RegistrationError::DuplicateName(descriptor.name)),
            Entry::Vacant(vacant) => {
                let settings = ProbeSettings::merge(&descriptor, &self.defaults);
                let handle = Arc::new(ProbeHandle {
                    name: descriptor.name.clone(),
                    seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    settings,
                    probe,
                    record: RwLock::new(ExecutionRecord::new()),
                    inflight: Mutex::new(None),
                    descriptor: RwLock::new(Arc::new(descriptor)),
                    retired: AtomicBool::new(false),
                });
                vacant.insert(handle.clone());
                info!(
                    probe = %handle.name,
                    seq = handle.seq,
                    cache_ttl_ms = settings.cache_ttl.as_millis() as u64,
                    timeout_ms = settings.timeout.as_millis() as u64,
                    "Registered probe"
                );
                Ok(handle)
            }
        }
    }

    fn validate(descriptor: &ProbeDescriptor) -> Result<(), RegistrationError> {
        if descriptor.name.trim().is_empty() {
            return Err(RegistrationError::EmptyName);
        }
        if let Some(tag) = descriptor.tags.iter().find(|t| !is_valid_tag(t)) {
            return Err(RegistrationError::InvalidTag {
                name: descriptor.name.clone(),
                tag: tag.clone(),
            });
        }
        if let Some(schedule) = &descriptor.schedule {
            schedule
                .validate()
                .map_err(|source| RegistrationError::InvalidSchedule {
                    name: descriptor.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Remove a probe, marking its handle retired
    pub(crate) fn unregister(&self, name: &str) -> Option<Arc<ProbeHandle>> {
        let (_, handle) = self.probes.remove(name)?;
        handle.retire();
        debug!(probe = %name, "Probe removed from registry");
        Some(handle)
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<ProbeHandle>> {
        self.probes.get(name).map(|r| r.value().clone())
    }

    /// Probes matching `filter`, in registration order
    pub(crate) fn select(&self, filter: &TagFilter) -> Vec<Arc<ProbeHandle>> {
        let mut selected: Vec<Arc<ProbeHandle>> = self
            .probes
            .iter()
            .filter(|entry| filter.matches(&entry.value().descriptor().tags))
            .map(|entry| entry.value().clone())
            .collect();
        selected.sort_by_key(|handle| handle.seq);
        selected
    }

    /// All probes in registration order
    pub(crate) fn all(&self) -> Vec<Arc<ProbeHandle>> {
        self.select(&TagFilter::all())
    }

    pub(crate) fn len(&self) -> usize {
        self.probes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Counts of probes by their latest shown status
    pub(crate) fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.probes.len(),
            ..RegistryStats::default()
        };

        for entry in self.probes.iter() {
            match entry.value().record.read().status() {
                Some(Status::Ok) => stats.ok += 1,
                Some(Status::Warn) => stats.warn += 1,
                Some(Status::TemporarilyUnavailable) => stats.temporarily_unavailable += 1,
                Some(Status::Critical) => stats.critical += 1,
                Some(Status::HealthCheckError) => stats.health_check_error += 1,
                None => stats.never_executed += 1,
            }
        }

        stats
    }
}

/// Counts of registered probes by latest status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total: usize,
    pub ok: usize,
    pub warn: usize,
    pub temporarily_unavailable: usize,
    pub critical: usize,
    pub health_check_error: usize,
    pub never_executed: usize,
}
