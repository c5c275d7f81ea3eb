//! TTL cache of the last computed result per probe

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use super::result::{ExecutionMeta, ProbeResult};

/// A cached raw result together with its execution metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResult {
    pub result: ProbeResult,
    pub meta: ExecutionMeta,
}

#[derive(Debug)]
struct CacheEntry {
    cached: CachedResult,
    expires_at: Instant,
    /// Last result shown for the probe after escalation and stickiness
    effective: Option<ProbeResult>,
}

/// Result cache keyed by probe name
///
/// Entries expire strictly at `computed_at + ttl`. The effective result can be
/// updated without touching that bookkeeping.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valid entry for `name`, if any
    pub fn get(&self, name: &str) -> Option<CachedResult> {
        self.get_at(name, Instant::now())
    }

    /// Valid entry for `name` as of `now`
    pub fn get_at(&self, name: &str, now: Instant) -> Option<CachedResult> {
        self.entries
            .get(name)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.cached.clone())
    }

    /// Store a freshly computed result
    ///
    /// A result computed before the one already stored is ignored.
    pub fn put(&self, name: &str, result: ProbeResult, meta: ExecutionMeta, ttl: Duration) {
        let expires_at = meta.computed_at + ttl;
        let cached = CachedResult { result, meta };

        self.entries
            .entry(name.to_string())
            .and_modify(|entry| {
                if entry.cached.meta.computed_at <= meta.computed_at {
                    entry.cached = cached.clone();
                    entry.expires_at = expires_at;
                }
            })
            .or_insert_with(|| CacheEntry {
                cached: cached.clone(),
                expires_at,
                effective: None,
            });
    }

    /// Remember the result last shown for `name`
    pub fn record_effective(&self, name: &str, effective: ProbeResult) {
        if let Some(mut entry) = self.entries.get_mut(name) {
            entry.effective = Some(effective);
        }
    }

    /// Result last shown for `name`, even if the raw entry expired
    pub fn effective(&self, name: &str) -> Option<ProbeResult> {
        self.entries.get(name).and_then(|e| e.effective.clone())
    }

    /// Expire the entry for `name` without forgetting it
    pub fn invalidate(&self, name: &str) {
        if let Some(mut entry) = self.entries.get_mut(name) {
            entry.expires_at = entry.cached.meta.computed_at;
        }
    }

    /// Drop everything known about `name`
    pub fn remove(&self, name: &str) {
        self.entries.remove(name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
