use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;
use crate::health::{
    parse_duration, ExecutorSettings, ProbeDescriptor, Schedule, Status, StickyRetention,
    TagFilter,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Executor-wide defaults
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Periodic report logging
    #[serde(default)]
    pub report: ReportConfig,
    /// Adjustable probes registered at startup
    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
}

impl Config {
    /// Executor settings including the scheduler switch
    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            scheduler_enabled: self.scheduler.enabled,
            ..ExecutorSettings::from(&self.executor)
        }
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "executor.timeout_ms must be positive".to_string(),
            ));
        }
        if self.report.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "report.interval_ms must be positive".to_string(),
            ));
        }
        self.report.filter()?;
        for probe in &self.probes {
            probe.descriptor()?;
        }
        Ok(())
    }
}

// ============================================================================
// Executor Configuration
// ============================================================================

/// Executor-wide timeouts and defaults
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// How long a caller waits for a probe (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Execution time after which a timeout is CRITICAL (milliseconds)
    #[serde(default = "default_exceedingly_late_threshold_ms")]
    pub exceedingly_late_threshold_ms: u64,
    /// Default result cache TTL (milliseconds)
    #[serde(default = "default_result_cache_ttl_ms")]
    pub default_result_cache_ttl_ms: u64,
    /// How long TEMPORARILY_UNAVAILABLE is tolerated (milliseconds)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_exceedingly_late_threshold_ms() -> u64 {
    300_000
}

fn default_result_cache_ttl_ms() -> u64 {
    2000
}

fn default_grace_period_ms() -> u64 {
    60_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            exceedingly_late_threshold_ms: default_exceedingly_late_threshold_ms(),
            default_result_cache_ttl_ms: default_result_cache_ttl_ms(),
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

impl From<&ExecutorConfig> for ExecutorSettings {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            exceedingly_late_threshold: Duration::from_millis(config.exceedingly_late_threshold_ms),
            default_cache_ttl: Duration::from_millis(config.default_result_cache_ttl_ms),
            grace_period: Duration::from_millis(config.grace_period_ms),
            scheduler_enabled: true,
        }
    }
}

// ============================================================================
// Scheduler / Metrics / Report Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Whether scheduled probes get background timers
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
}

fn default_scheduler_enabled() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether the Prometheus endpoint is served
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Listen address of the metrics server
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen_addr() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Interval between logged reports (milliseconds)
    #[serde(default = "default_report_interval_ms")]
    pub interval_ms: u64,
    /// Tag filter of the logged report
    #[serde(default)]
    pub tags: String,
}

fn default_report_interval_ms() -> u64 {
    10_000
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_report_interval_ms(),
            tags: String::new(),
        }
    }
}

impl ReportConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn filter(&self) -> Result<TagFilter, ConfigError> {
        TagFilter::parse(&self.tags)
            .map_err(|e| ConfigError::Invalid(format!("report.tags: {}", e)))
    }
}

// ============================================================================
// Probe Configuration
// ============================================================================

/// An adjustable probe declared in configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Status the probe reports until adjusted
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub message: Option<String>,
    /// Schedule expression, e.g. "every:30s" or "@hourly"
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub grace_period_ms: Option<u64>,
    /// Duration text such as "10s", or "indefinite"
    #[serde(default)]
    pub sticky_retention: Option<String>,
}

impl ProbeConfig {
    pub fn descriptor(&self) -> Result<ProbeDescriptor, ConfigError> {
        let invalid = |what: &str, e: &dyn std::fmt::Display| {
            ConfigError::Invalid(format!("probe {}: {}: {}", self.name, what, e))
        };

        let mut descriptor = ProbeDescriptor::new(self.name.clone()).with_tags(self.tags.iter().cloned());

        if let Some(schedule) = &self.schedule {
            let schedule = Schedule::parse(schedule).map_err(|e| invalid("schedule", &e))?;
            descriptor = descriptor.with_schedule(schedule);
        }
        if let Some(ttl) = self.cache_ttl_ms {
            descriptor = descriptor.with_cache_ttl(Duration::from_millis(ttl));
        }
        if let Some(timeout) = self.timeout_ms {
            descriptor = descriptor.with_timeout(Duration::from_millis(timeout));
        }
        if let Some(grace) = self.grace_period_ms {
            descriptor = descriptor.with_grace_period(Duration::from_millis(grace));
        }
        if let Some(retention) = &self.sticky_retention {
            let retention = if retention.trim().eq_ignore_ascii_case("indefinite") {
                StickyRetention::Indefinite
            } else {
                StickyRetention::For(
                    parse_duration(retention).map_err(|e| invalid("sticky_retention", &e))?,
                )
            };
            descriptor = descriptor.with_sticky_retention(retention);
        }

        Ok(descriptor)
    }

    pub fn message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("Configured status {}", self.status))
    }
}
