//! Status, log entries and probe results
//!
//! A [`ProbeResult`] is the immutable outcome of one probe execution: an
//! ordered list of [`LogEntry`] lines plus the overall [`Status`], which is
//! the worst level among the entries unless explicitly rewritten.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Severity of a probe result, ordered from best to worst
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum Status {
    /// Everything is fine
    #[default]
    Ok,
    /// Degraded but functional
    Warn,
    /// Not functional, expected to self-heal
    TemporarilyUnavailable,
    /// Not functional
    Critical,
    /// The probe itself faulted
    HealthCheckError,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Ok,
        Status::Warn,
        Status::TemporarilyUnavailable,
        Status::Critical,
        Status::HealthCheckError,
    ];

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Warn => "WARN",
            Status::TemporarilyUnavailable => "TEMPORARILY_UNAVAILABLE",
            Status::Critical => "CRITICAL",
            Status::HealthCheckError => "HEALTH_CHECK_ERROR",
        }
    }

    /// Numeric severity, used for the overall status gauge
    pub fn severity(self) -> i64 {
        self as i64
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl TryFrom<String> for Status {
    type Error = UnknownStatus;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Level of a single log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    TemporarilyUnavailable,
    Critical,
    HealthCheckError,
}

impl LogLevel {
    /// Status a result reaches because of an entry at this level
    pub fn status(self) -> Status {
        match self {
            LogLevel::Debug | LogLevel::Info => Status::Ok,
            LogLevel::Warn => Status::Warn,
            LogLevel::TemporarilyUnavailable => Status::TemporarilyUnavailable,
            LogLevel::Critical => Status::Critical,
            LogLevel::HealthCheckError => Status::HealthCheckError,
        }
    }
}

/// One diagnostic line of a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    level: LogLevel,
    message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.level, self.message)
    }
}

/// Immutable outcome of one probe execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    status: Status,
    entries: Vec<LogEntry>,
}

impl Default for ProbeResult {
    fn default() -> Self {
        Self::from_entries(Vec::new())
    }
}

impl ProbeResult {
    /// Build a result whose status is the worst level among `entries`
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        let status = entries
            .iter()
            .map(|e| e.level.status())
            .max()
            .unwrap_or(Status::Ok);
        Self { status, entries }
    }

    /// Start a builder collecting log lines
    pub fn builder() -> ProbeResultBuilder {
        ProbeResultBuilder::default()
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::single(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::single(LogLevel::Warn, message)
    }

    pub fn temporarily_unavailable(message: impl Into<String>) -> Self {
        Self::single(LogLevel::TemporarilyUnavailable, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::single(LogLevel::Critical, message)
    }

    /// Result with the given status and a single message at the matching level
    pub fn with_status(status: Status, message: impl Into<String>) -> Self {
        let level = match status {
            Status::Ok => LogLevel::Info,
            Status::Warn => LogLevel::Warn,
            Status::TemporarilyUnavailable => LogLevel::TemporarilyUnavailable,
            Status::Critical => LogLevel::Critical,
            Status::HealthCheckError => LogLevel::HealthCheckError,
        };
        Self::single(level, message)
    }

    /// Result describing a probe that faulted while executing
    pub fn fault(description: impl Into<String>) -> Self {
        Self {
            status: Status::HealthCheckError,
            entries: vec![LogEntry::new(LogLevel::Critical, description)],
        }
    }

    fn single(level: LogLevel, message: impl Into<String>) -> Self {
        Self::from_entries(vec![LogEntry::new(level, message)])
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Copy of this result with `status` forced and `note` appended as an info line
    pub fn rewritten(&self, status: Status, note: impl Into<String>) -> Self {
        let mut entries = self.entries.clone();
        entries.push(LogEntry::new(LogLevel::Info, note));
        Self { status, entries }
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        for entry in &self.entries {
            write!(f, "; {}", entry)?;
        }
        Ok(())
    }
}

/// Builder collecting log lines for a [`ProbeResult`]
#[derive(Debug, Default)]
pub struct ProbeResultBuilder {
    entries: Vec<LogEntry>,
}

impl ProbeResultBuilder {
    pub fn entry(mut self, level: LogLevel, message: impl Into<String>) -> Self {
        self.entries.push(LogEntry::new(level, message));
        self
    }

    pub fn debug(self, message: impl Into<String>) -> Self {
        self.entry(LogLevel::Debug, message)
    }

    pub fn info(self, message: impl Into<String>) -> Self {
        self.entry(LogLevel::Info, message)
    }

    pub fn warn(self, message: impl Into<String>) -> Self {
        self.entry(LogLevel::Warn, message)
    }

    pub fn temporarily_unavailable(self, message: impl Into<String>) -> Self {
        self.entry(LogLevel::TemporarilyUnavailable, message)
    }

    pub fn critical(self, message: impl Into<String>) -> Self {
        self.entry(LogLevel::Critical, message)
    }

    pub fn build(self) -> ProbeResult {
        ProbeResult::from_entries(self.entries)
    }
}

/// When and how a result was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionMeta {
    /// When the result was computed (or synthesized, for timeouts)
    pub computed_at: Instant,
    /// How long the execution ran before the result was available
    pub duration: Duration,
    /// Whether the result is a timeout fallback rather than the probe's own
    pub timed_out: bool,
}
