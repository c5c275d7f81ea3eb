//! Schedule expressions for periodically executed probes
//!
//! | Format | Syntax | Example |
//! |--------|--------|---------|
//! | Interval | `every:<duration>` | `every:10s`, `every:1m30s` |
//! | Prefixed cron | `cron:<expr>` | `cron:0 */5 * * * *` |
//! | Raw cron | `<expr>` | `0 0 * * * *` |
//! | Named | `@name` | `@hourly`, `@daily` |
//!
//! Cron expressions use the seconds-first format of the `cron` crate
//! (6 or 7 fields).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;

/// Maximum accepted length of a schedule expression
const MAX_SCHEDULE_LENGTH: usize = 256;

/// Error while parsing a schedule or duration expression
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Schedule expression is empty")]
    Empty,
    #[error("Schedule expression exceeds {} characters", MAX_SCHEDULE_LENGTH)]
    TooLong,
    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },
    #[error("Unknown named schedule '{0}'")]
    UnknownName(String),
    #[error("Invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },
    #[error("Interval must be greater than zero")]
    ZeroInterval,
}

/// Cadence at which a probe is executed in the background
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Schedule {
    /// Fixed interval between executions
    Interval(Duration),
    /// Cron expression, validated on construction
    Cron(String),
}

impl Schedule {
    /// Parse a schedule expression
    pub fn parse(input: &str) -> Result<Self, ScheduleError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ScheduleError::Empty);
        }
        if input.len() > MAX_SCHEDULE_LENGTH {
            return Err(ScheduleError::TooLong);
        }

        if let Some(duration) = input.strip_prefix("every:") {
            let every = parse_duration(duration)?;
            Self::interval(every)
        } else if let Some(expr) = input.strip_prefix("cron:") {
            Self::cron(expr)
        } else if input.starts_with('@') {
            Self::named(input)
        } else {
            Self::cron(input)
        }
    }

    /// Fixed-interval schedule
    pub fn interval(every: Duration) -> Result<Self, ScheduleError> {
        if every.is_zero() {
            return Err(ScheduleError::ZeroInterval);
        }
        Ok(Schedule::Interval(every))
    }

    /// Cron schedule
    pub fn cron(expr: &str) -> Result<Self, ScheduleError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ScheduleError::Empty);
        }
        cron::Schedule::from_str(expr).map_err(|e| ScheduleError::InvalidCron {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Schedule::Cron(expr.to_string()))
    }

    fn named(input: &str) -> Result<Self, ScheduleError> {
        // sec min hour day-of-month month day-of-week year
        let expr = match input.to_ascii_lowercase().as_str() {
            "@yearly" | "@annually" => "0 0 0 1 1 * *",
            "@monthly" => "0 0 0 1 * * *",
            "@weekly" => "0 0 0 * * 1 *",
            "@daily" | "@midnight" => "0 0 0 * * * *",
            "@hourly" => "0 0 * * * * *",
            "@minutely" => "0 * * * * * *",
            _ => return Err(ScheduleError::UnknownName(input.to_string())),
        };
        Self::cron(expr)
    }

    /// Re-check a schedule that may have been built without the constructors
    pub fn validate(&self) -> Result<(), ScheduleError> {
        match self {
            Schedule::Interval(every) => Self::interval(*every).map(|_| ()),
            Schedule::Cron(expr) => Self::cron(expr).map(|_| ()),
        }
    }

    /// Fixed interval, if this is an interval schedule
    pub fn fixed_interval(&self) -> Option<Duration> {
        match self {
            Schedule::Interval(every) => Some(*every),
            Schedule::Cron(_) => None,
        }
    }

    /// Delay from now until the next cron fire time
    ///
    /// Returns None for interval schedules and for cron expressions with no
    /// upcoming fire time.
    pub fn next_cron_delay(&self) -> Option<Duration> {
        let Schedule::Cron(expr) = self else {
            return None;
        };
        let schedule = cron::Schedule::from_str(expr).ok()?;
        let next = schedule.upcoming(Utc).next()?;
        Some((next - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Interval(every) => write!(f, "every:{}ms", every.as_millis()),
            Schedule::Cron(expr) => write!(f, "cron:{}", expr),
        }
    }
}

/// Parse a human-readable duration such as `500ms`, `10s`, `1m30s`, `2h` or `1d`
pub fn parse_duration(input: &str) -> Result<Duration, ScheduleError> {
    let input = input.trim();
    let invalid = |reason: &str| ScheduleError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    if input.is_empty() {
        return Err(invalid("duration cannot be empty"));
    }

    let mut total = Duration::ZERO;
    let mut chars = input.chars().filter(|c| !c.is_whitespace()).peekable();

    while chars.peek().is_some() {
        let mut number = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
            number.push(c);
            chars.next();
        }
        let mut unit = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_alphabetic) {
            unit.push(c.to_ascii_lowercase());
            chars.next();
        }

        if number.is_empty() {
            return Err(invalid("expected a number before each unit"));
        }
        let value: u64 = number.parse().map_err(|_| invalid("number out of range"))?;
        let seconds = |factor: u64| {
            value
                .checked_mul(factor)
                .map(Duration::from_secs)
                .ok_or_else(|| invalid("duration out of range"))
        };
        let part = match unit.as_str() {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => seconds(60)?,
            "h" => seconds(60 * 60)?,
            "d" => seconds(24 * 60 * 60)?,
            "" => return Err(invalid("missing unit (ms, s, m, h, d)")),
            _ => return Err(invalid("unknown unit, expected ms, s, m, h or d")),
        };
        total = total
            .checked_add(part)
            .ok_or_else(|| invalid("duration out of range"))?;
    }

    Ok(total)
}
