//! Log severities and the gating policy derived from them.
//!
//! Every logging decision in the crate goes through [`SeverityPolicy`]. A policy is built
//! from the configured [`LogSeverity`] each time a record is about to be produced, so
//! expensive work (header enumeration, body decoding) only happens when the record would
//! actually be emitted.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Importance of a log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSeverity::Trace => "TRACE",
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO",
            LogSeverity::Warn => "WARN",
            LogSeverity::Error => "ERROR",
        }
    }

    /// The `tracing` level records of this severity are emitted at.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogSeverity::Trace => tracing::Level::TRACE,
            LogSeverity::Debug => tracing::Level::DEBUG,
            LogSeverity::Info => tracing::Level::INFO,
            LogSeverity::Warn => tracing::Level::WARN,
            LogSeverity::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a severity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log severity `{0}` (expected one of TRACE, DEBUG, INFO, WARN, ERROR)")]
pub struct ParseSeverityError(String);

impl FromStr for LogSeverity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        [
            LogSeverity::Trace,
            LogSeverity::Debug,
            LogSeverity::Info,
            LogSeverity::Warn,
            LogSeverity::Error,
        ]
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| ParseSeverityError(s.to_owned()))
    }
}

impl TryFrom<String> for LogSeverity {
    type Error = ParseSeverityError;

    fn try_from(value: String) -> Result<Self, ParseSeverityError> {
        value.parse()
    }
}

/// Gating predicates for one configured minimum severity.
///
/// Cheap to build; callers construct one per decision from the live configuration
/// instead of holding on to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityPolicy {
    level: LogSeverity,
}

impl SeverityPolicy {
    pub fn new(level: LogSeverity) -> Self {
        Self { level }
    }

    /// The configured minimum severity.
    pub fn level(&self) -> LogSeverity {
        self.level
    }

    /// Whether informational detail (summaries, headers, bodies, timings) is captured.
    pub fn captures_info_detail(&self) -> bool {
        self.level != LogSeverity::Error
    }

    /// Whether the policy runs in error-only mode.
    pub fn captures_error_detail(&self) -> bool {
        self.level == LogSeverity::Error
    }

    /// Whether failures of traced operations are logged.
    ///
    /// Both error-only mode and every info-detail level qualify: an operator who wants
    /// informational detail also wants to see what failed.
    pub fn captures_failure_detail(&self) -> bool {
        self.captures_error_detail() || self.captures_info_detail()
    }

    /// Severity used for detail records.
    ///
    /// Detail is emitted at the configured level itself, so a detail record can never sit
    /// below the configured minimum.
    pub fn detail_severity(&self) -> LogSeverity {
        self.level
    }

    /// Whether a record of `severity` clears the configured minimum.
    pub fn permits(&self, severity: LogSeverity) -> bool {
        severity >= self.level
    }
}
