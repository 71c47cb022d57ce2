//! Configuration for the logging filter and method advice.

use serde::Deserialize;

use crate::severity::{LogSeverity, SeverityPolicy};

/// Configuration for the HTTP logging middleware and the method advice.
///
/// Built once by the host (typically deserialized from its own settings source) and shared
/// read-only by every request. Keys use the kebab-case names of the `http.logging.*`
/// properties; every key is optional.
///
/// # Examples
///
/// ```rust
/// use http_logging::{LoggingConfig, LogSeverity};
///
/// // Default configuration: enabled, INFO, no header or body detail
/// let config = LoggingConfig::default();
///
/// // Custom configuration
/// let config = LoggingConfig {
///     level: LogSeverity::Debug,
///     log_request_headers: true,
///     log_response_body: true,
///     ..LoggingConfig::default()
/// };
/// assert!(config.policy().captures_info_detail());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// Master switch. When false the middleware forwards untouched and advice is a no-op
    pub enabled: bool,
    /// Minimum severity
    pub level: LogSeverity,
    /// Whether to log request header maps
    pub log_request_headers: bool,
    /// Whether to log response header maps
    pub log_response_headers: bool,
    /// Whether to log request bodies
    pub log_request_body: bool,
    /// Whether to log response bodies
    pub log_response_body: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogSeverity::Info,
            log_request_headers: false,
            log_response_headers: false,
            log_request_body: false,
            log_response_body: false,
        }
    }
}

impl LoggingConfig {
    /// Gating policy for the configured level.
    pub fn policy(&self) -> SeverityPolicy {
        SeverityPolicy::new(self.level)
    }

    /// Whether the request body has to be captured for this configuration.
    pub(crate) fn captures_request_body(&self) -> bool {
        self.log_request_body && self.policy().captures_info_detail()
    }

    /// Whether the response body has to be buffered for this configuration.
    pub(crate) fn captures_response_body(&self) -> bool {
        self.log_response_body && self.policy().captures_info_detail()
    }
}
