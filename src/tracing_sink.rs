//! Production sink that forwards records to `tracing`.
//!
//! This module provides [`TracingSink`], which turns each [`LogRecord`] into a `tracing`
//! event so the host's subscriber decides formatting and transport.

use tracing::{debug, error, info, trace, warn};

use crate::error::SinkError;
use crate::severity::LogSeverity;
use crate::types::{DisplayFields, LogRecord};
use crate::LogSink;

/// [`LogSink`] implementation backed by `tracing`.
///
/// Events are emitted under the `http_logging` target at the `tracing` level matching the
/// record severity. The record message becomes the event message and the record fields are
/// attached as a single `fields` value.
///
/// # Examples
///
/// ```rust,no_run
/// use http_logging::{HttpLoggingLayer, LoggingConfig, TracingSink};
///
/// # #[tokio::main]
/// # async fn main() {
/// let layer = HttpLoggingLayer::new(LoggingConfig::default(), TracingSink);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        let fields = DisplayFields(&record.fields);
        let message = record.message.as_str();
        match record.severity {
            LogSeverity::Trace => trace!(target: "http_logging", fields = %fields, "{message}"),
            LogSeverity::Debug => debug!(target: "http_logging", fields = %fields, "{message}"),
            LogSeverity::Info => info!(target: "http_logging", fields = %fields, "{message}"),
            LogSeverity::Warn => warn!(target: "http_logging", fields = %fields, "{message}"),
            LogSeverity::Error => error!(target: "http_logging", fields = %fields, "{message}"),
        }
        Ok(())
    }
}
