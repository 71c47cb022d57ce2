//! Data types for log records, captured exchanges and traced invocations.
//!
//! [`LogRecord`] is what sinks receive. [`CapturedExchange`] and [`TraceSpan`] are
//! per-request and per-invocation values: created, filled and consumed by the single task
//! that owns them, never shared.

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use crate::severity::LogSeverity;

/// Global atomic counter for correlation IDs and process start timestamp
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(1);
static PROCESS_START_TIME: std::sync::OnceLock<u64> = std::sync::OnceLock::new();

/// Generate a unique correlation ID combining process start time and counter
pub(crate) fn generate_correlation_id() -> u64 {
    let start_time = *PROCESS_START_TIME.get_or_init(|| {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    });

    let counter = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed);

    // High 32 bits: process start timestamp, Low 32 bits: counter
    (start_time << 32) | (counter & 0xFFFFFFFF)
}

/// A structured record handed to a [`LogSink`](crate::LogSink).
///
/// The message is a complete human-readable line; `fields` repeats the interesting values
/// as key/value pairs so each record can be parsed on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub severity: LogSeverity,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl LogRecord {
    pub fn new(severity: LogSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: &'static str, value: impl ToString) -> Self {
        self.fields.push((name, value.to_string()));
        self
    }

    /// Value of the first field called `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Renders record fields as `key=value` pairs separated by spaces.
pub(crate) struct DisplayFields<'a>(pub &'a [(&'static str, String)]);

impl fmt::Display for DisplayFields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// Everything captured about one HTTP exchange.
///
/// Header maps and bodies are only populated when the configuration asks for them.
#[derive(Debug, Clone)]
pub struct CapturedExchange {
    /// Identifier shared by every record logged for this exchange
    pub correlation_id: u64,
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request URI including path and query parameters
    pub uri: Uri,
    /// Status returned to the client, or the status the failure maps to
    pub status: StatusCode,
    /// Time from entering the middleware until the response was ready to flush
    pub duration: Duration,
    /// Request headers (values decoded lossily, repeated headers joined with ", ")
    pub request_headers: Option<BTreeMap<String, String>>,
    /// Response headers, in the same shape as the request headers
    pub response_headers: Option<BTreeMap<String, String>>,
    /// Request bytes the downstream handler consumed
    pub request_body: Option<Bytes>,
    /// Error the request body stream failed with while the handler read it
    pub request_body_error: Option<String>,
    /// Response bytes the downstream handler produced
    pub response_body: Option<Bytes>,
}

impl CapturedExchange {
    pub fn new(correlation_id: u64, method: Method, uri: Uri) -> Self {
        Self {
            correlation_id,
            method,
            uri,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            duration: Duration::ZERO,
            request_headers: None,
            response_headers: None,
            request_body: None,
            request_body_error: None,
            response_body: None,
        }
    }

    /// Path and query as sent by the client.
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path())
    }
}

/// Convert an http HeaderMap into an ordered name -> value map
pub(crate) fn convert_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut result: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        result
            .entry(name.as_str().to_owned())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    result
}

/// Renders a header map as `{name=value, name=value}`.
pub(crate) fn render_headers(headers: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = headers
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    format!("{{{}}}", pairs.join(", "))
}

/// Timing of one traced invocation.
#[derive(Debug, Clone)]
pub struct TraceSpan {
    operation: String,
    started_at: Instant,
    finished_at: Option<Instant>,
}

impl TraceSpan {
    pub fn start(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            started_at: Instant::now(),
            finished_at: None,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn is_in_flight(&self) -> bool {
        self.finished_at.is_none()
    }

    /// Stops the span and returns the elapsed time. Later calls return the same duration.
    pub fn finish(&mut self) -> Duration {
        let finished_at = *self.finished_at.get_or_insert_with(Instant::now);
        finished_at.duration_since(self.started_at)
    }

    /// Elapsed time so far, or the final duration once finished.
    pub fn elapsed(&self) -> Duration {
        match self.finished_at {
            Some(finished_at) => finished_at.duration_since(self.started_at),
            None => self.started_at.elapsed(),
        }
    }
}
