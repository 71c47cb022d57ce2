//! The gated, best-effort front end every component logs through.
//!
//! [`EventLogger`] pairs the shared [`LoggingConfig`] with the injected [`LogSink`]. Records
//! are built lazily through closures, so nothing is formatted unless the current policy lets
//! the record through, and sink failures are swallowed here so they can never change the
//! outcome of the code being logged.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

use crate::body_wrapper::decode_body;
use crate::config::LoggingConfig;
use crate::severity::{LogSeverity, SeverityPolicy};
use crate::types::{render_headers, CapturedExchange, LogRecord};
use crate::LogSink;

/// Shared handle to the configuration and the sink.
///
/// Cloning is cheap; every clone logs to the same sink with the same configuration.
#[derive(Clone)]
pub struct EventLogger {
    config: Arc<LoggingConfig>,
    sink: Arc<dyn LogSink>,
}

impl std::fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EventLogger {
    pub fn new<L: LogSink>(config: LoggingConfig, sink: L) -> Self {
        Self::from_shared(Arc::new(config), Arc::new(sink))
    }

    pub fn from_shared(config: Arc<LoggingConfig>, sink: Arc<dyn LogSink>) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Policy for the configured level, evaluated fresh on every call.
    pub fn policy(&self) -> SeverityPolicy {
        self.config.policy()
    }

    /// Emits an informational detail record if the policy captures info detail.
    ///
    /// `build` receives the severity to use and only runs when the record will be emitted.
    /// Nothing is emitted while the configuration is disabled.
    pub fn log_detail(&self, build: impl FnOnce(LogSeverity) -> LogRecord) {
        let policy = self.policy();
        if self.is_enabled() && policy.captures_info_detail() {
            self.emit(&build(policy.detail_severity()));
        }
    }

    /// Emits an error record for a failed operation if the policy captures failures.
    pub fn log_failure(&self, build: impl FnOnce(LogSeverity) -> LogRecord) {
        if self.is_enabled() && self.policy().captures_failure_detail() {
            self.emit(&build(LogSeverity::Error));
        }
    }

    /// Hands `record` to the sink.
    ///
    /// Sink errors and sink panics are reported through `tracing` and dropped.
    pub fn emit(&self, record: &LogRecord) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.sink.emit(record))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, message = %record.message, "Dropping log record after sink failure");
            }
            Err(_) => {
                warn!(message = %record.message, "Dropping log record after sink panic");
            }
        }
    }

    /// Logs a completed exchange: request headers, request body, summary, response headers,
    /// response body. Header and body records only appear when they were captured and the
    /// policy captures info detail; empty bodies are skipped.
    pub fn log_exchange(&self, exchange: &CapturedExchange) {
        self.log_request_detail(exchange);
        self.log_summary(exchange, None);

        if let Some(headers) = &exchange.response_headers {
            self.log_detail(|severity| {
                exchange_record(
                    severity,
                    exchange,
                    format!("Response headers: {}", render_headers(headers)),
                )
            });
        }
        if let Some(body) = exchange.response_body.as_ref().filter(|b| !b.is_empty()) {
            self.log_detail(|severity| {
                exchange_record(
                    severity,
                    exchange,
                    format!("Response body: {}", decode_body(body)),
                )
            });
        }
    }

    /// Logs an exchange whose downstream handler failed with `error`.
    ///
    /// The summary is emitted at ERROR whatever the configured level and carries the error
    /// message.
    pub fn log_exchange_failure(&self, exchange: &CapturedExchange, error: &str) {
        self.log_request_detail(exchange);
        self.log_summary(exchange, Some(error));
    }

    /// Logs an exchange that was dropped by the host before the handler finished.
    pub fn log_exchange_cancelled(&self, exchange: &CapturedExchange) {
        let record = exchange_record(
            LogSeverity::Error,
            exchange,
            format!(
                "HTTP {} {} - cancelled after {}ms",
                exchange.method,
                exchange.path_and_query(),
                exchange.duration.as_millis()
            ),
        )
        .with_field("method", &exchange.method)
        .with_field("uri", exchange.path_and_query())
        .with_field("duration_ms", exchange.duration.as_millis());
        self.emit(&record);
    }

    fn log_request_detail(&self, exchange: &CapturedExchange) {
        if let Some(headers) = &exchange.request_headers {
            self.log_detail(|severity| {
                exchange_record(
                    severity,
                    exchange,
                    format!("Request headers: {}", render_headers(headers)),
                )
            });
        }
        let body = exchange.request_body.as_ref().filter(|b| !b.is_empty());
        let stream_error = exchange.request_body_error.as_deref();
        if body.is_some() || stream_error.is_some() {
            self.log_detail(|severity| {
                let content = body.map(|b| decode_body(b)).unwrap_or_default();
                let record = exchange_record(
                    severity,
                    exchange,
                    format!("Request body: {content}"),
                );
                match stream_error {
                    Some(e) => record.with_field("stream_error", e),
                    None => record,
                }
            });
        }
    }

    fn log_summary(&self, exchange: &CapturedExchange, error: Option<&str>) {
        let status = exchange.status.as_u16();
        let build = |severity| {
            let mut message = format!(
                "HTTP {} {} - {} - {}ms",
                exchange.method,
                exchange.path_and_query(),
                status,
                exchange.duration.as_millis()
            );
            if let Some(error) = error {
                message.push_str(" - ");
                message.push_str(error);
            }
            let mut record = exchange_record(severity, exchange, message)
                .with_field("method", &exchange.method)
                .with_field("uri", exchange.path_and_query())
                .with_field("status", status)
                .with_field("duration_ms", exchange.duration.as_millis());
            if let Some(error) = error {
                record = record.with_field("error", error);
            }
            record
        };

        // Client and server errors are always visible
        if status >= 400 {
            self.emit(&build(LogSeverity::Error));
        } else {
            self.log_detail(build);
        }
    }
}

fn exchange_record(
    severity: LogSeverity,
    exchange: &CapturedExchange,
    message: String,
) -> LogRecord {
    LogRecord::new(severity, message).with_field("correlation_id", exchange.correlation_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::MemorySink;
    use axum::http::{Method, StatusCode, Uri};
    use bytes::Bytes;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct PanickingSink;

    impl LogSink for PanickingSink {
        fn emit(&self, _record: &LogRecord) -> Result<(), SinkError> {
            panic!("sink exploded");
        }
    }

    struct UnavailableSink;

    impl LogSink for UnavailableSink {
        fn emit(&self, _record: &LogRecord) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("socket closed".to_string()))
        }
    }

    fn exchange(status: StatusCode) -> CapturedExchange {
        let mut exchange = CapturedExchange::new(7, Method::POST, Uri::from_static("/items"));
        exchange.status = status;
        exchange.duration = Duration::from_millis(12);
        exchange
    }

    fn logger(level: LogSeverity) -> (EventLogger, MemorySink) {
        let sink = MemorySink::new();
        let config = LoggingConfig {
            level,
            ..LoggingConfig::default()
        };
        (EventLogger::new(config, sink.clone()), sink)
    }

    #[test]
    fn detail_is_built_lazily() {
        let (logger, sink) = logger(LogSeverity::Error);
        let mut built = false;
        logger.log_detail(|severity| {
            built = true;
            LogRecord::new(severity, "expensive")
        });
        assert!(!built);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn detail_uses_the_configured_level() {
        let (logger, sink) = logger(LogSeverity::Warn);
        logger.log_detail(|severity| LogRecord::new(severity, "detail"));
        assert_eq!(sink.records()[0].severity, LogSeverity::Warn);
    }

    #[test]
    fn sink_failures_are_swallowed() {
        for logger in [
            EventLogger::new(LoggingConfig::default(), PanickingSink),
            EventLogger::new(LoggingConfig::default(), UnavailableSink),
        ] {
            logger.emit(&LogRecord::new(LogSeverity::Info, "lost"));
            logger.log_exchange(&exchange(StatusCode::OK));
        }
    }

    #[test]
    fn exchange_records_follow_request_then_response_order() {
        let (logger, sink) = logger(LogSeverity::Info);
        let mut exchange = exchange(StatusCode::CREATED);
        exchange.request_headers = Some(BTreeMap::from([(
            "content-type".to_string(),
            "application/json".to_string(),
        )]));
        exchange.request_body = Some(Bytes::from_static(b"{\"name\":\"x\"}"));
        exchange.response_headers = Some(BTreeMap::from([(
            "location".to_string(),
            "/items/1".to_string(),
        )]));
        exchange.response_body = Some(Bytes::from_static(b"{\"id\":1}"));

        logger.log_exchange(&exchange);

        let messages: Vec<String> = sink.records().into_iter().map(|r| r.message).collect();
        assert_eq!(
            messages,
            vec![
                "Request headers: {content-type=application/json}".to_string(),
                "Request body: {\"name\":\"x\"}".to_string(),
                "HTTP POST /items - 201 - 12ms".to_string(),
                "Response headers: {location=/items/1}".to_string(),
                "Response body: {\"id\":1}".to_string(),
            ]
        );
        assert!(sink
            .records()
            .iter()
            .all(|r| r.field("correlation_id") == Some("7")));
    }

    #[test]
    fn empty_bodies_are_not_logged() {
        let (logger, sink) = logger(LogSeverity::Info);
        let mut exchange = exchange(StatusCode::OK);
        exchange.request_body = Some(Bytes::new());
        exchange.response_body = Some(Bytes::new());

        logger.log_exchange(&exchange);

        assert_eq!(sink.records().len(), 1);
        assert!(sink.records()[0].message.starts_with("HTTP POST /items - 200"));
    }

    #[test]
    fn request_stream_errors_are_attached_to_the_body_record() {
        let (logger, sink) = logger(LogSeverity::Info);
        let mut exchange = exchange(StatusCode::BAD_REQUEST);
        exchange.request_body = Some(Bytes::from_static(b"par"));
        exchange.request_body_error = Some("connection reset".to_string());

        logger.log_exchange(&exchange);

        let records = sink.find("Request body");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "Request body: par");
        assert_eq!(records[0].field("stream_error"), Some("connection reset"));
    }

    #[test]
    fn error_statuses_bypass_the_configured_level() {
        let (logger, sink) = logger(LogSeverity::Error);
        logger.log_exchange(&exchange(StatusCode::OK));
        assert!(sink.records().is_empty());

        logger.log_exchange(&exchange(StatusCode::NOT_FOUND));
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, LogSeverity::Error);
        assert_eq!(records[0].field("status"), Some("404"));
    }

    #[test]
    fn failures_carry_the_error_message() {
        let (logger, sink) = logger(LogSeverity::Error);
        logger.log_exchange_failure(&exchange(StatusCode::INTERNAL_SERVER_ERROR), "boom");

        let records = sink.records_at(LogSeverity::Error);
        assert_eq!(records.len(), 1);
        assert!(records[0].message.contains("boom"));
        assert_eq!(records[0].field("error"), Some("boom"));
    }

    #[test]
    fn cancellation_is_logged_at_error() {
        let (logger, sink) = logger(LogSeverity::Info);
        logger.log_exchange_cancelled(&exchange(StatusCode::INTERNAL_SERVER_ERROR));
        let records = sink.records();
        assert_eq!(records[0].severity, LogSeverity::Error);
        assert_eq!(records[0].message, "HTTP POST /items - cancelled after 12ms");
    }
}
