//! Method tracing and before/after/throwing hooks for arbitrary operations.
//!
//! Nothing here knows about HTTP. An operation is a closure (or a future) returning a
//! `Result`; the hooks observe it without changing what it returns.
//!
//! ```rust
//! use http_logging::{EventLogger, LoggingConfig, MemorySink};
//!
//! let sink = MemorySink::new();
//! let logger = EventLogger::new(LoggingConfig::default(), sink.clone());
//!
//! // Around-advice: timing on success, error record and wrapping error on failure
//! let total = logger.traced("sum", || Ok::<_, std::num::ParseIntError>(40 + 2)).unwrap();
//! assert_eq!(total, 42);
//!
//! // Individual hooks, composed explicitly
//! let items = logger
//!     .advise("list_items")
//!     .before()
//!     .returning()
//!     .throwing()
//!     .call(|| Ok::<_, std::io::Error>(vec![1, 2, 3]))
//!     .unwrap();
//! assert_eq!(items, vec![1, 2, 3]);
//! assert_eq!(sink.records().len(), 3);
//! ```

use futures::FutureExt;
use std::any::Any;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{panic_message, AdviceError};
use crate::logger::EventLogger;
use crate::types::{LogRecord, TraceSpan};

/// Logged in place of a result when an operation returns nothing.
pub const NO_RESULT: &str = "<no result>";

/// Outcome of running an operation under `catch_unwind`.
type Caught<T, E> = Result<Result<T, E>, Box<dyn Any + Send>>;

impl EventLogger {
    /// Before-hook: records that `operation` is about to run.
    pub fn log_before(&self, operation: &str) {
        self.log_detail(|severity| {
            LogRecord::new(severity, format!("Before calling {operation}"))
                .with_field("operation", operation)
        });
    }

    /// After-hook: records what `operation` returned.
    ///
    /// Results are rendered with `Debug`, so collections show their elements. `None`, or a
    /// result that renders as `()` or `None`, logs the [`NO_RESULT`] marker.
    pub fn log_after_returning(&self, operation: &str, result: Option<&dyn Debug>) {
        self.log_detail(|severity| {
            let rendered = result
                .map(|result| format!("{result:?}"))
                .filter(|rendered| !matches!(rendered.as_str(), "()" | "None"))
                .unwrap_or_else(|| NO_RESULT.to_string());
            LogRecord::new(
                severity,
                format!("After returning {operation}: {rendered}"),
            )
            .with_field("operation", operation)
            .with_field("result", rendered)
        });
    }

    /// Throwing-hook: records the error `operation` failed with.
    pub fn log_after_throwing(&self, operation: &str, error: &dyn Display) {
        self.log_failure(|severity| {
            LogRecord::new(severity, format!("Exception in {operation}: {error}"))
                .with_field("operation", operation)
                .with_field("error", error)
        });
    }

    /// Around-advice for a synchronous operation.
    ///
    /// Runs `f` on the calling thread. On success the elapsed time is logged and the value
    /// returned as is; on failure an error record is logged and the original error is
    /// returned inside an [`AdviceError`]. A panic is logged as a failure and then resumed.
    pub fn traced<T, E, F>(&self, operation: &str, f: F) -> Result<T, AdviceError<E>>
    where
        E: Display,
        F: FnOnce() -> Result<T, E>,
    {
        let mut span = TraceSpan::start(operation);
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        self.settle_trace(&mut span, outcome, false)
    }

    /// Around-advice for an asynchronous operation, polled in the caller's task.
    ///
    /// Dropping the returned future before it completes logs an error record noting the
    /// cancellation.
    pub async fn trace_async<T, E, Fut>(
        &self,
        operation: &str,
        future: Fut,
    ) -> Result<T, AdviceError<E>>
    where
        E: Display,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut guard = SpanGuard::new(self, operation);
        let outcome = AssertUnwindSafe(future).catch_unwind().await;
        self.settle_trace(&mut guard.span, outcome, false)
    }

    /// Starts composing hooks for `operation`.
    pub fn advise<'a>(&'a self, operation: &'a str) -> Advised<'a> {
        Advised {
            logger: self,
            operation,
            before: false,
            returning: false,
            throwing: false,
        }
    }

    /// Finishes `span` for a caught outcome. Panics are logged, then resumed.
    fn settle_trace<T, E: Display>(
        &self,
        span: &mut TraceSpan,
        outcome: Caught<T, E>,
        failure_logged: bool,
    ) -> Result<T, AdviceError<E>> {
        match outcome {
            Ok(outcome) => self.finish_trace(span, outcome, failure_logged),
            Err(payload) => {
                let failure = panic_message(&*payload);
                let _ = self.finish_trace::<(), _>(span, Err(failure), failure_logged);
                panic::resume_unwind(payload)
            }
        }
    }

    fn finish_trace<T, E: Display>(
        &self,
        span: &mut TraceSpan,
        outcome: Result<T, E>,
        failure_logged: bool,
    ) -> Result<T, AdviceError<E>> {
        let elapsed = span.finish();
        let operation = span.operation();
        match outcome {
            Ok(value) => {
                self.log_detail(|severity| {
                    LogRecord::new(
                        severity,
                        format!("Method {operation} completed in {}ms", elapsed.as_millis()),
                    )
                    .with_field("operation", operation)
                    .with_field("elapsed_ms", elapsed.as_millis())
                });
                Ok(value)
            }
            Err(e) => {
                if !failure_logged {
                    self.log_failure(|severity| {
                        LogRecord::new(severity, format!("Method {operation} failed: {e}"))
                            .with_field("operation", operation)
                            .with_field("error", &e)
                            .with_field("elapsed_ms", elapsed.as_millis())
                    });
                }
                Err(AdviceError::new(operation, e))
            }
        }
    }
}

/// Logs a cancellation if a traced future is dropped while its span is still running.
struct SpanGuard<'a> {
    logger: &'a EventLogger,
    span: TraceSpan,
}

impl<'a> SpanGuard<'a> {
    fn new(logger: &'a EventLogger, operation: &str) -> Self {
        Self {
            logger,
            span: TraceSpan::start(operation),
        }
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        if !self.span.is_in_flight() {
            return;
        }
        let elapsed = self.span.finish();
        let operation = self.span.operation();
        self.logger.log_failure(|severity| {
            LogRecord::new(
                severity,
                format!("Method {operation} cancelled after {}ms", elapsed.as_millis()),
            )
            .with_field("operation", operation)
            .with_field("elapsed_ms", elapsed.as_millis())
        });
    }
}

/// Hooks selected for one operation. Built by [`EventLogger::advise`].
///
/// Each hook covers a distinct point of the call: entry, successful return, failure. Panics
/// count as failures: the throwing hook logs them before they are resumed. When the throwing
/// hook is combined with [`Advised::traced`], the failure is logged once, by the throwing
/// hook.
#[derive(Debug, Clone, Copy)]
pub struct Advised<'a> {
    logger: &'a EventLogger,
    operation: &'a str,
    before: bool,
    returning: bool,
    throwing: bool,
}

impl<'a> Advised<'a> {
    /// Log before the operation runs.
    pub fn before(mut self) -> Self {
        self.before = true;
        self
    }

    /// Log the value the operation returns. `()` and `None` log the [`NO_RESULT`] marker.
    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }

    /// Log the error the operation fails with.
    pub fn throwing(mut self) -> Self {
        self.throwing = true;
        self
    }

    /// Runs `f` with the selected hooks. The result, including the error, is returned
    /// unchanged.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Debug,
        E: Display,
        F: FnOnce() -> Result<T, E>,
    {
        self.enter();
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        self.exit(outcome)
    }

    /// Async counterpart of [`Advised::call`].
    pub async fn call_async<T, E, Fut>(&self, future: Fut) -> Result<T, E>
    where
        T: Debug,
        E: Display,
        Fut: Future<Output = Result<T, E>>,
    {
        self.enter();
        let outcome = AssertUnwindSafe(future).catch_unwind().await;
        self.exit(outcome)
    }

    /// Runs `f` with the selected hooks inside the method tracer.
    pub fn traced<T, E, F>(&self, f: F) -> Result<T, AdviceError<E>>
    where
        T: Debug,
        E: Display,
        F: FnOnce() -> Result<T, E>,
    {
        let mut span = TraceSpan::start(self.operation);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.call(f)));
        self.logger.settle_trace(&mut span, outcome, self.throwing)
    }

    /// Async counterpart of [`Advised::traced`]. Cancellation is logged as for
    /// [`EventLogger::trace_async`].
    pub async fn trace_async<T, E, Fut>(&self, future: Fut) -> Result<T, AdviceError<E>>
    where
        T: Debug,
        E: Display,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut guard = SpanGuard::new(self.logger, self.operation);
        let outcome = AssertUnwindSafe(self.call_async(future))
            .catch_unwind()
            .await;
        self.logger
            .settle_trace(&mut guard.span, outcome, self.throwing)
    }

    fn enter(&self) {
        if self.before {
            self.logger.log_before(self.operation);
        }
    }

    fn exit<T: Debug, E: Display>(&self, outcome: Caught<T, E>) -> Result<T, E> {
        match outcome {
            Ok(outcome) => {
                match &outcome {
                    Ok(value) if self.returning => {
                        self.logger
                            .log_after_returning(self.operation, Some(value as &dyn Debug));
                    }
                    Err(e) if self.throwing => self.logger.log_after_throwing(self.operation, e),
                    _ => {}
                }
                outcome
            }
            Err(payload) => {
                if self.throwing {
                    let failure = panic_message(&*payload);
                    self.logger.log_after_throwing(self.operation, &failure);
                }
                panic::resume_unwind(payload)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;
    use crate::severity::LogSeverity;
    use crate::MemorySink;
    use std::error::Error as _;

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    fn logger(level: LogSeverity) -> (EventLogger, MemorySink) {
        let sink = MemorySink::new();
        let config = LoggingConfig {
            level,
            ..LoggingConfig::default()
        };
        (EventLogger::new(config, sink.clone()), sink)
    }

    #[test]
    fn traced_returns_the_value_and_logs_timing() {
        let (logger, sink) = logger(LogSeverity::Info);

        let value = logger.traced("answer", || Ok::<_, Boom>(42)).unwrap();

        assert_eq!(value, 42);
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, LogSeverity::Info);
        assert!(records[0].message.starts_with("Method answer completed in "));
        assert_eq!(records[0].field("operation"), Some("answer"));
        assert!(records[0].field("elapsed_ms").is_some());
    }

    #[test]
    fn traced_wraps_and_logs_failures() {
        let (logger, sink) = logger(LogSeverity::Info);

        let err = logger.traced("explode", || Err::<(), _>(Boom)).unwrap_err();

        assert_eq!(err.inner(), &Boom);
        assert_eq!(err.operation(), "explode");
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));
        let records = sink.records_at(LogSeverity::Error);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "Method explode failed: boom");
    }

    #[test]
    fn error_level_keeps_failures_but_drops_timings() {
        let (logger, sink) = logger(LogSeverity::Error);

        logger.traced("quiet", || Ok::<_, Boom>(())).unwrap();
        assert!(sink.records().is_empty());

        let _ = logger.traced("loud", || Err::<(), _>(Boom));
        assert_eq!(sink.records().len(), 1);
        assert!(sink.records()[0].message.contains("boom"));
    }

    #[test]
    fn disabled_config_logs_nothing() {
        let sink = MemorySink::new();
        let config = LoggingConfig {
            enabled: false,
            ..LoggingConfig::default()
        };
        let logger = EventLogger::new(config, sink.clone());

        assert_eq!(logger.traced("op", || Ok::<_, Boom>(1)).unwrap(), 1);
        assert!(logger.traced("op", || Err::<(), _>(Boom)).is_err());
        let _ = logger
            .advise("op")
            .before()
            .returning()
            .throwing()
            .call(|| Ok::<_, Boom>(1));

        assert!(sink.records().is_empty());
    }

    #[test]
    fn hooks_log_entry_and_collection_results() {
        let (logger, sink) = logger(LogSeverity::Info);

        let items = logger
            .advise("list")
            .before()
            .returning()
            .call(|| Ok::<_, Boom>(vec!["a", "b"]))
            .unwrap();

        assert_eq!(items, vec!["a", "b"]);
        let messages: Vec<String> = sink.records().into_iter().map(|r| r.message).collect();
        assert_eq!(
            messages,
            vec![
                "Before calling list".to_string(),
                r#"After returning list: ["a", "b"]"#.to_string(),
            ]
        );
    }

    #[test]
    fn absent_results_log_a_marker() {
        let (logger, sink) = logger(LogSeverity::Info);
        logger.log_after_returning("lookup", None);
        assert_eq!(sink.records()[0].field("result"), Some(NO_RESULT));
    }

    #[test]
    fn throwing_hook_returns_the_original_error() {
        let (logger, sink) = logger(LogSeverity::Info);

        let err = logger
            .advise("save")
            .throwing()
            .call(|| Err::<(), _>(Boom))
            .unwrap_err();

        assert_eq!(err, Boom);
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, LogSeverity::Error);
        assert_eq!(records[0].message, "Exception in save: boom");
    }

    #[test]
    fn throwing_hook_and_tracer_log_a_failure_once() {
        let (logger, sink) = logger(LogSeverity::Info);

        let result = logger
            .advise("save")
            .before()
            .throwing()
            .traced(|| Err::<(), _>(Boom));

        assert!(result.is_err());
        let messages: Vec<String> = sink.records().into_iter().map(|r| r.message).collect();
        assert_eq!(
            messages,
            vec![
                "Before calling save".to_string(),
                "Exception in save: boom".to_string(),
            ]
        );
    }

    #[test]
    fn hooks_wrap_inside_the_tracer() {
        let (logger, sink) = logger(LogSeverity::Info);

        let value = logger
            .advise("fetch")
            .before()
            .returning()
            .traced(|| Ok::<_, Boom>(Some(3)))
            .unwrap();

        assert_eq!(value, Some(3));
        let records = sink.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].message, "Before calling fetch");
        assert_eq!(records[1].message, "After returning fetch: Some(3)");
        assert!(records[2].message.starts_with("Method fetch completed in "));
    }

    #[tokio::test]
    async fn async_tracing_runs_in_the_callers_task() {
        let (logger, sink) = logger(LogSeverity::Debug);

        let value = logger
            .trace_async("sleepy", async {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok::<_, Boom>("done")
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, LogSeverity::Debug);
        let elapsed: u128 = records[0].field("elapsed_ms").unwrap().parse().unwrap();
        assert!(elapsed >= 20);
    }

    #[tokio::test]
    async fn async_hooks_observe_failures() {
        let (logger, sink) = logger(LogSeverity::Info);

        let err = logger
            .advise("remote")
            .before()
            .throwing()
            .trace_async(async { Err::<u8, _>(Boom) })
            .await
            .unwrap_err();

        assert_eq!(err.into_inner(), Boom);
        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.records_at(LogSeverity::Error).len(), 1);
    }

    #[test]
    fn returning_hook_marks_absent_results() {
        let (logger, sink) = logger(LogSeverity::Info);

        let found = logger
            .advise("lookup")
            .returning()
            .call(|| Ok::<_, Boom>(None::<u8>))
            .unwrap();
        logger
            .advise("save")
            .returning()
            .call(|| Ok::<_, Boom>(()))
            .unwrap();

        assert_eq!(found, None);
        let messages: Vec<String> = sink.records().into_iter().map(|r| r.message).collect();
        assert_eq!(
            messages,
            vec![
                format!("After returning lookup: {NO_RESULT}"),
                format!("After returning save: {NO_RESULT}"),
            ]
        );
    }

    #[test]
    fn traced_logs_panics_and_resumes_them() {
        let (logger, sink) = logger(LogSeverity::Info);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            logger.traced("explode", || -> Result<(), Boom> { panic!("kaboom") })
        }));

        let payload = outcome.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"kaboom"));
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, LogSeverity::Error);
        assert_eq!(records[0].message, "Method explode failed: panicked: kaboom");
    }

    #[test]
    fn throwing_hook_logs_a_panic_once_inside_the_tracer() {
        let (logger, sink) = logger(LogSeverity::Info);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            logger
                .advise("save")
                .throwing()
                .traced(|| -> Result<(), Boom> { panic!("disk gone") })
        }));

        assert!(outcome.is_err());
        let messages: Vec<String> = sink.records().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["Exception in save: panicked: disk gone".to_string()]);
    }

    #[tokio::test]
    async fn async_tracing_logs_panics_without_a_cancellation() {
        let (logger, sink) = logger(LogSeverity::Info);

        let outcome = AssertUnwindSafe(logger.trace_async("explode", async {
            if true {
                panic!("kaboom");
            }
            Ok::<(), Boom>(())
        }))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "Method explode failed: panicked: kaboom");
    }

    #[tokio::test]
    async fn dropped_async_traces_are_logged_as_cancelled() {
        let (logger, sink) = logger(LogSeverity::Error);

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            logger.trace_async("slow_op", std::future::pending::<Result<(), Boom>>()),
        )
        .await;
        assert!(timed_out.is_err());

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            logger
                .advise("slow_hook")
                .before()
                .trace_async(std::future::pending::<Result<(), Boom>>()),
        )
        .await;
        assert!(timed_out.is_err());

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.severity == LogSeverity::Error));
        assert!(records[0].message.starts_with("Method slow_op cancelled after "));
        assert!(records[1].message.starts_with("Method slow_hook cancelled after "));
        assert!(records[0].field("elapsed_ms").is_some());
    }

    #[tokio::test]
    async fn completed_async_traces_are_not_reported_as_cancelled() {
        let (logger, sink) = logger(LogSeverity::Info);

        logger
            .trace_async("quick", async { Ok::<_, Boom>(1) })
            .await
            .unwrap();

        assert!(sink.find("cancelled").is_empty());
        assert_eq!(sink.records().len(), 1);
    }
}
