//! # http-logging
//!
//! An Axum/tower middleware that logs HTTP exchanges (method, URI, status, duration, and
//! optionally headers and bodies) plus a small set of higher-order functions for tracing
//! arbitrary method calls, all gated by a configured minimum severity.
//!
//! ## Features
//!
//! - **Transparent**: handlers see the same request, clients receive the same bytes, errors
//!   and panics propagate unchanged
//! - **Severity gated**: header enumeration and body decoding only happen when the record
//!   will be emitted; status >= 400 is always logged at ERROR
//! - **Body capture**: request bodies are tapped as the handler reads them, response bodies
//!   are buffered, logged and flushed to the client exactly once
//! - **Method advice**: around, before, after-returning and after-throwing logging for any
//!   closure or future
//! - **Pluggable sinks**: records go to an injected [`LogSink`]; [`TracingSink`] forwards to
//!   `tracing`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use http_logging::{HttpLoggingLayer, LoggingConfig, LogSeverity, TracingSink};
//! use tower::ServiceBuilder;
//!
//! async fn hello() -> &'static str {
//!     "Hello, World!"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = LoggingConfig {
//!         level: LogSeverity::Info,
//!         log_request_headers: true,
//!         log_response_body: true,
//!         ..LoggingConfig::default()
//!     };
//!
//!     let mut app = Router::new().route("/hello", get(hello));
//!
//!     // A disabled configuration installs nothing
//!     if let Some(layer) = HttpLoggingLayer::when_enabled(config, TracingSink) {
//!         app = app.layer(ServiceBuilder::new().layer(layer));
//!     }
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Custom Sinks
//!
//! Implement the [`LogSink`] trait to route records somewhere else:
//!
//! ```rust
//! use http_logging::{LogRecord, LogSink, SinkError};
//!
//! #[derive(Debug)]
//! struct StderrSink;
//!
//! impl LogSink for StderrSink {
//!     fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
//!         eprintln!("[{}] {}", record.severity, record.message);
//!         Ok(())
//!     }
//! }
//! ```

use axum::{body::Body, extract::Request, response::Response};
use futures::FutureExt;
use std::{
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, Instant},
};
use tower::{Layer, Service};
use tracing::{debug, instrument, warn};

pub mod advice;
pub use advice::{Advised, NO_RESULT};

pub mod body_wrapper;
use body_wrapper::{tap_body, BodyTap, ResponseBuffer};

pub mod config;
pub use config::LoggingConfig;

pub mod error;
pub use error::{AdviceError, SinkError};
use error::panic_message;

pub mod logger;
pub use logger::EventLogger;

pub mod memory_sink;
pub use memory_sink::MemorySink;

pub mod multi_sink;
pub use multi_sink::MultiSink;

pub mod severity;
pub use severity::{LogSeverity, SeverityPolicy};

pub mod tracing_sink;
pub use tracing_sink::TracingSink;

pub mod types;
use types::{convert_headers, generate_correlation_id};
pub use types::{CapturedExchange, LogRecord, TraceSpan};

/// Destination for log records.
///
/// The middleware and the advice functions never format or ship logs themselves; every record
/// is handed to a sink. Sinks are shared by all concurrent requests.
///
/// Errors (and panics) returned from [`LogSink::emit`] are swallowed by the caller: logging is
/// best effort and never changes the outcome of the operation being logged.
///
/// # Examples
///
/// ```rust
/// use http_logging::{LogRecord, LogSink, SinkError, LogSeverity};
///
/// #[derive(Debug)]
/// struct ErrorsOnly;
///
/// impl LogSink for ErrorsOnly {
///     fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
///         if record.severity == LogSeverity::Error {
///             eprintln!("{}", record.message);
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait LogSink: Send + Sync + 'static {
    /// Deliver one record.
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError>;
}

/// Tower layer for the HTTP logging middleware.
///
/// This is the main entry point for logging HTTP traffic. It implements the Tower [`Layer`]
/// trait and can be used with Axum's layering system.
///
/// # Examples
///
/// ```rust,no_run
/// use http_logging::{HttpLoggingLayer, LoggingConfig, TracingSink};
/// use axum::{routing::get, Router};
/// use tower::ServiceBuilder;
///
/// # async fn hello() -> &'static str { "Hello" }
/// # #[tokio::main]
/// # async fn main() {
/// let layer = HttpLoggingLayer::new(LoggingConfig::default(), TracingSink);
///
/// let app = Router::new()
///     .route("/hello", get(hello))
///     .layer(ServiceBuilder::new().layer(layer));
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
/// axum::serve(listener, app).await.unwrap();
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct HttpLoggingLayer {
    logger: EventLogger,
}

impl HttpLoggingLayer {
    /// Create a new logging layer with the given configuration and sink.
    ///
    /// A layer built from a disabled configuration produces services that forward every call
    /// untouched. Use [`HttpLoggingLayer::when_enabled`] to leave the layer out entirely.
    pub fn new<L: LogSink>(config: LoggingConfig, sink: L) -> Self {
        Self::from_logger(EventLogger::new(config, sink))
    }

    /// Like [`HttpLoggingLayer::new`], but returns `None` when the configuration is disabled.
    ///
    /// Lets the host skip installing the middleware when logging is switched off.
    pub fn when_enabled<L: LogSink>(config: LoggingConfig, sink: L) -> Option<Self> {
        config.enabled.then(|| Self::new(config, sink))
    }

    /// Build the layer around an existing logger, sharing its sink with other components.
    pub fn from_logger(logger: EventLogger) -> Self {
        Self { logger }
    }

    pub fn logger(&self) -> &EventLogger {
        &self.logger
    }
}

impl<S> Layer<S> for HttpLoggingLayer {
    type Service = HttpLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpLoggingService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Tower service implementation for the HTTP logging middleware.
///
/// Wraps an inner service; for each request it taps the request body, runs the inner
/// service in the same task, buffers the response body when it is going to be logged, emits
/// the exchange records and finally hands the response back with its original bytes.
///
/// Users typically don't interact with this type directly - it's created by
/// [`HttpLoggingLayer`].
#[derive(Clone, Debug)]
pub struct HttpLoggingService<S> {
    inner: S,
    logger: EventLogger,
}

impl<S> Service<Request> for HttpLoggingService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, mut request: Request) -> Self::Future {
        if !self.logger.is_enabled() {
            return Box::pin(self.inner.call(request));
        }

        let logger = self.logger.clone();
        let config = logger.config();
        let captures_info_detail = logger.policy().captures_info_detail();

        let mut exchange = CapturedExchange::new(
            generate_correlation_id(),
            request.method().clone(),
            request.uri().clone(),
        );
        debug!(
            correlation_id = %exchange.correlation_id,
            method = %exchange.method,
            uri = %exchange.uri,
            "Starting request processing"
        );

        if config.log_request_headers && captures_info_detail {
            exchange.request_headers = Some(convert_headers(request.headers()));
        }

        let request_tap = if config.captures_request_body() {
            let body = std::mem::replace(request.body_mut(), Body::empty());
            let (body, tap) = tap_body(body);
            *request.body_mut() = body;
            Some(tap)
        } else {
            None
        };
        let capture_response_headers = config.log_response_headers && captures_info_detail;
        let capture_response_body = config.captures_response_body();

        let mut in_flight = InFlight::new(logger.clone(), &exchange);
        let future = self.inner.call(request);

        Box::pin(async move {
            let outcome = AssertUnwindSafe(future).catch_unwind().await;
            debug!(correlation_id = %exchange.correlation_id, "Inner service finished");

            match outcome {
                Ok(Ok(mut response)) => {
                    let buffer = if capture_response_body {
                        let body = std::mem::replace(response.body_mut(), Body::empty());
                        Some(ResponseBuffer::capture(body).await)
                    } else {
                        None
                    };
                    in_flight.disarm();

                    exchange.status = response.status();
                    exchange.duration = in_flight.elapsed();
                    if capture_response_headers {
                        exchange.response_headers = Some(convert_headers(response.headers()));
                    }
                    fill_request_body(&mut exchange, request_tap);
                    exchange.response_body = buffer.as_ref().map(|b| b.content().clone());

                    log_isolated(|| logger.log_exchange(&exchange));

                    if let Some(mut buffer) = buffer {
                        buffer.copy_body_to_response(&mut response);
                    }
                    Ok(response)
                }
                Ok(Err(e)) => {
                    in_flight.disarm();
                    exchange.duration = in_flight.elapsed();
                    fill_request_body(&mut exchange, request_tap);

                    log_isolated(|| logger.log_exchange_failure(&exchange, &e.to_string()));
                    Err(e)
                }
                Err(payload) => {
                    in_flight.disarm();
                    exchange.duration = in_flight.elapsed();
                    fill_request_body(&mut exchange, request_tap);

                    let message = format!("handler {}", panic_message(&*payload));
                    log_isolated(|| logger.log_exchange_failure(&exchange, &message));
                    panic::resume_unwind(payload)
                }
            }
        })
    }
}

/// Logs a cancellation if the request future is dropped before the exchange completes.
struct InFlight {
    logger: EventLogger,
    exchange: Option<CapturedExchange>,
    started_at: Instant,
}

impl InFlight {
    fn new(logger: EventLogger, exchange: &CapturedExchange) -> Self {
        Self {
            logger,
            exchange: Some(exchange.clone()),
            started_at: Instant::now(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn disarm(&mut self) {
        self.exchange = None;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(mut exchange) = self.exchange.take() {
            exchange.duration = self.elapsed();
            log_isolated(|| self.logger.log_exchange_cancelled(&exchange));
        }
    }
}

fn fill_request_body(exchange: &mut CapturedExchange, tap: Option<BodyTap>) {
    if let Some(tap) = tap {
        let (content, failure) = tap.into_parts();
        exchange.request_body = Some(content);
        exchange.request_body_error = failure.map(|e| e.to_string());
    }
}

/// Runs a logging step so that a panic inside it cannot skip what follows.
fn log_isolated(log: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(log)).is_err() {
        warn!("Exchange logging panicked; continuing without its records");
    }
}
