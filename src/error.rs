//! Error types shared across the crate.

use std::any::Any;

/// Failure to deliver a record to a [`LogSink`](crate::LogSink).
///
/// These never reach the code being logged: the [`EventLogger`](crate::EventLogger) swallows
/// them after a best-effort fallback report.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("log sink unavailable: {0}")]
    Unavailable(String),
    #[error("log sink state poisoned by a panicking writer")]
    Poisoned,
    #[error("log sink {0}")]
    Panicked(String),
}

/// Error returned by a traced operation.
///
/// Wraps the operation's own error, which stays reachable through [`AdviceError::inner`],
/// [`AdviceError::into_inner`] and `std::error::Error::source`.
#[derive(Debug, thiserror::Error)]
#[error("traced operation `{operation}` failed: {source}")]
pub struct AdviceError<E> {
    operation: String,
    #[source]
    source: E,
}

impl<E> AdviceError<E> {
    pub(crate) fn new(operation: impl Into<String>, source: E) -> Self {
        Self {
            operation: operation.into(),
            source,
        }
    }

    /// Name of the operation that failed.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The operation's original error.
    pub fn inner(&self) -> &E {
        &self.source
    }

    pub fn into_inner(self) -> E {
        self.source
    }
}

/// Describes a panic payload as `panicked: <message>`, or `panicked` when the payload is not
/// a string.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("panicked: {detail}"),
        None => "panicked".to_string(),
    }
}
