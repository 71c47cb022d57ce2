//! Composite sink for fanning records out to several sinks.
//!
//! This module provides [`MultiSink`], which forwards every record to an arbitrary number of
//! [`LogSink`] implementations in the order they were added.
//!
//! # Example
//!
//! ```rust
//! use http_logging::{MemorySink, MultiSink, TracingSink};
//!
//! let memory = MemorySink::new();
//! let sink = MultiSink::new()
//!     .with(TracingSink)
//!     .with(memory.clone());
//!
//! // Use with HttpLoggingLayer
//! // let layer = HttpLoggingLayer::new(config, sink);
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{panic_message, SinkError};
use crate::types::LogRecord;
use crate::LogSink;

/// A sink that delegates to multiple inner sinks.
///
/// Sinks run sequentially in registration order, so every sink observes records in the same
/// order. A failing sink does not stop the rest; the first failure is returned after all
/// sinks have been offered the record. A panicking sink is reported as
/// [`SinkError::Panicked`].
#[derive(Clone, Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl MultiSink {
    /// Create a new empty MultiSink.
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add a sink to the chain. Returns self for builder pattern.
    pub fn with<L: LogSink>(mut self, sink: L) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Returns true if no sinks have been added.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Returns the number of sinks in the chain.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }
}

impl std::fmt::Debug for MultiSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl LogSink for MultiSink {
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            let result = panic::catch_unwind(AssertUnwindSafe(|| sink.emit(record)))
                .unwrap_or_else(|payload| Err(SinkError::Panicked(panic_message(&*payload))));
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
