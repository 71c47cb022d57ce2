//! In-memory sink for tests and diagnostics.

use std::sync::{Arc, Mutex};

use crate::error::SinkError;
use crate::severity::LogSeverity;
use crate::types::LogRecord;
use crate::LogSink;

/// [`LogSink`] that keeps every record in memory.
///
/// Clones share the same storage, so a host test can hand one clone to the middleware and
/// inspect the records through another.
///
/// # Examples
///
/// ```rust
/// use http_logging::{EventLogger, LoggingConfig, MemorySink};
///
/// let sink = MemorySink::new();
/// let logger = EventLogger::new(LoggingConfig::default(), sink.clone());
/// let _ = logger.traced("ping", || Ok::<_, std::io::Error>(()));
/// assert_eq!(sink.records().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record emitted so far, in emission order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Records at exactly `severity`.
    pub fn records_at(&self, severity: LogSeverity) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.severity == severity)
            .collect()
    }

    /// Records whose message contains `needle`.
    pub fn find(&self, needle: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.message.contains(needle))
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        let mut records = self.records.lock().map_err(|_| SinkError::Poisoned)?;
        records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_storage() {
        let sink = MemorySink::new();
        let other = sink.clone();
        other
            .emit(&LogRecord::new(LogSeverity::Info, "first"))
            .unwrap();
        other
            .emit(&LogRecord::new(LogSeverity::Error, "second"))
            .unwrap();

        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.records_at(LogSeverity::Error)[0].message, "second");
        assert_eq!(sink.find("fir").len(), 1);

        sink.clear();
        assert!(other.records().is_empty());
    }
}
