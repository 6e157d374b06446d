// SPDX-License-Identifier: MIT

//! Reference sink and dead-letter-queue implementations. Concrete wire
//! protocols are out of scope (spec.md §1 Non-goals); these cover the
//! null/in-memory cases every daemon wiring and every test needs.

use async_trait::async_trait;
use ltap_core::LogRecord;
use ltap_engine::sink::{DeadLetterQueue, Sink, SinkError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Discards every record. Useful as a placeholder sink and in benchmarks
/// that want to isolate dispatcher overhead from sink latency.
#[derive(Debug, Clone, Default)]
pub struct NullSink;

#[async_trait]
impl Sink for NullSink {
    async fn send(&self, _record: &LogRecord) -> Result<(), SinkError> {
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    pub record: LogRecord,
    pub sink_name: String,
    pub failure_reason: String,
}

/// In-memory dead-letter queue. Durable DLQ storage is a concrete sink
/// concern left to the daemon wiring (spec.md §1 Non-goals).
#[derive(Clone, Default)]
pub struct MemoryDeadLetterQueue {
    entries: Arc<Mutex<Vec<DeadLetterEntry>>>,
}

impl MemoryDeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeadLetterQueue for MemoryDeadLetterQueue {
    async fn enqueue(&self, record: LogRecord, sink_name: &str, failure_reason: &str) {
        self.entries.lock().push(DeadLetterEntry { record, sink_name: sink_name.to_string(), failure_reason: failure_reason.to_string() });
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Sink whose next `send` can be scripted to fail, for dispatcher and
    /// supervisor tests that need to observe DLQ routing.
    pub struct FakeSink {
        name: String,
        fail_next: AtomicBool,
        received: Mutex<Vec<LogRecord>>,
    }

    impl FakeSink {
        pub fn new(name: impl Into<String>) -> Self {
            Self { name: name.into(), fail_next: AtomicBool::new(false), received: Mutex::new(Vec::new()) }
        }

        pub fn fail_next_send(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        pub fn received(&self) -> Vec<LogRecord> {
            self.received.lock().clone()
        }
    }

    #[async_trait]
    impl Sink for FakeSink {
        async fn send(&self, record: &LogRecord) -> Result<(), SinkError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(SinkError::new("scripted failure"));
            }
            self.received.lock().push(record.clone());
            Ok(())
        }

        async fn is_healthy(&self) -> bool {
            !self.fail_next.load(Ordering::SeqCst)
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ltap_core::{LabelMap, SourceType};

    fn record() -> LogRecord {
        LogRecord::new(Utc::now(), Utc::now(), SourceType::File, "src", "hello", LabelMap::new())
    }

    #[tokio::test]
    async fn null_sink_always_succeeds() {
        assert!(NullSink.send(&record()).await.is_ok());
    }

    #[tokio::test]
    async fn memory_dlq_records_failure_reason() {
        let dlq = MemoryDeadLetterQueue::new();
        dlq.enqueue(record(), "primary", "timeout").await;
        let entries = dlq.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sink_name, "primary");
        assert_eq!(entries[0].failure_reason, "timeout");
    }
}
