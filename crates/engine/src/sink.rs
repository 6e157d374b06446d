// SPDX-License-Identifier: MIT

//! The sink and dead-letter-queue capabilities the Dispatcher calls
//! (spec.md §6 External interfaces). Concrete sinks — wire protocols,
//! local file rotation — are out of scope here; `ltap-adapters` provides
//! reference implementations and the daemon wires in real ones.

use async_trait::async_trait;
use ltap_core::LogRecord;
use std::fmt;

#[derive(Debug, Clone)]
pub struct SinkError {
    pub reason: String,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for SinkError {}

impl SinkError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// A downstream destination a worker fans a record out to (spec.md §6).
/// `send` is "synchronous best-effort delivery" from the worker's point of
/// view: it may batch internally, but it must return within its own
/// configured timeout rather than block the worker indefinitely.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn send(&self, record: &LogRecord) -> Result<(), SinkError>;
    async fn is_healthy(&self) -> bool;
    fn name(&self) -> &str;
}

/// Persistent holding area for records a sink could not deliver
/// (spec.md §6: "enqueue(record, sink_name, failure_reason)").
#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    async fn enqueue(&self, record: LogRecord, sink_name: &str, failure_reason: &str);
}
