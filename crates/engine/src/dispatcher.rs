// SPDX-License-Identifier: MIT

//! Bounded intake queue fanning out to a fixed worker pool and onward to
//! every registered sink (spec.md §4.3). The discipline is
//! producer-drops, not consumer-blocks: `handle` never blocks the caller
//! and returns `QueueFull` once the queue is saturated, instead of
//! letting a slow sink stall ingestion (spec.md §9 Design Notes).

use crate::sink::{DeadLetterQueue, Sink};
use chrono::{DateTime, Utc};
use ltap_core::{Clock, LabelMap, LogRecord, Metrics, SourceType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatcher queue is full")]
    QueueFull,
    #[error("dispatcher has been stopped")]
    Stopped,
}

#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub enqueued: u64,
    pub processed: u64,
    pub dropped: u64,
    pub sink_failures: u64,
}

struct Counters {
    enqueued: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    sink_failures: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self { enqueued: AtomicU64::new(0), processed: AtomicU64::new(0), dropped: AtomicU64::new(0), sink_failures: AtomicU64::new(0) }
    }
}

pub struct DispatcherConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub emergency_threshold: f64,
}

struct Inner<C: Clock> {
    clock: C,
    config: DispatcherConfig,
    tx: mpsc::Sender<LogRecord>,
    rx: AsyncMutex<Option<mpsc::Receiver<LogRecord>>>,
    sinks: Vec<Arc<dyn Sink>>,
    dlq: Arc<dyn DeadLetterQueue>,
    metrics: Metrics,
    counters: Counters,
    cancel: CancellationToken,
    stopped: std::sync::atomic::AtomicBool,
}

/// `handle()` is safe to call concurrently from many supervisor loops;
/// `start()` must be called exactly once after every sink is registered.
#[derive(Clone)]
pub struct Dispatcher<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Dispatcher<C> {
    pub fn new(clock: C, config: DispatcherConfig, sinks: Vec<Arc<dyn Sink>>, dlq: Arc<dyn DeadLetterQueue>, metrics: Metrics) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        Self {
            inner: Arc::new(Inner {
                clock,
                config,
                tx,
                rx: AsyncMutex::new(Some(rx)),
                sinks,
                dlq,
                metrics,
                counters: Counters::default(),
                cancel: CancellationToken::new(),
                stopped: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Primary ingress from supervisors (spec.md §6). Never blocks: the
    /// queue's own bound is enforced by `try_send`, and the three
    /// backpressure thresholds only drive logging/metrics, never blocking.
    pub fn handle(&self, source_type: SourceType, source_id: impl Into<String>, message: impl Into<String>, labels: LabelMap, timestamp: DateTime<Utc>) -> Result<(), DispatchError> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(DispatchError::Stopped);
        }

        let source_id = source_id.into();
        let utilization = self.report_backpressure(&source_id);
        if utilization >= self.inner.config.emergency_threshold {
            self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
            self.inner.metrics.drops("dispatcher", "emergency_threshold");
            return Err(DispatchError::QueueFull);
        }

        let record = LogRecord::new(self.inner.clock.now_utc(), timestamp, source_type, source_id.clone(), message, labels);
        match self.inner.tx.try_send(record) {
            Ok(()) => {
                self.inner.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                self.inner.metrics.logs_processed(source_type.as_label(), &source_id, "dispatcher");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
                self.inner.metrics.drops("dispatcher", "queue_full");
                Err(DispatchError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Stopped),
        }
    }

    fn report_backpressure(&self, source_id: &str) -> f64 {
        let utilization = self.queue_utilization();
        self.inner.metrics.set_queue_utilization(utilization);
        if utilization >= self.inner.config.emergency_threshold {
            tracing::warn!(component = "dispatcher", source_id, utilization, "queue at emergency threshold, new records will be dropped");
        } else if utilization >= self.inner.config.critical_threshold {
            tracing::warn!(component = "dispatcher", source_id, utilization, "queue at critical threshold");
        } else if utilization >= self.inner.config.warning_threshold {
            tracing::info!(component = "dispatcher", source_id, utilization, "queue at warning threshold");
        }
        utilization
    }

    pub fn queue_utilization(&self) -> f64 {
        let capacity = self.inner.config.queue_size.max(1) as f64;
        let remaining = self.inner.tx.capacity() as f64;
        ((capacity - remaining) / capacity).clamp(0.0, 1.0)
    }

    /// Spawns the worker pool. Consumes the shared receiver; returns
    /// `DispatchError::Stopped` if called more than once.
    pub fn start(&self) -> Result<Vec<tokio::task::JoinHandle<()>>, DispatchError> {
        let receiver = self.inner.rx.try_lock().ok().and_then(|mut guard| guard.take()).ok_or(DispatchError::Stopped)?;
        let shared_rx = Arc::new(AsyncMutex::new(receiver));

        Ok((0..self.inner.config.workers.max(1))
            .map(|worker_id| {
                let inner = Arc::clone(&self.inner);
                let shared_rx = Arc::clone(&shared_rx);
                tokio::spawn(async move { Self::worker_loop(worker_id, inner, shared_rx).await })
            })
            .collect())
    }

    async fn worker_loop(worker_id: usize, inner: Arc<Inner<C>>, shared_rx: Arc<AsyncMutex<mpsc::Receiver<LogRecord>>>) {
        loop {
            let record = {
                let mut rx = shared_rx.lock().await;
                tokio::select! {
                    biased;
                    _ = inner.cancel.cancelled() => None,
                    record = rx.recv() => record,
                }
            };
            let Some(record) = record else {
                tracing::debug!(component = "dispatcher", worker_id, "worker exiting");
                return;
            };
            Self::fan_out(&inner, &record).await;
            inner.counters.processed.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn fan_out(inner: &Inner<C>, record: &LogRecord) {
        for sink in &inner.sinks {
            let started = inner.clock.now();
            let result = sink.send(record).await;
            inner.metrics.record_sink_send_duration(sink.name(), inner.clock.now().duration_since(started));
            if let Err(err) = result {
                inner.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
                inner.metrics.errors("dispatcher", "sink_send_failed");
                tracing::warn!(component = "dispatcher", sink = sink.name(), error = %err, "sink rejected record, routing to dead-letter queue");
                inner.dlq.enqueue(record.clone(), sink.name(), &err.reason).await;
            }
        }
    }

    /// Cancels workers, drains whatever remains in the queue up to
    /// `deadline`, and writes any leftover records to the DLQ
    /// (spec.md §4.3, §5).
    pub async fn stop(&self, deadline: std::time::Duration) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.cancel.cancel();

        let drain = async {
            let mut rx_guard = self.inner.rx.lock().await;
            if let Some(rx) = rx_guard.as_mut() {
                while let Ok(record) = rx.try_recv() {
                    self.inner.dlq.enqueue(record, "shutdown", "dispatcher stopped with records in flight").await;
                }
            }
        };
        let _ = tokio::time::timeout(deadline, drain).await;
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            enqueued: self.inner.counters.enqueued.load(Ordering::Relaxed),
            processed: self.inner.counters.processed.load(Ordering::Relaxed),
            dropped: self.inner.counters.dropped.load(Ordering::Relaxed),
            sink_failures: self.inner.counters.sink_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ltap_core::SystemClock;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::Arc as StdArc;

    struct RecordingSink {
        name: String,
        fail_next: std::sync::atomic::AtomicBool,
        received: StdArc<SyncMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn send(&self, record: &LogRecord) -> Result<(), crate::sink::SinkError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(crate::sink::SinkError::new("injected failure"));
            }
            self.received.lock().push(record.message.clone());
            Ok(())
        }

        async fn is_healthy(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    struct RecordingDlq {
        entries: StdArc<SyncMutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl DeadLetterQueue for RecordingDlq {
        async fn enqueue(&self, record: LogRecord, sink_name: &str, failure_reason: &str) {
            self.entries.lock().push((record.message, format!("{sink_name}:{failure_reason}")));
        }
    }

    fn config(workers: usize, queue_size: usize) -> DispatcherConfig {
        DispatcherConfig { workers, queue_size, warning_threshold: 0.75, critical_threshold: 0.90, emergency_threshold: 0.95 }
    }

    #[tokio::test]
    async fn handle_delivers_to_all_sinks() {
        let received = StdArc::new(SyncMutex::new(Vec::new()));
        let sink = StdArc::new(RecordingSink { name: "primary".into(), fail_next: std::sync::atomic::AtomicBool::new(false), received: received.clone() });
        let dlq = StdArc::new(RecordingDlq { entries: StdArc::new(SyncMutex::new(Vec::new())) });
        let dispatcher = Dispatcher::new(SystemClock, config(1, 10), vec![sink], dlq, Metrics::noop());
        let handles = dispatcher.start().unwrap();

        dispatcher.handle(SourceType::File, "src1", "hello", LabelMap::new(), Utc::now()).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        dispatcher.stop(std::time::Duration::from_secs(1)).await;
        for handle in handles {
            let _ = handle.await;
        }

        assert_eq!(*received.lock(), vec!["hello".to_string()]);
        assert_eq!(dispatcher.stats().processed, 1);
    }

    #[tokio::test]
    async fn sink_failure_routes_to_dlq_without_blocking_other_sinks() {
        let received_a = StdArc::new(SyncMutex::new(Vec::new()));
        let received_b = StdArc::new(SyncMutex::new(Vec::new()));
        let sink_a = StdArc::new(RecordingSink { name: "a".into(), fail_next: std::sync::atomic::AtomicBool::new(true), received: received_a.clone() });
        let sink_b = StdArc::new(RecordingSink { name: "b".into(), fail_next: std::sync::atomic::AtomicBool::new(false), received: received_b.clone() });
        let entries = StdArc::new(SyncMutex::new(Vec::new()));
        let dlq = StdArc::new(RecordingDlq { entries: entries.clone() });
        let dispatcher = Dispatcher::new(SystemClock, config(1, 10), vec![sink_a, sink_b], dlq, Metrics::noop());
        let handles = dispatcher.start().unwrap();

        dispatcher.handle(SourceType::Container, "c1", "boom", LabelMap::new(), Utc::now()).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        dispatcher.stop(std::time::Duration::from_secs(1)).await;
        for handle in handles {
            let _ = handle.await;
        }

        assert!(received_a.lock().is_empty());
        assert_eq!(*received_b.lock(), vec!["boom".to_string()]);
        assert_eq!(entries.lock().len(), 1);
        assert_eq!(dispatcher.stats().sink_failures, 1);
    }

    #[tokio::test]
    async fn queue_full_drops_and_reports_error() {
        let received = StdArc::new(SyncMutex::new(Vec::new()));
        let sink = StdArc::new(RecordingSink { name: "slow".into(), fail_next: std::sync::atomic::AtomicBool::new(false), received });
        let dlq = StdArc::new(RecordingDlq { entries: StdArc::new(SyncMutex::new(Vec::new())) });
        // Zero workers started: nothing drains the queue, so it fills immediately.
        let dispatcher = Dispatcher::new(SystemClock, config(1, 1), vec![sink], dlq, Metrics::noop());

        dispatcher.handle(SourceType::File, "src1", "one", LabelMap::new(), Utc::now()).unwrap();
        let result = dispatcher.handle(SourceType::File, "src1", "two", LabelMap::new(), Utc::now());
        assert_eq!(result, Err(DispatchError::QueueFull));
        assert_eq!(dispatcher.stats().dropped, 1);
    }

    #[tokio::test]
    async fn stop_flushes_remaining_queue_to_dlq() {
        let sink = StdArc::new(RecordingSink { name: "never-started".into(), fail_next: std::sync::atomic::AtomicBool::new(false), received: StdArc::new(SyncMutex::new(Vec::new())) });
        let entries = StdArc::new(SyncMutex::new(Vec::new()));
        let dlq = StdArc::new(RecordingDlq { entries: entries.clone() });
        let dispatcher = Dispatcher::new(SystemClock, config(1, 10), vec![sink], dlq, Metrics::noop());

        dispatcher.handle(SourceType::File, "src1", "stranded", LabelMap::new(), Utc::now()).unwrap();
        dispatcher.stop(std::time::Duration::from_secs(1)).await;

        assert_eq!(entries.lock().len(), 1);
    }
}
