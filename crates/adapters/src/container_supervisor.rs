// SPDX-License-Identifier: MIT

//! Discovers running containers and streams their logs (spec.md §4.5).
//! Three failure modes drive the design: leaked collectors on blocked
//! reads, watchdog timeouts from loops that forget to heartbeat, and
//! feedback loops where the agent ingests its own output.
//!
//! The source material's "context-aware reader" (a wrapper that checks a
//! cancellation flag before every blocking read) has no counterpart here:
//! `tokio::select!` racing the stream's `next()` against
//! `cancel.cancelled()` gives the same leak-free cancellation natively,
//! so the collector loop below selects directly rather than wrapping the
//! stream in anything.

use crate::host_info::{detect_host_ipv4, detect_hostname};
use crate::runtime_client::{ContainerLifecycleKind, ContainerRuntimeClient, LogChunk, RuntimeClientError};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use ltap_core::config::validate::ContainerSupervisorConfig;
use ltap_core::container::{ContainerMetadata, ContainerStreamState};
use ltap_core::errors::{validate_timestamp, TimestampAction};
use ltap_core::{container_source_id, short, Clock, LabelMap, Metrics, SourceType};
use ltap_engine::feedback_guard::ExclusionSink;
use ltap_engine::{Dispatcher, FeedbackGuard, StreamPool, TaskManager};
use ltap_storage::MetadataCache;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Label key prefixes never forwarded from a container's own labels:
/// compose/OCI metadata is high-cardinality and rarely useful downstream
/// (spec.md §4.5.2, §6).
const FORBIDDEN_LABEL_PATTERNS: &[&str] = &["com.docker.compose.*", "org.opencontainers.*", "io.kubernetes.*"];

const TASK_ID: &str = "container_supervisor";
const LIFECYCLE_RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(3);
const STREAM_ERROR_PAUSE: std::time::Duration = std::time::Duration::from_secs(1);
const FEEDBACK_DETECTION_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);
const FEEDBACK_CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerSupervisorStats {
    pub active_collectors: usize,
    pub excluded: usize,
}

enum RotationOutcome {
    Cancelled,
    Timeout,
    StreamEnded,
    Error(RuntimeClientError),
}

struct Inner<C: Clock> {
    clock: C,
    config: ContainerSupervisorConfig,
    runtime: Arc<dyn ContainerRuntimeClient>,
    dispatcher: Dispatcher<C>,
    task_manager: TaskManager<C>,
    stream_pool: StreamPool<C>,
    feedback_guard: FeedbackGuard<C>,
    metadata_cache: MetadataCache<C>,
    metrics: Metrics,
    service_name: String,
    hostname: String,
    host_ipv4: String,
    collectors: Mutex<HashMap<String, CollectorHandle>>,
    excluded: Mutex<HashSet<String>>,
}

struct CollectorHandle {
    cancel: CancellationToken,
}

/// Capability the feedback guard uses to mutate the exclusion list,
/// without holding a reference to the supervisor itself (spec.md §9
/// "Cyclic ownership").
struct SupervisorExclusions<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> ExclusionSink for SupervisorExclusions<C> {
    fn add_exclusion(&self, container_name: &str, container_id: &str) {
        self.inner.excluded.lock().insert(container_id.to_string());
        self.inner.excluded.lock().insert(container_name.to_string());
    }
}

/// Owns the collector map and the lifecycle subscriber loop that drives
/// `start_collecting`/`stop_collecting` (spec.md §3, §4.5).
#[derive(Clone)]
pub struct ContainerSupervisor<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> ContainerSupervisor<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: C,
        config: ContainerSupervisorConfig,
        runtime: Arc<dyn ContainerRuntimeClient>,
        dispatcher: Dispatcher<C>,
        task_manager: TaskManager<C>,
        metrics: Metrics,
        service_name: impl Into<String>,
    ) -> Self {
        let stream_pool = StreamPool::new(clock.clone(), config.stream_pool_capacity);
        let feedback_guard = FeedbackGuard::new(
            clock.clone(),
            config.feedback_guard.window,
            config.feedback_guard.threshold,
            config.feedback_guard.min_sample_size,
            metrics.clone(),
        );
        let metadata_cache = MetadataCache::new(config.metadata_cache_ttl, clock.clone());
        let excluded = config.exclusion_list.iter().cloned().collect();

        Self {
            inner: Arc::new(Inner {
                clock,
                config,
                runtime,
                dispatcher,
                task_manager,
                stream_pool,
                feedback_guard,
                metadata_cache,
                metrics,
                service_name: service_name.into(),
                hostname: detect_hostname(),
                host_ipv4: detect_host_ipv4(),
                collectors: Mutex::new(HashMap::new()),
                excluded: Mutex::new(excluded),
            }),
        }
    }

    pub fn stats(&self) -> ContainerSupervisorStats {
        ContainerSupervisorStats { active_collectors: self.inner.collectors.lock().len(), excluded: self.inner.excluded.lock().len() }
    }

    /// Registers the lifecycle subscriber and the feedback guard's two
    /// periodic loops under the Task Manager, then runs the initial scan
    /// (spec.md §4.5.1).
    pub async fn start(&self) -> tokio::task::JoinHandle<()> {
        let exclusions: Arc<dyn ExclusionSink> = Arc::new(SupervisorExclusions { inner: self.inner.clone() });
        self.inner.feedback_guard.spawn_loops(FEEDBACK_DETECTION_INTERVAL, FEEDBACK_CLEANUP_INTERVAL, exclusions);

        self.initial_scan().await;

        let cancel = self.inner.task_manager.register(TASK_ID);
        let supervisor = self.clone();
        tokio::spawn(async move { supervisor.run_lifecycle_subscriber(cancel).await })
    }

    pub fn stop(&self) {
        self.inner.task_manager.stop(TASK_ID);
    }

    async fn initial_scan(&self) {
        match self.inner.runtime.list_containers().await {
            Ok(summaries) => {
                for summary in summaries {
                    self.start_collecting(&summary.id).await;
                }
            }
            Err(error) => {
                tracing::warn!(component = TASK_ID, %error, "initial container scan failed");
                self.inner.metrics.errors(TASK_ID, "initial_scan_failed");
            }
        }
    }

    /// Subscribes to the runtime's lifecycle event stream, reconnecting
    /// with a fixed backoff on stream errors (spec.md §4.5.1). Terminates
    /// only on supervisor cancellation.
    async fn run_lifecycle_subscriber(&self, cancel: CancellationToken) {
        let mut last_heartbeat = self.inner.clock.now();
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let mut events = match self.inner.runtime.events().await {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::warn!(component = TASK_ID, %error, "lifecycle event subscription failed, reconnecting");
                    self.inner.metrics.stream_errors("lifecycle_subscribe_failed", "");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(LIFECYCLE_RECONNECT_DELAY) => continue,
                    }
                }
            };

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::info!(component = TASK_ID, "stopping lifecycle subscriber");
                        return;
                    }
                    event = events.next() => {
                        match event {
                            Some(Ok(event)) => {
                                match event.kind {
                                    ContainerLifecycleKind::Start => self.start_collecting(&event.container_id).await,
                                    ContainerLifecycleKind::Die => self.stop_collecting(&event.container_id).await,
                                }
                            }
                            Some(Err(error)) => {
                                tracing::warn!(component = TASK_ID, %error, "lifecycle event stream error, reconnecting");
                                break;
                            }
                            None => {
                                tracing::warn!(component = TASK_ID, "lifecycle event stream ended, reconnecting");
                                break;
                            }
                        }
                    }
                }

                let now = self.inner.clock.now();
                if now.duration_since(last_heartbeat) >= std::time::Duration::from_secs(30) {
                    self.inner.task_manager.heartbeat(TASK_ID);
                    last_heartbeat = now;
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(LIFECYCLE_RECONNECT_DELAY) => {}
            }
        }
    }

    /// Starts a collector for `container_id` (spec.md §4.5.2). Idempotent:
    /// a container with an active collector, or on the exclusion list, is
    /// skipped.
    pub async fn start_collecting(&self, container_id: &str) {
        if self.inner.collectors.lock().contains_key(container_id) {
            return;
        }
        if self.is_excluded(container_id) {
            tracing::debug!(component = TASK_ID, container_id, "skipping excluded container");
            return;
        }

        if self.inner.stream_pool.acquire(container_id).is_err() {
            tracing::warn!(component = TASK_ID, container_id, "stream pool at capacity, skipping container");
            self.inner.metrics.drops(TASK_ID, "stream_pool_at_capacity");
            return;
        }

        let cancel = CancellationToken::new();
        self.inner.collectors.lock().insert(container_id.to_string(), CollectorHandle { cancel: cancel.clone() });

        let supervisor = self.clone();
        let container_id = container_id.to_string();
        tokio::spawn(async move {
            supervisor.collect(container_id.clone(), cancel).await;
            supervisor.inner.collectors.lock().remove(&container_id);
            supervisor.inner.stream_pool.release(&container_id);
        });
    }

    /// Stops a collector for `container_id` via the drain protocol
    /// (spec.md §4.5.3): the mutex is released before the drain sleep so
    /// the collector map is never locked across a blocking wait.
    pub async fn stop_collecting(&self, container_id: &str) {
        let cancel = { self.inner.collectors.lock().get(container_id).map(|h| h.cancel.clone()) };
        let Some(cancel) = cancel else { return };

        tokio::time::sleep(self.inner.config.drain_duration).await;
        cancel.cancel();
    }

    fn is_excluded(&self, container_id: &str) -> bool {
        self.inner.excluded.lock().contains(container_id)
    }

    async fn fetch_metadata(&self, container_id: &str) -> Result<ContainerMetadata, RuntimeClientError> {
        if let Some(cached) = self.inner.metadata_cache.get(container_id) {
            return Ok(cached);
        }
        let detail = self.inner.runtime.inspect(container_id).await?;
        let primary_network = detail.networks.keys().next().cloned();
        let metadata = ContainerMetadata {
            name: detail.name,
            image: detail.image,
            state: if detail.running { "running".to_string() } else { "exited".to_string() },
            hostname: detail.hostname,
            platform: detail.platform,
            command: detail.command,
            networks: detail.networks,
            primary_network,
            container_labels: detail.labels,
        };
        self.inner.metadata_cache.set(container_id.to_string(), metadata.clone());
        Ok(metadata)
    }

    /// Runs one container's collector across as many rotations as needed
    /// until cancelled (spec.md §4.5.2, §4.5.4).
    async fn collect(&self, container_id: String, cancel: CancellationToken) {
        let metadata = match self.fetch_metadata(&container_id).await {
            Ok(meta) => meta,
            Err(error) => {
                tracing::warn!(component = TASK_ID, container_id, %error, "metadata lookup failed, aborting collector");
                self.inner.metrics.errors(TASK_ID, "metadata_lookup_failed");
                return;
            }
        };

        let mut state = ContainerStreamState::new(container_id.clone(), metadata.name.clone(), LabelMap::new(), self.inner.clock.now_utc(), cancel.clone());

        loop {
            let since = state.last_read_at;
            let stream = match self.inner.runtime.container_logs(&container_id, true, since).await {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::warn!(component = TASK_ID, container_id, %error, "failed to open log stream, retrying");
                    self.inner.metrics.stream_errors("open_failed", &container_id);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(STREAM_ERROR_PAUSE) => continue,
                    }
                }
            };

            match self.run_rotation(&container_id, &metadata, &mut state, stream, &cancel).await {
                RotationOutcome::Cancelled => {
                    tracing::info!(component = TASK_ID, container_id, "collector cancelled");
                    return;
                }
                RotationOutcome::Timeout => {
                    state.mark_rotated(self.inner.clock.now_utc());
                    self.inner.task_manager.heartbeat(TASK_ID);
                    tracing::debug!(component = TASK_ID, container_id, rotation_count = state.rotation_count, "stream rotated");
                }
                RotationOutcome::StreamEnded => {
                    self.inner.task_manager.heartbeat(TASK_ID);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(STREAM_ERROR_PAUSE) => {}
                    }
                }
                RotationOutcome::Error(error) => {
                    tracing::warn!(component = TASK_ID, container_id, %error, "stream read error, reconnecting");
                    self.inner.metrics.stream_errors("read_failed", &container_id);
                    self.inner.task_manager.heartbeat(TASK_ID);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(STREAM_ERROR_PAUSE) => {}
                    }
                }
            }
        }
    }

    /// Drives one stream open until `rotation_interval` elapses, the
    /// collector is cancelled, or the stream ends/errors (spec.md
    /// §4.5.4). Racing `cancel.cancelled()` and a timeout against the
    /// stream's `next()` is this crate's substitute for the source
    /// material's context-aware reader.
    async fn run_rotation(
        &self,
        container_id: &str,
        metadata: &ContainerMetadata,
        state: &mut ContainerStreamState,
        mut stream: crate::runtime_client::LogChunkStream,
        cancel: &CancellationToken,
    ) -> RotationOutcome {
        let rotation_deadline = self.inner.clock.now() + self.inner.config.rotation_interval;

        loop {
            let remaining = rotation_deadline.saturating_duration_since(self.inner.clock.now());
            if remaining.is_zero() {
                return RotationOutcome::Timeout;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return RotationOutcome::Cancelled,
                outcome = tokio::time::timeout(remaining, stream.next()) => {
                    match outcome {
                        Err(_) => return RotationOutcome::Timeout,
                        Ok(None) => return RotationOutcome::StreamEnded,
                        Ok(Some(Err(error))) => return RotationOutcome::Error(error),
                        Ok(Some(Ok(chunk))) => {
                            self.dispatch_chunk(container_id, metadata, state, chunk);
                        }
                    }
                }
            }
        }
    }

    /// Handles one demultiplexed chunk (spec.md §4.5.2 step 7): builds
    /// record labels, enriches from metadata, dispatches, and notifies
    /// the feedback guard. Dispatch failures are logged and counted, but
    /// never propagated — the stream must keep flowing.
    fn dispatch_chunk(&self, container_id: &str, metadata: &ContainerMetadata, state: &mut ContainerStreamState, chunk: LogChunk) {
        let (stream_name, bytes) = match chunk {
            LogChunk::Stdout(bytes) => ("stdout", bytes),
            LogChunk::Stderr(bytes) => ("stderr", bytes),
        };
        let raw = String::from_utf8_lossy(&bytes);
        let now = self.inner.clock.now_utc();

        for line in raw.lines() {
            let (timestamp, message) = split_docker_timestamp(line, now);

            let validation = validate_timestamp(timestamp, now, chrono::Duration::seconds(30), TimestampAction::Clamp);
            let record_timestamp = match validation.action {
                TimestampAction::Reject => {
                    self.inner.metrics.old_logs_ignored(TASK_ID, container_id);
                    continue;
                }
                TimestampAction::Clamp => now,
                TimestampAction::Accept => timestamp,
            };

            let mut labels = LabelMap::new();
            labels.insert("service", self.inner.service_name.as_str());
            labels.insert("source", "container");
            labels.insert("instance", self.inner.host_ipv4.as_str());
            labels.insert("instance_name", self.inner.hostname.as_str());
            labels.insert("container_id", short(container_id, 12));
            labels.insert("container_name", state.container_name.as_str());
            labels.insert("stream", stream_name);
            labels.insert("monitor", "container_supervisor");
            labels.insert("image", metadata.image.as_str());
            labels.insert("state", metadata.state.as_str());
            labels.insert("hostname", metadata.hostname.as_str());
            labels.insert("command", metadata.command.as_str());
            labels.insert("platform", metadata.platform.as_str());
            if let Some(network) = &metadata.primary_network {
                labels.insert("network", network.as_str());
            }
            for (network, ip) in &metadata.networks {
                labels.insert(format!("network_{network}"), ip.as_str());
            }
            for (key, value) in &metadata.container_labels {
                labels.insert(format!("container_label_{key}"), value.as_str());
            }
            labels.retain_allowed(&FORBIDDEN_LABEL_PATTERNS.iter().map(|s| s.to_string()).collect::<Vec<_>>());

            let source_id = container_source_id(container_id);
            match self.inner.dispatcher.handle(SourceType::Container, source_id, message, labels, record_timestamp) {
                Ok(()) => {}
                Err(error) => {
                    tracing::warn!(component = TASK_ID, container_id, %error, "dispatch failed, dropping container record");
                    self.inner.metrics.errors(TASK_ID, "dispatch_failed");
                }
            }

            self.inner.feedback_guard.track_log(container_id, &state.container_name);
            state.last_read_at = record_timestamp;
        }
    }
}

/// Splits a Docker `timestamps=true` log line into its RFC3339 prefix and
/// message body, falling back to `now` when the prefix is absent or
/// unparsable (a malformed line should still reach the sink).
fn split_docker_timestamp(line: &str, now: DateTime<Utc>) -> (DateTime<Utc>, String) {
    match line.split_once(' ') {
        Some((prefix, rest)) => match DateTime::parse_from_rfc3339(prefix) {
            Ok(parsed) => (parsed.with_timezone(&Utc), rest.to_string()),
            Err(_) => (now, line.to_string()),
        },
        None => (now, line.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_client::fake::FakeRuntimeClient;
    use crate::runtime_client::{ContainerDetail, LogChunk};
    use crate::sink::fake::FakeSink;
    use crate::sink::MemoryDeadLetterQueue;
    use ltap_core::FakeClock;
    use ltap_engine::DispatcherConfig;

    fn config() -> ContainerSupervisorConfig {
        ContainerSupervisorConfig {
            enabled: true,
            drain_duration: std::time::Duration::from_millis(10),
            rotation_interval: std::time::Duration::from_secs(600),
            stream_pool_capacity: 2,
            feedback_guard: ltap_core::config::validate::FeedbackGuardConfig { threshold: 0.9, window: std::time::Duration::from_secs(60), min_sample_size: 100 },
            metadata_cache_ttl: std::time::Duration::from_secs(300),
            exclusion_list: Vec::new(),
        }
    }

    fn harness() -> (ContainerSupervisor<FakeClock>, Arc<FakeRuntimeClient>, Arc<FakeSink>) {
        let clock = FakeClock::new();
        let sink = Arc::new(FakeSink::new("test"));
        let dlq = Arc::new(MemoryDeadLetterQueue::new());
        let dispatcher = Dispatcher::new(clock.clone(), DispatcherConfig { workers: 1, queue_size: 100, warning_threshold: 0.75, critical_threshold: 0.9, emergency_threshold: 0.95 }, vec![sink.clone()], dlq, Metrics::noop());
        dispatcher.start().unwrap();
        let task_manager = TaskManager::new(clock.clone(), std::time::Duration::from_secs(120));
        let runtime = Arc::new(FakeRuntimeClient::new());
        let supervisor = ContainerSupervisor::new(clock, config(), runtime.clone(), dispatcher, task_manager, Metrics::noop(), "ltap-test");
        (supervisor, runtime, sink)
    }

    #[tokio::test]
    async fn start_collecting_dispatches_buffered_lines() {
        let (supervisor, runtime, sink) = harness();
        runtime.register_container(ContainerDetail { id: "abc123".into(), name: "web".into(), image: "nginx".into(), running: true, ..Default::default() });
        runtime.push_log_chunk("abc123", LogChunk::Stdout(b"2024-01-01T00:00:00.000000000Z hello\n".to_vec()));

        supervisor.start_collecting("abc123").await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message, "hello");
        assert_eq!(received[0].labels.get("container_name"), Some("web"));
        assert_eq!(received[0].labels.get("stream"), Some("stdout"));
        assert_eq!(received[0].labels.get("state"), Some("running"));
    }

    #[tokio::test]
    async fn start_collecting_is_idempotent() {
        let (supervisor, runtime, _sink) = harness();
        runtime.register_container(ContainerDetail { id: "abc123".into(), name: "web".into(), ..Default::default() });
        supervisor.start_collecting("abc123").await;
        supervisor.start_collecting("abc123").await;
        assert_eq!(supervisor.stats().active_collectors, 1);
    }

    #[tokio::test]
    async fn excluded_container_is_skipped() {
        let (supervisor, runtime, _sink) = harness();
        runtime.register_container(ContainerDetail { id: "noisy".into(), name: "noisy".into(), ..Default::default() });
        supervisor.inner.excluded.lock().insert("noisy".to_string());
        supervisor.start_collecting("noisy").await;
        assert_eq!(supervisor.stats().active_collectors, 0);
    }

    #[tokio::test]
    async fn stream_pool_at_capacity_skips_extra_container() {
        let (supervisor, runtime, _sink) = harness();
        for id in ["a", "b", "c"] {
            runtime.register_container(ContainerDetail { id: id.into(), name: id.into(), ..Default::default() });
        }
        supervisor.start_collecting("a").await;
        supervisor.start_collecting("b").await;
        supervisor.start_collecting("c").await;
        assert_eq!(supervisor.stats().active_collectors, 2);
    }

    #[tokio::test]
    async fn stop_collecting_drains_then_releases_slot() {
        let (supervisor, runtime, _sink) = harness();
        runtime.register_container(ContainerDetail { id: "abc".into(), name: "web".into(), ..Default::default() });
        supervisor.start_collecting("abc").await;
        assert_eq!(supervisor.stats().active_collectors, 1);

        supervisor.stop_collecting("abc").await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(supervisor.stats().active_collectors, 0);
        assert!(!supervisor.inner.stream_pool.is_active("abc"));
    }

    #[test]
    fn split_docker_timestamp_parses_rfc3339_prefix() {
        let now = Utc::now();
        let (ts, msg) = split_docker_timestamp("2024-01-01T00:00:00.000000000Z hello world", now);
        assert_eq!(msg, "hello world");
        assert_eq!(ts.timestamp(), 1704067200);
    }

    #[test]
    fn split_docker_timestamp_falls_back_to_now_on_malformed_prefix() {
        let now = Utc::now();
        let (ts, msg) = split_docker_timestamp("not-a-timestamp message", now);
        assert_eq!(msg, "not-a-timestamp message");
        assert_eq!(ts, now);
    }
}
