// SPDX-License-Identifier: MIT

//! Discovers and tails plain log files (spec.md §4.4). A single combined
//! loop drives every tracked file: filesystem-notify events, a poll
//! ticker, and a health ticker all feed the same read cycle, mirroring
//! the teacher's single-loop `tail_file` rather than one task per file.

use crate::fs_notifier::{FsChangeEvent, FsNotifier, FsOp};
use crate::host_info::{detect_host_ipv4, detect_hostname};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ltap_core::config::validate::{FileSupervisorConfig, PipelineEntry, SeekStrategy};
use ltap_core::{file_source_id, Clock, FileFingerprint, FileTailState, LabelMap, Metrics, SourceType};
use ltap_engine::{Dispatcher, EnqueueOutcome, RetryQueue, TaskManager};
use ltap_storage::PositionStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

/// Labels considered high-cardinality or vendor-internal; never forwarded
/// on a record regardless of what the pipeline configuration declares
/// (spec.md §4.4.3, §6).
const FORBIDDEN_LABEL_PATTERNS: &[&str] = &["password*", "secret*", "token*", "api_key*", "authorization*"];

const TASK_ID: &str = "file_supervisor";

#[derive(Debug, Error)]
pub enum FileSupervisorError {
    #[error("path does not exist or is not a regular file: {0}")]
    NotFound(PathBuf),
    #[error("path is already tracked: {0}")]
    AlreadyTracked(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("watcher error: {0}")]
    Watcher(#[from] crate::fs_notifier::FsNotifierError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FileSupervisorStats {
    pub tracked_files: usize,
}

fn fingerprint_of(metadata: &std::fs::Metadata) -> FileFingerprint {
    FileFingerprint { inode: metadata.ino(), device: metadata.dev() }
}

fn build_globset(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

struct Inner<C: Clock> {
    clock: C,
    config: FileSupervisorConfig,
    position_store: PositionStore<C>,
    dispatcher: Dispatcher<C>,
    retry_queue: RetryQueue<C>,
    notifier: Arc<dyn FsNotifier>,
    task_manager: TaskManager<C>,
    metrics: Metrics,
    files: RwLock<HashMap<PathBuf, FileTailState>>,
    start_time: DateTime<Utc>,
    service_name: String,
    hostname: String,
    host_ipv4: String,
}

/// Owns every tracked file's tail state and the single combined read
/// loop that drives them (spec.md §3, §4.4).
#[derive(Clone)]
pub struct FileSupervisor<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> FileSupervisor<C> {
    pub fn new(
        clock: C,
        config: FileSupervisorConfig,
        position_store: PositionStore<C>,
        dispatcher: Dispatcher<C>,
        retry_queue: RetryQueue<C>,
        notifier: Arc<dyn FsNotifier>,
        task_manager: TaskManager<C>,
        metrics: Metrics,
        service_name: impl Into<String>,
    ) -> Self {
        let start_time = clock.now_utc();
        Self {
            inner: Arc::new(Inner {
                clock,
                config,
                position_store,
                dispatcher,
                retry_queue,
                notifier,
                task_manager,
                metrics,
                files: RwLock::new(HashMap::new()),
                start_time,
                service_name: service_name.into(),
                hostname: detect_hostname(),
                host_ipv4: detect_host_ipv4(),
            }),
        }
    }

    /// Discovers files from both pipeline entries and plain watched
    /// directories, calling [`Self::add_file`] for every match
    /// (spec.md §4.4.1).
    pub fn discover(&self) -> io::Result<()> {
        for entry in &self.inner.config.pipeline {
            self.discover_pipeline_entry(entry)?;
        }
        for dir in &self.inner.config.watch_directories {
            self.discover_directory(dir, &self.inner.config.include_patterns, &self.inner.config.exclude_patterns, self.inner.config.recursive, &LabelMap::new());
        }
        Ok(())
    }

    fn discover_pipeline_entry(&self, entry: &PipelineEntry) -> io::Result<()> {
        let labels: LabelMap = entry.labels.clone().into();
        for file in &entry.files {
            if let Err(error) = self.add_file(file, labels.clone()) {
                tracing::warn!(component = TASK_ID, path = %file.display(), %error, "failed to add pipeline file");
            }
        }
        for dir in &entry.directories {
            self.discover_directory(dir, &entry.include_patterns, &entry.exclude_patterns, entry.recursive, &labels);
        }
        Ok(())
    }

    fn discover_directory(&self, dir: &Path, include: &[String], exclude: &[String], recursive: bool, labels: &LabelMap) {
        let include_set = build_globset(include);
        let exclude_set = build_globset(exclude);
        let exclude_dirs = &self.inner.config.exclude_directories;

        let walker = if recursive { walkdir::WalkDir::new(dir) } else { walkdir::WalkDir::new(dir).max_depth(1) };
        for entry in walker.into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if exclude_dirs.iter().any(|d| path.starts_with(d)) {
                continue;
            }
            let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            if !include_set.is_empty() && !include_set.is_match(&name) {
                continue;
            }
            if exclude_set.is_match(&name) {
                continue;
            }
            if let Err(error) = self.add_file(path, labels.clone()) {
                tracing::debug!(component = TASK_ID, path = %path.display(), %error, "skipped file during discovery");
            }
        }
    }

    /// Starts tracking one file (spec.md §4.4.2): stats the path, rejects
    /// missing/already-tracked paths, consults the position store for a
    /// resumed offset, falls back to the configured seek strategy, and
    /// registers it with the filesystem notifier.
    pub fn add_file(&self, path: &Path, labels: LabelMap) -> Result<(), FileSupervisorError> {
        let absolute = std::fs::canonicalize(path).map_err(|_| FileSupervisorError::NotFound(path.to_path_buf()))?;
        let metadata = std::fs::metadata(&absolute)?;
        if !metadata.is_file() {
            return Err(FileSupervisorError::NotFound(absolute));
        }

        {
            let files = self.inner.files.read();
            if files.contains_key(&absolute) {
                return Err(FileSupervisorError::AlreadyTracked(absolute));
            }
        }

        let fingerprint = fingerprint_of(&metadata);
        let file_size = metadata.len();
        let offset = match self.inner.position_store.get_record(&absolute) {
            Some(record) if !record.is_stale(fingerprint) => record.offset.min(file_size),
            _ => self.apply_seek_strategy(&absolute, file_size)?,
        };

        self.inner.notifier.watch(&absolute)?;
        let state = FileTailState::new(absolute.clone(), fingerprint, file_size, offset, labels);
        self.inner.files.write().insert(absolute, state);
        Ok(())
    }

    fn apply_seek_strategy(&self, path: &Path, file_size: u64) -> Result<u64, FileSupervisorError> {
        match self.inner.config.seek_strategy {
            SeekStrategy::Beginning => Ok(0),
            SeekStrategy::End => Ok(file_size),
            SeekStrategy::Recent => {
                let recent_bytes = self.inner.config.seek_recent_bytes;
                if file_size <= recent_bytes {
                    return Ok(0);
                }
                let tentative = file_size - recent_bytes;
                Ok(align_to_next_newline(path, tentative)?)
            }
        }
    }

    pub fn remove_file(&self, path: &Path) {
        if let Ok(absolute) = std::fs::canonicalize(path) {
            self.inner.notifier.unwatch(&absolute);
            self.inner.files.write().remove(&absolute);
            self.inner.position_store.remove(&absolute);
        }
    }

    pub fn stats(&self) -> FileSupervisorStats {
        FileSupervisorStats { tracked_files: self.inner.files.read().len() }
    }

    /// Spawns the combined tail loop (spec.md §4.4.3) plus the retry
    /// ticker (spec.md §4.4.4), both registered under the same task id so
    /// the watchdog reflects a single supervisor health signal.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let cancel = self.inner.task_manager.register(TASK_ID);
        let supervisor = self.clone();
        tokio::spawn(async move { supervisor.run(cancel).await })
    }

    pub fn stop(&self) {
        self.inner.task_manager.stop(TASK_ID);
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut poll_ticker = tokio::time::interval(self.inner.config.poll_interval);
        let mut health_ticker = tokio::time::interval(std::time::Duration::from_secs(30));
        let mut retry_ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        let mut last_heartbeat = self.inner.clock.now();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(component = TASK_ID, "stopping tail loop");
                    return;
                }
                event = self.inner.notifier.recv() => {
                    if let Some(event) = event {
                        self.handle_fs_event(event).await;
                    }
                }
                _ = poll_ticker.tick() => {
                    self.poll_all().await;
                }
                _ = health_ticker.tick() => {
                    self.health_check();
                }
                _ = retry_ticker.tick() => {
                    self.drain_retries();
                }
            }

            let now = self.inner.clock.now();
            if now.duration_since(last_heartbeat) >= std::time::Duration::from_secs(30) {
                self.inner.task_manager.heartbeat(TASK_ID);
                last_heartbeat = now;
            }
        }
    }

    async fn handle_fs_event(&self, event: FsChangeEvent) {
        match event.op {
            FsOp::Remove => {
                tracing::debug!(component = TASK_ID, path = %event.path.display(), "file removed");
            }
            FsOp::Write | FsOp::Create | FsOp::Chmod => {
                self.read_one(&event.path).await;
            }
        }
    }

    async fn poll_all(&self) {
        let paths: Vec<PathBuf> = self.inner.files.read().keys().cloned().collect();
        for path in paths {
            self.read_one(&path).await;
        }
    }

    /// Health ticker (spec.md §4.4.3): flags quiet files, rate-limited to
    /// once per hour, and force-reopens files unread for a long time.
    fn health_check(&self) {
        let now = self.inner.clock.now_utc();
        let mut files = self.inner.files.write();
        for (path, state) in files.iter_mut() {
            let Some(last_read_at) = state.last_read_at else { continue };
            let quiet_for = now - last_read_at;
            if quiet_for > chrono::Duration::minutes(20) {
                tracing::warn!(component = TASK_ID, path = %path.display(), "file unread for over 20 minutes, forcing reopen");
                state.last_read_at = Some(now);
            } else if quiet_for > chrono::Duration::minutes(15) {
                let should_warn = state.last_quiet_warn_at.map(|t| now - t > chrono::Duration::hours(1)).unwrap_or(true);
                if should_warn {
                    let recently_modified = state.last_mtime.map(|m| now - m < chrono::Duration::minutes(10)).unwrap_or(false);
                    if recently_modified {
                        tracing::warn!(component = TASK_ID, path = %path.display(), "file modified recently but unread for over 15 minutes");
                    } else {
                        tracing::debug!(component = TASK_ID, path = %path.display(), "file quiet for over 15 minutes");
                    }
                    state.last_quiet_warn_at = Some(now);
                }
            }
        }
    }

    fn drain_retries(&self) {
        let (due, given_up) = self.inner.retry_queue.drain_due();
        for entry in given_up {
            self.inner.metrics.retries_give_up(TASK_ID);
            tracing::warn!(component = TASK_ID, source_id = %entry.source_id, attempts = entry.attempts, "retry entry gave up");
        }
        for entry in due {
            match self.inner.dispatcher.handle(SourceType::File, entry.source_id.clone(), entry.line.clone(), entry.labels.clone(), self.inner.clock.now_utc()) {
                Ok(()) => self.inner.metrics.retries_success(TASK_ID),
                Err(_) => {
                    self.inner.metrics.retries_failed(TASK_ID);
                    self.inner.retry_queue.reschedule(entry);
                }
            }
        }
    }

    /// Reads and dispatches all newly-available lines for one tracked
    /// file, updating the position store afterward (spec.md §4.4.3).
    async fn read_one(&self, path: &Path) {
        let Some(mut state) = ({ self.inner.files.read().get(path).cloned() }) else { return };

        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(error) => {
                tracing::warn!(component = TASK_ID, path = %path.display(), %error, "stat failed, will retry next cycle");
                return;
            }
        };
        let fingerprint = fingerprint_of(&metadata);
        let current_size = metadata.len();

        if fingerprint != state.fingerprint || state.is_truncated(current_size) {
            tracing::info!(component = TASK_ID, path = %path.display(), "rotation or truncation detected, reopening from start");
            state.reset_on_truncation(fingerprint, current_size);
        }

        if current_size <= state.offset {
            return;
        }

        let mtime: DateTime<Utc> = metadata.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| self.inner.clock.now_utc());

        match self.read_new_lines(path, &mut state, current_size).await {
            Ok((bytes_consumed, lines)) => {
                let lines_consumed = lines.len() as u64;
                for line in lines {
                    self.dispatch_line(&state, line, mtime);
                }
                state.offset += bytes_consumed;
                state.last_read_at = Some(self.inner.clock.now_utc());
                state.last_mtime = Some(mtime);
                self.inner.position_store.update(path, state.offset, current_size, mtime, fingerprint, bytes_consumed, lines_consumed);
                self.inner.files.write().insert(path.to_path_buf(), state);
            }
            Err(error) => {
                tracing::warn!(component = TASK_ID, path = %path.display(), %error, "read failed, will retry next cycle");
                self.inner.metrics.errors(TASK_ID, "read_failed");
            }
        }
    }

    async fn read_new_lines(&self, path: &Path, state: &mut FileTailState, current_size: u64) -> io::Result<(u64, Vec<String>)> {
        let mut file = tokio::fs::File::open(path).await?;
        file.seek(io::SeekFrom::Start(state.offset)).await?;

        let to_read = (current_size - state.offset) as usize;
        let mut buf = vec![0u8; to_read];
        file.read_exact(&mut buf).await?;

        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok((0, Vec::new()));
        };

        let complete = &buf[..=last_newline];
        let lines = complete
            .split(|&b| b == b'\n')
            .filter(|segment| !segment.is_empty())
            .map(|segment| String::from_utf8_lossy(segment).trim_end_matches('\r').to_string())
            .filter(|line| !line.is_empty())
            .collect();
        Ok(((last_newline + 1) as u64, lines))
    }

    /// `source_timestamp` is the tracked file's mtime at read time — the
    /// closest signal available to "when this content was written"
    /// without parsing an arbitrary per-line format — used only to decide
    /// whether catch-up content predates this supervisor run (spec.md
    /// §4.4.3: "if `ignore_old_timestamps` and `record.timestamp <
    /// supervisor.start_time`: drop"). The dispatched record itself still
    /// carries `now_utc` so downstream clock-skew rejection never fires.
    fn dispatch_line(&self, state: &FileTailState, message: String, source_timestamp: DateTime<Utc>) {
        let now = self.inner.clock.now_utc();
        if self.inner.config.ignore_old_timestamps && source_timestamp < self.inner.start_time {
            self.inner.metrics.old_logs_ignored(TASK_ID, &state.path.to_string_lossy());
            return;
        }

        let source_id = file_source_id(&state.path);
        let mut labels = state.labels.clone();
        labels.insert("service", self.inner.service_name.as_str());
        labels.insert("source", "file");
        labels.insert("instance", self.inner.host_ipv4.as_str());
        labels.insert("instance_name", self.inner.hostname.as_str());
        labels.insert("file_path", state.path.to_string_lossy().to_string());
        if let Some(name) = state.path.file_name() {
            labels.insert("file_name", name.to_string_lossy().to_string());
        }
        labels.retain_allowed(&FORBIDDEN_LABEL_PATTERNS.iter().map(|s| s.to_string()).collect::<Vec<_>>());

        match self.inner.dispatcher.handle(SourceType::File, source_id.clone(), message.clone(), labels.clone(), now) {
            Ok(()) => {}
            Err(_) => match self.inner.retry_queue.enqueue(message, labels, source_id) {
                EnqueueOutcome::Accepted => self.inner.metrics.retries_queued(TASK_ID),
                EnqueueOutcome::DroppedExisting(_) => self.inner.metrics.drops(TASK_ID, "retry_queue_full_oldest"),
                EnqueueOutcome::DroppedIncoming => self.inner.metrics.drops(TASK_ID, "retry_queue_full_newest"),
            },
        }
    }
}

/// Advances `offset` forward to the next newline so a `recent` seek never
/// starts mid-line (spec.md §4.4.2).
fn align_to_next_newline(path: &Path, offset: u64) -> io::Result<u64> {
    use std::io::{Read, Seek};
    let mut file = std::fs::File::open(path)?;
    file.seek(io::SeekFrom::Start(offset))?;
    let mut buf = [0u8; 4096];
    let mut pos = offset;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(pos);
        }
        if let Some(idx) = buf[..n].iter().position(|&b| b == b'\n') {
            return Ok(pos + idx as u64 + 1);
        }
        pos += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_notifier::fake::FakeFsNotifier;
    use crate::sink::{fake::FakeSink, MemoryDeadLetterQueue};
    use ltap_core::config::validate::RetryConfig;
    use ltap_core::retry::DropPolicy;
    use ltap_core::FakeClock;
    use ltap_engine::DispatcherConfig;
    use std::io::Write;
    use tempfile::tempdir;

    fn config() -> FileSupervisorConfig {
        FileSupervisorConfig {
            enabled: true,
            watch_directories: Vec::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            exclude_directories: Vec::new(),
            recursive: false,
            poll_interval: std::time::Duration::from_millis(50),
            seek_strategy: SeekStrategy::Beginning,
            seek_recent_bytes: 500,
            ignore_old_timestamps: false,
            max_retry_queue_size: 100,
            retry: RetryConfig { initial_delay: chrono::Duration::milliseconds(50), max_delay: chrono::Duration::seconds(1), multiplier: 2.0, drop_policy: DropPolicy::Oldest },
            pipeline: Vec::new(),
        }
    }

    fn harness(dir: &std::path::Path) -> (FileSupervisor<FakeClock>, Arc<FakeSink>) {
        harness_with(dir, config(), FakeClock::new())
    }

    fn harness_with(dir: &std::path::Path, supervisor_config: FileSupervisorConfig, clock: FakeClock) -> (FileSupervisor<FakeClock>, Arc<FakeSink>) {
        let position_store = PositionStore::open(dir.join("positions.json"), clock.clone(), Metrics::noop()).unwrap();
        let sink = Arc::new(FakeSink::new("test"));
        let dlq = Arc::new(MemoryDeadLetterQueue::new());
        let dispatcher = Dispatcher::new(clock.clone(), DispatcherConfig { workers: 1, queue_size: 100, warning_threshold: 0.75, critical_threshold: 0.9, emergency_threshold: 0.95 }, vec![sink.clone()], dlq, Metrics::noop());
        dispatcher.start().unwrap();
        let retry_queue = RetryQueue::new(clock.clone(), ltap_engine::RetryQueueConfig {
            max_size: 100,
            drop_policy: DropPolicy::Oldest,
            initial_delay: chrono::Duration::milliseconds(50),
            max_delay: chrono::Duration::seconds(1),
            backoff_multiplier: 2.0,
            max_age: chrono::Duration::minutes(5),
            max_attempts: 10,
        });
        let task_manager = TaskManager::new(clock.clone(), std::time::Duration::from_secs(120));
        let notifier = Arc::new(FakeFsNotifier::new());
        let supervisor = FileSupervisor::new(clock, supervisor_config, position_store, dispatcher, retry_queue, notifier, task_manager, Metrics::noop(), "ltap-test");
        (supervisor, sink)
    }

    #[tokio::test]
    async fn tail_from_beginning_emits_each_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "hello\nworld\n").unwrap();

        let (supervisor, sink) = harness(dir.path());
        supervisor.add_file(&path, LabelMap::new()).unwrap();
        let absolute = std::fs::canonicalize(&path).unwrap();
        supervisor.read_one(&absolute).await;

        let received = sink.received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].message, "hello");
        assert_eq!(received[1].message, "world");
        assert_eq!(received[0].labels.get("source"), Some("file"));
        assert_eq!(received[0].labels.get("file_name"), Some("a.log"));
    }

    #[tokio::test]
    async fn truncation_resets_offset_and_rereads_from_start() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "0123456789\n").unwrap();
        let absolute = std::fs::canonicalize(&path).unwrap();

        let (supervisor, sink) = harness(dir.path());
        supervisor.add_file(&path, LabelMap::new()).unwrap();
        supervisor.read_one(&absolute).await;
        assert_eq!(sink.received().len(), 1);

        let mut file = std::fs::OpenOptions::new().write(true).truncate(true).open(&path).unwrap();
        file.write_all(b"new\n").unwrap();
        drop(file);

        supervisor.read_one(&absolute).await;
        let received = sink.received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[1].message, "new");
    }

    #[tokio::test]
    async fn add_file_rejects_missing_path() {
        let dir = tempdir().unwrap();
        let (supervisor, _sink) = harness(dir.path());
        let result = supervisor.add_file(&dir.path().join("missing.log"), LabelMap::new());
        assert!(matches!(result, Err(FileSupervisorError::NotFound(_))));
    }

    #[tokio::test]
    async fn add_file_rejects_already_tracked_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "x\n").unwrap();
        let (supervisor, _sink) = harness(dir.path());
        supervisor.add_file(&path, LabelMap::new()).unwrap();
        let result = supervisor.add_file(&path, LabelMap::new());
        assert!(matches!(result, Err(FileSupervisorError::AlreadyTracked(_))));
    }

    #[tokio::test]
    async fn partial_trailing_line_is_not_consumed_until_newline_arrives() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "complete\npartial").unwrap();
        let absolute = std::fs::canonicalize(&path).unwrap();

        let (supervisor, sink) = harness(dir.path());
        supervisor.add_file(&path, LabelMap::new()).unwrap();
        supervisor.read_one(&absolute).await;
        assert_eq!(sink.received().len(), 1);
        assert_eq!(sink.received()[0].message, "complete");

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b" rest\n").unwrap();
        drop(file);

        supervisor.read_one(&absolute).await;
        let received = sink.received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[1].message, "partial rest");
    }

    #[tokio::test]
    async fn ignore_old_timestamps_drops_lines_predating_supervisor_start() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "stale\n").unwrap();
        let absolute = std::fs::canonicalize(&path).unwrap();

        let clock = FakeClock::new();
        clock.set_utc(chrono::Utc::now() + chrono::Duration::hours(1));
        let mut cfg = config();
        cfg.ignore_old_timestamps = true;
        let (supervisor, sink) = harness_with(dir.path(), cfg, clock);
        supervisor.add_file(&path, LabelMap::new()).unwrap();
        supervisor.read_one(&absolute).await;

        assert!(sink.received().is_empty());
    }

    #[tokio::test]
    async fn ignore_old_timestamps_keeps_lines_written_after_supervisor_start() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");

        let clock = FakeClock::new();
        clock.set_utc(chrono::Utc::now());
        let mut cfg = config();
        cfg.ignore_old_timestamps = true;
        let (supervisor, sink) = harness_with(dir.path(), cfg, clock);

        std::fs::write(&path, "fresh\n").unwrap();
        let absolute = std::fs::canonicalize(&path).unwrap();
        supervisor.add_file(&path, LabelMap::new()).unwrap();
        supervisor.read_one(&absolute).await;

        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message, "fresh");
    }
}
