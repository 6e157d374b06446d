// SPDX-License-Identifier: MIT

//! Self-monitoring detection (spec.md §4.5.6): if the agent's own
//! container were ingested by the container supervisor, every emitted
//! log would become a new incoming log, causing exponential volume
//! growth. This guard tracks per-container share of total log volume and
//! excludes any container that dominates.
//!
//! The supervisor owns exclusion; the guard only calls back through a
//! narrow capability (spec.md §9 Design Notes: "Cyclic ownership") so the
//! two can be tested independently.

use ltap_core::{Clock, Metrics};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Capability the guard uses to mutate supervisor state, without holding
/// a reference to the whole supervisor.
pub trait ExclusionSink: Send + Sync {
    fn add_exclusion(&self, container_name: &str, container_id: &str);
}

struct ContainerStats {
    count: u64,
    last_activity: std::time::Instant,
}

struct Inner<C: Clock> {
    clock: C,
    window: std::time::Duration,
    threshold: f64,
    min_sample_size: u64,
    metrics: Metrics,
    stats: RwLock<HashMap<String, ContainerStats>>,
    names: RwLock<HashMap<String, String>>,
}

#[derive(Clone)]
pub struct FeedbackGuard<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> FeedbackGuard<C> {
    pub fn new(clock: C, window: std::time::Duration, threshold: f64, min_sample_size: u64, metrics: Metrics) -> Self {
        Self { inner: Arc::new(Inner { clock, window, threshold, min_sample_size, metrics, stats: RwLock::new(HashMap::new()), names: RwLock::new(HashMap::new()) }) }
    }

    /// Called by every collector writer on each successfully-dispatched
    /// chunk (spec.md §4.5.2 step 7).
    pub fn track_log(&self, container_id: &str, container_name: &str) {
        let now = self.inner.clock.now();
        let mut stats = self.inner.stats.write();
        let entry = stats.entry(container_id.to_string()).or_insert_with(|| ContainerStats { count: 0, last_activity: now });
        entry.count += 1;
        entry.last_activity = now;
        drop(stats);
        self.inner.names.write().insert(container_id.to_string(), container_name.to_string());
    }

    /// Detection loop body (spec.md §4.5.6, every 10 s). Snapshots the
    /// stats map under lock, then evaluates outside the lock.
    pub fn detect(&self, exclusions: &dyn ExclusionSink) {
        let now = self.inner.clock.now();
        let window = self.inner.window;

        let snapshot: Vec<(String, u64)> = {
            let stats = self.inner.stats.read();
            stats.iter().filter(|(_, s)| now.duration_since(s.last_activity) <= window).map(|(id, s)| (id.clone(), s.count)).collect()
        };

        let total: u64 = snapshot.iter().map(|(_, count)| count).sum();
        if total < self.inner.min_sample_size {
            return;
        }

        for (container_id, count) in &snapshot {
            let ratio = *count as f64 / total as f64;
            if ratio >= self.inner.threshold {
                let name = self.inner.names.read().get(container_id).cloned().unwrap_or_else(|| container_id.clone());
                tracing::warn!(component = "container_supervisor", container_id, container_name = %name, ratio, total, "container dominates log volume, excluding");
                self.inner.metrics.errors("container_supervisor", "self_monitoring_detected");
                exclusions.add_exclusion(&name, container_id);
                self.reset(container_id);
            }
        }
    }

    fn reset(&self, container_id: &str) {
        if let Some(entry) = self.inner.stats.write().get_mut(container_id) {
            entry.count = 0;
        }
    }

    /// Cleanup loop body (spec.md §4.5.6, every 30 s): drops entries
    /// whose last activity predates `2 x window`, so containers that
    /// stopped emitting do not linger forever.
    pub fn cleanup(&self) -> usize {
        let now = self.inner.clock.now();
        let max_age = self.inner.window * 2;
        let mut stats = self.inner.stats.write();
        let before = stats.len();
        stats.retain(|_, s| now.duration_since(s.last_activity) <= max_age);
        let removed = before - stats.len();
        let mut names = self.inner.names.write();
        names.retain(|id, _| stats.contains_key(id));
        removed
    }

    pub fn stats_size(&self) -> usize {
        self.inner.stats.read().len()
    }

    pub fn spawn_loops(&self, detection_interval: std::time::Duration, cleanup_interval: std::time::Duration, exclusions: Arc<dyn ExclusionSink>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let detect_guard = self.clone();
        let detect_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(detection_interval);
            loop {
                ticker.tick().await;
                detect_guard.detect(exclusions.as_ref());
            }
        });

        let cleanup_guard = self.clone();
        let cleanup_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                let removed = cleanup_guard.cleanup();
                if removed > 0 {
                    tracing::debug!(component = "container_supervisor", removed, "feedback guard cleanup removed stale container stats");
                }
            }
        });

        (detect_handle, cleanup_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltap_core::FakeClock;
    use parking_lot::Mutex;

    struct RecordingExclusions {
        excluded: Mutex<Vec<(String, String)>>,
    }

    impl ExclusionSink for RecordingExclusions {
        fn add_exclusion(&self, container_name: &str, container_id: &str) {
            self.excluded.lock().push((container_name.to_string(), container_id.to_string()));
        }
    }

    fn guard(clock: FakeClock) -> FeedbackGuard<FakeClock> {
        FeedbackGuard::new(clock, std::time::Duration::from_secs(60), 0.90, 100, Metrics::noop())
    }

    #[test]
    fn dominant_container_is_excluded() {
        let clock = FakeClock::new();
        let guard = guard(clock);
        for _ in 0..95 {
            guard.track_log("x", "noisy");
        }
        for _ in 0..5 {
            guard.track_log("y", "quiet");
        }

        let exclusions = RecordingExclusions { excluded: Mutex::new(Vec::new()) };
        guard.detect(&exclusions);

        assert_eq!(exclusions.excluded.lock().as_slice(), &[("noisy".to_string(), "x".to_string())]);
    }

    #[test]
    fn below_min_sample_size_does_not_fire() {
        let clock = FakeClock::new();
        let guard = guard(clock);
        for _ in 0..10 {
            guard.track_log("x", "small");
        }
        let exclusions = RecordingExclusions { excluded: Mutex::new(Vec::new()) };
        guard.detect(&exclusions);
        assert!(exclusions.excluded.lock().is_empty());
    }

    #[test]
    fn cleanup_purges_stale_entries_after_two_windows() {
        let clock = FakeClock::new();
        let guard = guard(clock.clone());
        guard.track_log("x", "gone");
        assert_eq!(guard.stats_size(), 1);

        clock.advance(std::time::Duration::from_secs(121));
        let removed = guard.cleanup();
        assert_eq!(removed, 1);
        assert_eq!(guard.stats_size(), 0);
    }

    #[test]
    fn activity_outside_window_is_excluded_from_total() {
        let clock = FakeClock::new();
        let guard = guard(clock.clone());
        for _ in 0..200 {
            guard.track_log("x", "old-burst");
        }
        clock.advance(std::time::Duration::from_secs(61));
        let exclusions = RecordingExclusions { excluded: Mutex::new(Vec::new()) };
        guard.detect(&exclusions);
        assert!(exclusions.excluded.lock().is_empty(), "stale activity outside the window must not count toward the sample");
    }
}
