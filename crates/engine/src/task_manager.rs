// SPDX-License-Identifier: MIT

//! Named background tasks with heartbeat and timeout supervision
//! (spec.md §4.1, §5). The watchdog never kills a task — it only flags it
//! unhealthy for operator visibility; components remain responsible for
//! calling [`TaskManager::heartbeat`] from their own loops.

use ltap_core::Clock;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskHealth {
    Running,
    Unhealthy,
    Stopped,
}

struct TaskStatus {
    started_at: Instant,
    last_heartbeat_at: Instant,
    health: TaskHealth,
    cancel: CancellationToken,
}

struct Inner<C: Clock> {
    clock: C,
    tasks: RwLock<HashMap<String, TaskStatus>>,
    /// Tasks whose silent period exceeds this are reported unhealthy
    /// (spec.md §4.1: default 2 minutes).
    watchdog_threshold: std::time::Duration,
}

#[derive(Clone)]
pub struct TaskManager<C: Clock> {
    inner: Arc<Inner<C>>,
}

/// Snapshot of one task's health, returned by [`TaskManager::watchdog_scan`].
#[derive(Debug, Clone)]
pub struct UnhealthyTask {
    pub task_id: String,
    pub silent_for: std::time::Duration,
}

impl<C: Clock> TaskManager<C> {
    pub fn new(clock: C, watchdog_threshold: std::time::Duration) -> Self {
        Self { inner: Arc::new(Inner { clock, tasks: RwLock::new(HashMap::new()), watchdog_threshold }) }
    }

    /// Registers a task and returns the cancellation token it should
    /// observe cooperatively. The caller spawns the actual work; the
    /// registration here is what the watchdog inspects.
    pub fn register(&self, task_id: impl Into<String>) -> CancellationToken {
        let cancel = CancellationToken::new();
        let now = self.inner.clock.now();
        self.inner.tasks.write().insert(task_id.into(), TaskStatus { started_at: now, last_heartbeat_at: now, health: TaskHealth::Running, cancel: cancel.clone() });
        cancel
    }

    pub fn heartbeat(&self, task_id: &str) {
        let now = self.inner.clock.now();
        if let Some(status) = self.inner.tasks.write().get_mut(task_id) {
            status.last_heartbeat_at = now;
            status.health = TaskHealth::Running;
        }
    }

    /// Signals cancellation and records the task as stopped. Idempotent.
    pub fn stop(&self, task_id: &str) {
        if let Some(status) = self.inner.tasks.write().get_mut(task_id) {
            status.cancel.cancel();
            status.health = TaskHealth::Stopped;
        }
    }

    /// Signals cancellation for every registered task (application
    /// shutdown, spec.md §5).
    pub fn stop_all(&self) {
        let mut tasks = self.inner.tasks.write();
        for status in tasks.values_mut() {
            status.cancel.cancel();
            status.health = TaskHealth::Stopped;
        }
    }

    pub fn health_of(&self, task_id: &str) -> Option<TaskHealth> {
        self.inner.tasks.read().get(task_id).map(|s| s.health)
    }

    /// Periodic inspection (spec.md §4.1 watchdog): flags, but does not
    /// kill, tasks whose `last_heartbeat_at` is older than the configured
    /// threshold. Returns the set currently unhealthy.
    pub fn watchdog_scan(&self) -> Vec<UnhealthyTask> {
        let now = self.inner.clock.now();
        let mut unhealthy = Vec::new();
        let mut tasks = self.inner.tasks.write();
        for (task_id, status) in tasks.iter_mut() {
            if status.health == TaskHealth::Stopped {
                continue;
            }
            let silent_for = now.duration_since(status.last_heartbeat_at);
            if silent_for > self.inner.watchdog_threshold {
                status.health = TaskHealth::Unhealthy;
                unhealthy.push(UnhealthyTask { task_id: task_id.clone(), silent_for });
            }
        }
        unhealthy
    }

    /// Spawns the watchdog loop itself, ticking every `interval` and
    /// logging any newly-unhealthy task.
    pub fn spawn_watchdog(&self, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for unhealthy in manager.watchdog_scan() {
                    tracing::warn!(
                        component = "task_manager",
                        task_id = %unhealthy.task_id,
                        silent_for_secs = unhealthy.silent_for.as_secs(),
                        "task has not heartbeat within the watchdog threshold"
                    );
                }
            }
        })
    }

    pub fn running_count(&self) -> usize {
        self.inner.tasks.read().values().filter(|s| s.health != TaskHealth::Stopped).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltap_core::FakeClock;

    #[test]
    fn heartbeat_keeps_task_healthy() {
        let clock = FakeClock::new();
        let manager = TaskManager::new(clock.clone(), std::time::Duration::from_secs(120));
        manager.register("file_supervisor");
        clock.advance(std::time::Duration::from_secs(30));
        manager.heartbeat("file_supervisor");
        assert!(manager.watchdog_scan().is_empty());
        assert_eq!(manager.health_of("file_supervisor"), Some(TaskHealth::Running));
    }

    #[test]
    fn watchdog_flags_silent_task_without_stopping_it() {
        let clock = FakeClock::new();
        let manager = TaskManager::new(clock.clone(), std::time::Duration::from_secs(120));
        let cancel = manager.register("container_supervisor");
        clock.advance(std::time::Duration::from_secs(121));
        let unhealthy = manager.watchdog_scan();
        assert_eq!(unhealthy.len(), 1);
        assert_eq!(unhealthy[0].task_id, "container_supervisor");
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn stop_cancels_token_and_marks_stopped() {
        let clock = FakeClock::new();
        let manager = TaskManager::new(clock, std::time::Duration::from_secs(120));
        let cancel = manager.register("position_store");
        manager.stop("position_store");
        assert!(cancel.is_cancelled());
        assert_eq!(manager.health_of("position_store"), Some(TaskHealth::Stopped));
    }

    #[test]
    fn stopped_tasks_are_excluded_from_watchdog() {
        let clock = FakeClock::new();
        let manager = TaskManager::new(clock.clone(), std::time::Duration::from_secs(10));
        manager.register("a");
        manager.stop("a");
        clock.advance(std::time::Duration::from_secs(100));
        assert!(manager.watchdog_scan().is_empty());
    }
}
