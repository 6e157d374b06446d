// SPDX-License-Identifier: MIT

//! Ties every component into one running process (spec.md §2 Flow).
//! `Application::new` is the single fatal-error boundary (spec.md §7:
//! "missing logger, missing dispatcher at construction; configuration
//! that cannot be parsed; inability to connect to the container runtime
//! at startup" are all surfaced here, never panicked on).

use crate::settings::Settings;
use ltap_adapters::sink::{MemoryDeadLetterQueue, NullSink};
use ltap_adapters::{BollardRuntimeClient, ContainerRuntimeClient, ContainerSupervisor, FileSupervisor, NotifyFsNotifier};
use ltap_core::config::{Configuration, ConfigError};
use ltap_core::{Metrics, SystemClock};
use ltap_engine::sink::Sink;
use ltap_engine::{DispatchError, Dispatcher, RetryQueue, RetryQueueConfig, TaskManager};
use ltap_storage::{PositionStore, PositionStoreError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead { path: std::path::PathBuf, source: std::io::Error },
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("position store error: {0}")]
    PositionStore(#[from] PositionStoreError),
    #[error("container runtime unreachable: {0}")]
    RuntimeUnreachable(#[from] ltap_adapters::RuntimeClientError),
    #[error("filesystem notifier error: {0}")]
    FsNotifier(#[from] ltap_adapters::FsNotifierError),
    #[error("failed to start dispatcher: {0}")]
    DispatcherStart(#[from] DispatchError),
    #[error("failed to start file supervisor: {0}")]
    FileSupervisorStart(#[from] std::io::Error),
}

/// Converts the validated config's dispatcher numbers into the engine's
/// own `DispatcherConfig` (spec.md §9: the two types are deliberately
/// distinct — one is parsed configuration, the other the engine's
/// runtime-facing shape — so this mapping is the one place that knows
/// both).
fn to_dispatcher_config(c: &ltap_core::config::DispatcherConfig) -> ltap_engine::DispatcherConfig {
    ltap_engine::DispatcherConfig {
        workers: c.workers,
        queue_size: c.queue_size,
        warning_threshold: c.warning_threshold,
        critical_threshold: c.critical_threshold,
        emergency_threshold: c.emergency_threshold,
    }
}

fn to_retry_queue_config(fs: &ltap_core::config::FileSupervisorConfig) -> RetryQueueConfig {
    RetryQueueConfig {
        max_size: fs.max_retry_queue_size,
        drop_policy: fs.retry.drop_policy,
        initial_delay: fs.retry.initial_delay,
        max_delay: fs.retry.max_delay,
        backoff_multiplier: fs.retry.multiplier,
        max_age: chrono::Duration::minutes(5),
        max_attempts: 10,
    }
}

/// The running process: every long-lived component plus the settings
/// used to construct it.
pub struct Application {
    settings: Settings,
    config: Configuration,
    metrics: Metrics,
    task_manager: TaskManager<SystemClock>,
    position_store: PositionStore<SystemClock>,
    dispatcher: Dispatcher<SystemClock>,
    file_supervisor: Option<FileSupervisor<SystemClock>>,
    container_supervisor: Option<ContainerSupervisor<SystemClock>>,
}

impl Application {
    /// Loads configuration, constructs every component, and validates
    /// connectivity to the container runtime if the container supervisor
    /// is enabled. Never panics; every failure surfaces as an `Err`.
    pub async fn new(settings: Settings) -> Result<Self, ApplicationError> {
        let yaml = std::fs::read_to_string(&settings.config_path).map_err(|source| ApplicationError::ConfigRead { path: settings.config_path.clone(), source })?;
        let config = ltap_core::config::load(&yaml)?;

        let metrics = Metrics::new();
        let clock = SystemClock;
        let task_manager = TaskManager::new(clock, settings.watchdog_threshold);
        let position_store = PositionStore::open(settings.position_store_path.clone(), clock, metrics.clone())?;

        let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(NullSink)];
        let dlq = Arc::new(MemoryDeadLetterQueue::new());
        let dispatcher = Dispatcher::new(clock, to_dispatcher_config(&config.dispatcher), sinks, dlq, metrics.clone());

        let file_supervisor = if config.file_supervisor.enabled {
            let notifier: Arc<dyn ltap_adapters::FsNotifier> = Arc::new(NotifyFsNotifier::new()?);
            Some(FileSupervisor::new(
                clock,
                config.file_supervisor.clone(),
                position_store.clone(),
                dispatcher.clone(),
                RetryQueue::new(clock, to_retry_queue_config(&config.file_supervisor)),
                notifier,
                task_manager.clone(),
                metrics.clone(),
                settings.service_name.clone(),
            ))
        } else {
            None
        };

        let container_supervisor = if config.container_supervisor.enabled {
            let runtime = Arc::new(BollardRuntimeClient::connect_with_local_defaults()?);
            runtime.ping().await?;
            Some(ContainerSupervisor::new(clock, config.container_supervisor.clone(), runtime, dispatcher.clone(), task_manager.clone(), metrics.clone(), settings.service_name.clone()))
        } else {
            None
        };

        Ok(Self { settings, config, metrics, task_manager, position_store, dispatcher, file_supervisor, container_supervisor })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Spawns every long-lived task: dispatcher workers, the position
    /// store flusher, the task manager watchdog, and both supervisors
    /// (spec.md §2 Flow, §5).
    pub async fn start(&self) -> Result<(), ApplicationError> {
        self.dispatcher.start()?;
        self.position_store.start(self.settings.position_flush_interval);
        self.task_manager.spawn_watchdog(self.settings.watchdog_interval);

        if let Some(supervisor) = &self.file_supervisor {
            supervisor.discover()?;
            supervisor.start();
        }
        if let Some(supervisor) = &self.container_supervisor {
            supervisor.start().await;
        }

        tracing::info!(component = "application", "started");
        Ok(())
    }

    /// Cancels every registered task, waits up to the configured
    /// deadline, then stops the dispatcher and flushes the position
    /// store synchronously (spec.md §5: "wait for all task-manager-
    /// registered tasks with a bounded deadline; any task still running
    /// at deadline is logged as 'slow shutdown' but not force-killed").
    pub async fn shutdown(&self) {
        tracing::info!(component = "application", "shutting down");

        if let Some(supervisor) = &self.file_supervisor {
            supervisor.stop();
        }
        if let Some(supervisor) = &self.container_supervisor {
            supervisor.stop();
        }

        let deadline = self.settings.shutdown_deadline;
        let wait = async {
            while self.task_manager.running_count() > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(deadline, wait).await.is_err() {
            tracing::warn!(component = "application", running = self.task_manager.running_count(), "slow shutdown: tasks still running at deadline");
        }

        self.dispatcher.stop(deadline).await;
        self.position_store.stop().await;
        tracing::info!(component = "application", "shutdown complete");
    }
}
