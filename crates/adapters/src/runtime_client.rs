// SPDX-License-Identifier: MIT

//! Container runtime client (spec.md §6 External interfaces). The
//! `ContainerRuntimeClient` trait is the seam the container supervisor
//! calls through; `BollardRuntimeClient` is the real Docker Engine API
//! implementation, chosen because `bollard::container::logs` already
//! yields a demultiplexed `LogOutput::StdOut`/`StdErr` stream, satisfying
//! the "demultiplexed stream" requirement without a hand-rolled frame
//! splitter.

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::query_parameters::{EventsOptions, InspectContainerOptions, ListContainersOptions, LogsOptions};
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeClientError {
    #[error("container runtime error: {0}")]
    Runtime(#[from] bollard::errors::Error),
    #[error("container not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerLifecycleKind {
    Start,
    Die,
}

#[derive(Debug, Clone)]
pub struct ContainerLifecycleEvent {
    pub kind: ContainerLifecycleKind,
    pub container_id: String,
}

#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContainerDetail {
    pub id: String,
    pub name: String,
    pub image: String,
    pub hostname: String,
    pub platform: String,
    pub command: String,
    pub running: bool,
    pub labels: std::collections::BTreeMap<String, String>,
    pub networks: std::collections::BTreeMap<String, String>,
}

pub type LogChunkStream = Pin<Box<dyn Stream<Item = Result<LogChunk, RuntimeClientError>> + Send>>;
pub type LifecycleEventStream = Pin<Box<dyn Stream<Item = Result<ContainerLifecycleEvent, RuntimeClientError>> + Send>>;

#[derive(Debug, Clone)]
pub enum LogChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// spec.md §6: "Consumed by the core" — the container runtime client.
#[async_trait]
pub trait ContainerRuntimeClient: Send + Sync {
    async fn events(&self) -> Result<LifecycleEventStream, RuntimeClientError>;
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeClientError>;
    async fn inspect(&self, container_id: &str) -> Result<ContainerDetail, RuntimeClientError>;
    async fn container_logs(&self, container_id: &str, follow: bool, since: DateTime<Utc>) -> Result<LogChunkStream, RuntimeClientError>;
    async fn ping(&self) -> Result<(), RuntimeClientError>;
}

pub struct BollardRuntimeClient {
    docker: Docker,
}

impl BollardRuntimeClient {
    pub fn connect_with_local_defaults() -> Result<Self, RuntimeClientError> {
        Ok(Self { docker: Docker::connect_with_local_defaults()? })
    }
}

#[async_trait]
impl ContainerRuntimeClient for BollardRuntimeClient {
    async fn events(&self) -> Result<LifecycleEventStream, RuntimeClientError> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        filters.insert("event".to_string(), vec!["start".to_string(), "die".to_string()]);

        let stream = self.docker.events(Some(EventsOptions { filters: Some(filters), ..Default::default() }));
        let mapped = stream.map(|item| {
            let message = item?;
            let action = message.action.as_deref().unwrap_or_default();
            let kind = match action {
                "start" => ContainerLifecycleKind::Start,
                "die" => ContainerLifecycleKind::Die,
                other => return Err(RuntimeClientError::NotFound(format!("unexpected event action `{other}`"))),
            };
            let container_id = message.actor.and_then(|actor| actor.id).unwrap_or_default();
            Ok(ContainerLifecycleEvent { kind, container_id })
        });
        Ok(Box::pin(mapped))
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeClientError> {
        let summaries = self.docker.list_containers(Some(ListContainersOptions { all: false, ..Default::default() })).await?;
        Ok(summaries
            .into_iter()
            .map(|c| ContainerSummary { id: c.id.unwrap_or_default(), names: c.names.unwrap_or_default() })
            .collect())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerDetail, RuntimeClientError> {
        let detail = self.docker.inspect_container(container_id, None::<InspectContainerOptions>).await?;
        let config = detail.config.unwrap_or_default();
        let state = detail.state.unwrap_or_default();
        let network_settings = detail.network_settings.unwrap_or_default();

        let mut networks = std::collections::BTreeMap::new();
        if let Some(nets) = network_settings.networks {
            for (name, endpoint) in nets {
                if let Some(ip) = endpoint.ip_address.filter(|ip| !ip.is_empty()) {
                    networks.insert(name, ip);
                }
            }
        }

        Ok(ContainerDetail {
            id: detail.id.unwrap_or_default(),
            name: detail.name.unwrap_or_default().trim_start_matches('/').to_string(),
            image: config.image.unwrap_or_default(),
            hostname: config.hostname.unwrap_or_default(),
            platform: detail.platform.unwrap_or_default(),
            command: config.cmd.unwrap_or_default().join(" "),
            running: state.running.unwrap_or(false),
            labels: config.labels.unwrap_or_default().into_iter().collect(),
            networks,
        })
    }

    async fn container_logs(&self, container_id: &str, follow: bool, since: DateTime<Utc>) -> Result<LogChunkStream, RuntimeClientError> {
        let options = LogsOptions {
            follow,
            stdout: true,
            stderr: true,
            timestamps: true,
            since: since.timestamp() as i32,
            ..Default::default()
        };
        let stream = self.docker.logs(container_id, Some(options));
        let mapped = stream.map(|item| {
            let output = item?;
            Ok(match output {
                LogOutput::StdOut { message } => LogChunk::Stdout(message.to_vec()),
                LogOutput::StdErr { message } => LogChunk::Stderr(message.to_vec()),
                LogOutput::Console { message } => LogChunk::Stdout(message.to_vec()),
                LogOutput::StdIn { message } => LogChunk::Stdout(message.to_vec()),
            })
        });
        Ok(Box::pin(mapped))
    }

    async fn ping(&self) -> Result<(), RuntimeClientError> {
        self.docker.ping().await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    /// Scripted runtime client for supervisor tests: lifecycle events and
    /// per-container log chunks are queued ahead of time.
    pub struct FakeRuntimeClient {
        lifecycle_tx: mpsc::UnboundedSender<Result<ContainerLifecycleEvent, RuntimeClientError>>,
        lifecycle_rx: Mutex<Option<mpsc::UnboundedReceiver<Result<ContainerLifecycleEvent, RuntimeClientError>>>>,
        containers: Mutex<HashMap<String, ContainerDetail>>,
        log_chunks: Mutex<HashMap<String, VecDeque<LogChunk>>>,
        inspect_calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeRuntimeClient {
        pub fn new() -> Self {
            let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
            Self {
                lifecycle_tx,
                lifecycle_rx: Mutex::new(Some(lifecycle_rx)),
                containers: Mutex::new(HashMap::new()),
                log_chunks: Mutex::new(HashMap::new()),
                inspect_calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn push_lifecycle(&self, kind: ContainerLifecycleKind, container_id: impl Into<String>) {
            let _ = self.lifecycle_tx.send(Ok(ContainerLifecycleEvent { kind, container_id: container_id.into() }));
        }

        pub fn register_container(&self, detail: ContainerDetail) {
            self.containers.lock().insert(detail.id.clone(), detail);
        }

        pub fn push_log_chunk(&self, container_id: impl Into<String>, chunk: LogChunk) {
            self.log_chunks.lock().entry(container_id.into()).or_default().push_back(chunk);
        }

        pub fn inspect_call_count(&self, container_id: &str) -> usize {
            self.inspect_calls.lock().iter().filter(|id| id.as_str() == container_id).count()
        }
    }

    impl Default for FakeRuntimeClient {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ContainerRuntimeClient for FakeRuntimeClient {
        async fn events(&self) -> Result<LifecycleEventStream, RuntimeClientError> {
            let rx = self.lifecycle_rx.lock().take().expect("fake events() stream already taken");
            Ok(Box::pin(UnboundedReceiverStream::new(rx)))
        }

        async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeClientError> {
            Ok(self.containers.lock().values().map(|d| ContainerSummary { id: d.id.clone(), names: vec![d.name.clone()] }).collect())
        }

        async fn inspect(&self, container_id: &str) -> Result<ContainerDetail, RuntimeClientError> {
            self.inspect_calls.lock().push(container_id.to_string());
            self.containers.lock().get(container_id).cloned().ok_or_else(|| RuntimeClientError::NotFound(container_id.to_string()))
        }

        async fn container_logs(&self, container_id: &str, _follow: bool, _since: DateTime<Utc>) -> Result<LogChunkStream, RuntimeClientError> {
            let chunks: Vec<_> = self.log_chunks.lock().get_mut(container_id).map(std::mem::take).unwrap_or_default().into();
            let stream = futures_util::stream::iter(chunks.into_iter().map(Ok));
            Ok(Box::pin(stream))
        }

        async fn ping(&self) -> Result<(), RuntimeClientError> {
            Ok(())
        }
    }
}
