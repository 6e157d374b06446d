// SPDX-License-Identifier: MIT

//! Typed, normalized configuration and the validator that builds it from
//! [`super::raw::RawConfig`] (spec.md §6, §9 Design Notes).

use super::raw::RawConfig;
use crate::retry::DropPolicy;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("yaml parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStrategy {
    Beginning,
    Recent,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub dispatcher: DispatcherConfig,
    pub file_supervisor: FileSupervisorConfig,
    pub container_supervisor: ContainerSupervisorConfig,
    /// Defaults substituted during validation, for operator visibility
    /// (spec.md §9: "records fallbacks").
    pub fallbacks_applied: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub emergency_threshold: f64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { workers: 6, queue_size: 50_000, warning_threshold: 0.75, critical_threshold: 0.90, emergency_threshold: 0.95 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub initial_delay: chrono::Duration,
    pub max_delay: chrono::Duration,
    pub multiplier: f64,
    pub drop_policy: DropPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: chrono::Duration::milliseconds(500),
            max_delay: chrono::Duration::seconds(30),
            multiplier: 2.0,
            drop_policy: DropPolicy::Oldest,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEntry {
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub labels: std::collections::BTreeMap<String, String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileSupervisorConfig {
    pub enabled: bool,
    pub watch_directories: Vec<PathBuf>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub exclude_directories: Vec<PathBuf>,
    pub recursive: bool,
    pub poll_interval: std::time::Duration,
    pub seek_strategy: SeekStrategy,
    pub seek_recent_bytes: u64,
    pub ignore_old_timestamps: bool,
    pub max_retry_queue_size: usize,
    pub retry: RetryConfig,
    pub pipeline: Vec<PipelineEntry>,
}

impl Default for FileSupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watch_directories: Vec::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            exclude_directories: Vec::new(),
            recursive: false,
            poll_interval: std::time::Duration::from_secs(2),
            seek_strategy: SeekStrategy::End,
            seek_recent_bytes: 64 * 1024,
            ignore_old_timestamps: false,
            max_retry_queue_size: 10_000,
            retry: RetryConfig::default(),
            pipeline: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackGuardConfig {
    pub threshold: f64,
    pub window: std::time::Duration,
    pub min_sample_size: u64,
}

impl Default for FeedbackGuardConfig {
    fn default() -> Self {
        Self { threshold: 0.90, window: std::time::Duration::from_secs(60), min_sample_size: 100 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSupervisorConfig {
    pub enabled: bool,
    pub drain_duration: std::time::Duration,
    pub rotation_interval: std::time::Duration,
    pub stream_pool_capacity: usize,
    pub feedback_guard: FeedbackGuardConfig,
    pub metadata_cache_ttl: std::time::Duration,
    pub exclusion_list: Vec<String>,
}

impl Default for ContainerSupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            drain_duration: std::time::Duration::from_secs(1),
            rotation_interval: std::time::Duration::from_secs(600),
            stream_pool_capacity: 50,
            feedback_guard: FeedbackGuardConfig::default(),
            metadata_cache_ttl: std::time::Duration::from_secs(300),
            exclusion_list: Vec::new(),
        }
    }
}

/// Converts a [`RawConfig`] into a validated [`Configuration`], rejecting
/// inconsistent values and recording which defaults were substituted
/// (spec.md §9 Design Notes). This is the only place allowed to reason
/// about raw-tree shape; everything downstream consumes `Configuration`.
pub fn validate(raw: RawConfig) -> Result<Configuration, ConfigError> {
    let mut fallbacks = Vec::new();

    let default_dispatcher = DispatcherConfig::default();
    let dispatcher = DispatcherConfig {
        workers: or_default(raw.dispatcher.workers, default_dispatcher.workers, "dispatcher.workers", &mut fallbacks),
        queue_size: or_default(raw.dispatcher.queue_size, default_dispatcher.queue_size, "dispatcher.queue_size", &mut fallbacks),
        warning_threshold: or_default_f64(raw.dispatcher.warning_threshold, default_dispatcher.warning_threshold, "dispatcher.warning_threshold", &mut fallbacks),
        critical_threshold: or_default_f64(raw.dispatcher.critical_threshold, default_dispatcher.critical_threshold, "dispatcher.critical_threshold", &mut fallbacks),
        emergency_threshold: or_default_f64(raw.dispatcher.emergency_threshold, default_dispatcher.emergency_threshold, "dispatcher.emergency_threshold", &mut fallbacks),
    };
    if !(dispatcher.warning_threshold < dispatcher.critical_threshold && dispatcher.critical_threshold < dispatcher.emergency_threshold) {
        return Err(ConfigError::Invalid {
            field: "dispatcher.{warning,critical,emergency}_threshold",
            reason: "thresholds must be strictly increasing".into(),
        });
    }
    if dispatcher.workers == 0 {
        return Err(ConfigError::Invalid { field: "dispatcher.workers", reason: "must be >= 1".into() });
    }

    let rfs = raw.file_supervisor;
    let default_fs = FileSupervisorConfig::default();
    let seek_strategy = match rfs.seek_strategy.as_deref() {
        None => {
            fallbacks.push("file_supervisor.seek_strategy".into());
            default_fs.seek_strategy
        }
        Some("beginning") => SeekStrategy::Beginning,
        Some("recent") => SeekStrategy::Recent,
        Some("end") => SeekStrategy::End,
        Some(other) => {
            return Err(ConfigError::Invalid {
                field: "file_supervisor.seek_strategy",
                reason: format!("unknown strategy `{other}`, expected beginning|recent|end"),
            })
        }
    };
    let drop_policy = match rfs.retry.drop_policy.as_deref() {
        None => {
            fallbacks.push("file_supervisor.retry.drop_policy".into());
            DropPolicy::Oldest
        }
        Some("oldest") => DropPolicy::Oldest,
        Some("newest") => DropPolicy::Newest,
        Some("random") => DropPolicy::Random,
        Some(other) => {
            return Err(ConfigError::Invalid {
                field: "file_supervisor.retry.drop_policy",
                reason: format!("unknown policy `{other}`, expected oldest|newest|random"),
            })
        }
    };

    let pipeline = rfs
        .pipeline
        .into_iter()
        .map(|entry| PipelineEntry {
            files: entry.files,
            directories: entry.directories,
            labels: entry.labels,
            include_patterns: entry.include_patterns,
            exclude_patterns: entry.exclude_patterns,
            recursive: entry.recursive.unwrap_or(false),
        })
        .collect();

    let file_supervisor = FileSupervisorConfig {
        enabled: rfs.enabled.unwrap_or(true),
        watch_directories: rfs.watch_directories,
        include_patterns: rfs.include_patterns,
        exclude_patterns: rfs.exclude_patterns,
        exclude_directories: rfs.exclude_directories,
        recursive: rfs.recursive.unwrap_or(false),
        poll_interval: std::time::Duration::from_secs(or_default(rfs.poll_interval_secs, 2, "file_supervisor.poll_interval_secs", &mut fallbacks)),
        seek_strategy,
        seek_recent_bytes: or_default(rfs.seek_recent_bytes, default_fs.seek_recent_bytes, "file_supervisor.seek_recent_bytes", &mut fallbacks),
        ignore_old_timestamps: rfs.ignore_old_timestamps.unwrap_or(false),
        max_retry_queue_size: or_default(rfs.max_retry_queue_size, default_fs.max_retry_queue_size, "file_supervisor.max_retry_queue_size", &mut fallbacks),
        retry: RetryConfig {
            initial_delay: chrono::Duration::milliseconds(or_default(rfs.retry.initial_delay_ms, 500, "file_supervisor.retry.initial_delay_ms", &mut fallbacks) as i64),
            max_delay: chrono::Duration::milliseconds(or_default(rfs.retry.max_delay_ms, 30_000, "file_supervisor.retry.max_delay_ms", &mut fallbacks) as i64),
            multiplier: or_default_f64(rfs.retry.multiplier, 2.0, "file_supervisor.retry.multiplier", &mut fallbacks),
            drop_policy,
        },
        pipeline,
    };

    let rcs = raw.container_supervisor;
    let default_cs = ContainerSupervisorConfig::default();
    let container_supervisor = ContainerSupervisorConfig {
        enabled: rcs.enabled.unwrap_or(true),
        drain_duration: std::time::Duration::from_millis(or_default(rcs.drain_duration_ms, 1000, "container_supervisor.drain_duration_ms", &mut fallbacks)),
        rotation_interval: std::time::Duration::from_secs(or_default(rcs.rotation_interval_secs, 600, "container_supervisor.rotation_interval_secs", &mut fallbacks)),
        stream_pool_capacity: or_default(rcs.stream_pool_capacity, default_cs.stream_pool_capacity, "container_supervisor.stream_pool_capacity", &mut fallbacks),
        feedback_guard: FeedbackGuardConfig {
            threshold: or_default_f64(rcs.feedback_guard.threshold, 0.90, "container_supervisor.feedback_guard.threshold", &mut fallbacks),
            window: std::time::Duration::from_secs(or_default(rcs.feedback_guard.window_secs, 60, "container_supervisor.feedback_guard.window_secs", &mut fallbacks)),
            min_sample_size: or_default(rcs.feedback_guard.min_sample_size, 100, "container_supervisor.feedback_guard.min_sample_size", &mut fallbacks),
        },
        metadata_cache_ttl: std::time::Duration::from_secs(or_default(rcs.metadata_cache_ttl_secs, 300, "container_supervisor.metadata_cache_ttl_secs", &mut fallbacks)),
        exclusion_list: rcs.exclusion_list,
    };
    if container_supervisor.stream_pool_capacity == 0 {
        return Err(ConfigError::Invalid { field: "container_supervisor.stream_pool_capacity", reason: "must be >= 1".into() });
    }

    Ok(Configuration { dispatcher, file_supervisor, container_supervisor, fallbacks_applied: fallbacks })
}

fn or_default<T: Copy>(value: Option<T>, default: T, field: &str, fallbacks: &mut Vec<String>) -> T {
    match value {
        Some(v) => v,
        None => {
            fallbacks.push(field.to_string());
            default
        }
    }
}

fn or_default_f64(value: Option<f64>, default: f64, field: &str, fallbacks: &mut Vec<String>) -> f64 {
    or_default(value, default, field, fallbacks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::raw::RawConfig;

    #[test]
    fn defaults_fill_in_when_raw_is_empty() {
        let config = validate(RawConfig::default()).unwrap();
        assert_eq!(config.dispatcher.workers, 6);
        assert_eq!(config.file_supervisor.seek_strategy, SeekStrategy::End);
        assert!(!config.fallbacks_applied.is_empty());
    }

    #[test]
    fn rejects_unknown_seek_strategy() {
        let mut raw = RawConfig::default();
        raw.file_supervisor.seek_strategy = Some("yesterday".into());
        let err = validate(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "file_supervisor.seek_strategy", .. }));
    }

    #[test]
    fn rejects_non_increasing_thresholds() {
        let mut raw = RawConfig::default();
        raw.dispatcher.warning_threshold = Some(0.95);
        raw.dispatcher.critical_threshold = Some(0.50);
        let err = validate(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn parses_yaml_through_the_raw_layer() {
        let yaml = r#"
dispatcher:
  workers: 4
file_supervisor:
  seek_strategy: beginning
  retry:
    drop_policy: newest
"#;
        let raw = super::super::raw::parse_yaml(yaml).unwrap();
        let config = validate(raw).unwrap();
        assert_eq!(config.dispatcher.workers, 4);
        assert_eq!(config.file_supervisor.seek_strategy, SeekStrategy::Beginning);
        assert_eq!(config.file_supervisor.retry.drop_policy, DropPolicy::Newest);
    }

    #[test]
    fn unknown_key_is_rejected_at_the_raw_layer() {
        let yaml = "dispatcher:\n  bogus_field: 1\n";
        assert!(super::super::raw::parse_yaml(yaml).is_err());
    }
}
