// SPDX-License-Identifier: MIT

//! Raw, permissive parse tree for YAML configuration (spec.md §9 Design
//! Notes: "a tagged-union parse tree for the raw YAML"). Deserialized
//! directly from `serde_yaml`; `deny_unknown_fields` keeps typos from
//! silently becoming no-ops, while still only describing shape, not
//! semantics — that validation happens in [`super::validate`].

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RawConfig {
    pub dispatcher: RawDispatcherConfig,
    pub file_supervisor: RawFileSupervisorConfig,
    pub container_supervisor: RawContainerSupervisorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RawDispatcherConfig {
    pub workers: Option<usize>,
    pub queue_size: Option<usize>,
    pub warning_threshold: Option<f64>,
    pub critical_threshold: Option<f64>,
    pub emergency_threshold: Option<f64>,
}

impl Default for RawDispatcherConfig {
    fn default() -> Self {
        Self { workers: None, queue_size: None, warning_threshold: None, critical_threshold: None, emergency_threshold: None }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct RawFileSupervisorConfig {
    pub enabled: Option<bool>,
    pub watch_directories: Vec<PathBuf>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub exclude_directories: Vec<PathBuf>,
    pub recursive: Option<bool>,
    pub poll_interval_secs: Option<u64>,
    pub seek_strategy: Option<String>,
    pub seek_recent_bytes: Option<u64>,
    pub ignore_old_timestamps: Option<bool>,
    pub max_retry_queue_size: Option<usize>,
    pub retry: RawRetryConfig,
    pub pipeline: Vec<RawPipelineEntry>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct RawRetryConfig {
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub multiplier: Option<f64>,
    pub drop_policy: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct RawPipelineEntry {
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub labels: std::collections::BTreeMap<String, String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub recursive: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct RawContainerSupervisorConfig {
    pub enabled: Option<bool>,
    pub drain_duration_ms: Option<u64>,
    pub rotation_interval_secs: Option<u64>,
    pub stream_pool_capacity: Option<usize>,
    pub feedback_guard: RawFeedbackGuardConfig,
    pub metadata_cache_ttl_secs: Option<u64>,
    pub exclusion_list: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct RawFeedbackGuardConfig {
    pub threshold: Option<f64>,
    pub window_secs: Option<u64>,
    pub min_sample_size: Option<u64>,
}

/// Parses YAML text into the permissive raw tree. Loading the file itself
/// (path resolution, reload-on-change) is out of scope (spec.md §1); this
/// is the boundary the core accepts.
pub fn parse_yaml(text: &str) -> Result<RawConfig, serde_yaml::Error> {
    serde_yaml::from_str(text)
}
