// SPDX-License-Identifier: MIT

//! Container-side state and metadata (spec.md §3, §4.5.5).
//!
//! Adapted from the teacher's `oj_core::container::ContainerConfig`
//! (a single-field image descriptor passed to a spawn effect) into the
//! richer shapes the capture engine's discovery and metadata cache need.

use crate::labels::LabelMap;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Snapshot of container metadata as returned by `inspect` (spec.md §6).
/// Always stored and handed back as an owned, deep copy (spec.md §4.5.5) —
/// nothing here borrows from the runtime client.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct ContainerMetadata {
    pub name: String,
    pub image: String,
    /// `"running"` or `"exited"`, derived from `ContainerDetail::running` (spec.md §6).
    pub state: String,
    pub hostname: String,
    pub platform: String,
    pub command: String,
    /// network name -> ip address
    pub networks: BTreeMap<String, String>,
    pub primary_network: Option<String>,
    /// raw container labels, pre-filter; the container supervisor applies
    /// the denylist when building record labels (spec.md §6).
    pub container_labels: BTreeMap<String, String>,
}

impl ContainerMetadata {
    pub fn primary_network_ip(&self) -> Option<&str> {
        self.primary_network
            .as_ref()
            .and_then(|name| self.networks.get(name))
            .map(String::as_str)
    }
}

/// One entry per active container, owned by the Container Supervisor
/// (spec.md §3). The cancellation token is the cooperative-cancellation
/// handle described in spec.md §4.5.2 step 6.
pub struct ContainerStreamState {
    pub container_id: String,
    pub container_name: String,
    pub labels: LabelMap,
    pub stream_created_at: DateTime<Utc>,
    pub rotation_count: u64,
    pub last_read_at: DateTime<Utc>,
    pub collect_cancel: CancellationToken,
    pub drain_deadline: Option<DateTime<Utc>>,
}

impl ContainerStreamState {
    pub fn new(container_id: String, container_name: String, labels: LabelMap, now: DateTime<Utc>, cancel: CancellationToken) -> Self {
        Self {
            container_id,
            container_name,
            labels,
            stream_created_at: now,
            rotation_count: 0,
            last_read_at: now,
            collect_cancel: cancel,
            drain_deadline: None,
        }
    }

    pub fn mark_rotated(&mut self, now: DateTime<Utc>) {
        self.rotation_count += 1;
        self.last_read_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_network_ip_resolves_from_map() {
        let mut meta = ContainerMetadata::default();
        meta.networks.insert("bridge".into(), "172.17.0.2".into());
        meta.primary_network = Some("bridge".into());
        assert_eq!(meta.primary_network_ip(), Some("172.17.0.2"));
    }

    #[test]
    fn primary_network_ip_none_when_unset() {
        let meta = ContainerMetadata::default();
        assert_eq!(meta.primary_network_ip(), None);
    }

    #[test]
    fn mark_rotated_increments_count_and_updates_last_read() {
        let mut state = ContainerStreamState::new(
            "abc123".into(),
            "web".into(),
            LabelMap::new(),
            DateTime::UNIX_EPOCH,
            CancellationToken::new(),
        );
        let later = DateTime::UNIX_EPOCH + chrono::Duration::minutes(10);
        state.mark_rotated(later);
        assert_eq!(state.rotation_count, 1);
        assert_eq!(state.last_read_at, later);
    }
}
