// SPDX-License-Identifier: MIT

//! TTL-bounded cache of container metadata (spec.md §4.5.5).
//!
//! Reads take a read-lock; writes take a write-lock (spec.md §5). Every
//! value crossing the lock boundary, in either direction, is cloned so the
//! cache and its callers never alias mutable state (spec.md §4.5.5: "deep-
//! copy on read and on write").

use ltap_core::{Clock, ContainerMetadata};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct Entry {
    value: ContainerMetadata,
    inserted_at: std::time::Instant,
}

#[derive(Default)]
struct Stats {
    hits: u64,
    misses: u64,
}

struct Inner<C: Clock> {
    ttl: std::time::Duration,
    clock: C,
    entries: RwLock<HashMap<String, Entry>>,
    stats: RwLock<Stats>,
}

/// Keyed by `container_id`. `C: Clock` lets tests expire entries
/// deterministically with `FakeClock`.
#[derive(Clone)]
pub struct MetadataCache<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> MetadataCache<C> {
    pub fn new(ttl: std::time::Duration, clock: C) -> Self {
        Self { inner: Arc::new(Inner { ttl, clock, entries: RwLock::new(HashMap::new()), stats: RwLock::new(Stats::default()) }) }
    }

    /// Lazy expiry: an entry older than `ttl` behaves as a miss, even
    /// though it has not yet been physically removed (spec.md §4.5.5).
    pub fn get(&self, container_id: &str) -> Option<ContainerMetadata> {
        let now = self.inner.clock.now();
        let hit = {
            let entries = self.inner.entries.read();
            entries.get(container_id).and_then(|entry| if now.duration_since(entry.inserted_at) <= self.inner.ttl { Some(entry.value.clone()) } else { None })
        };
        let mut stats = self.inner.stats.write();
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    /// Deep-copies `value` before storing it (spec.md §4.5.5).
    pub fn set(&self, container_id: String, value: ContainerMetadata) {
        let entry = Entry { value: value.clone(), inserted_at: self.inner.clock.now() };
        self.inner.entries.write().insert(container_id, entry);
    }

    pub fn delete(&self, container_id: &str) {
        self.inner.entries.write().remove(container_id);
    }

    /// Periodically removes stale entries to bound memory (spec.md
    /// §4.5.5). Called from a cleanup tick in the container supervisor.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let ttl = self.inner.ttl;
        let mut entries = self.inner.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.inserted_at) <= ttl);
        before - entries.len()
    }

    pub fn size(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn hits(&self) -> u64 {
        self.inner.stats.read().hits
    }

    pub fn misses(&self) -> u64 {
        self.inner.stats.read().misses
    }
}
