// SPDX-License-Identifier: MIT

//! Durable per-file offset persistence (spec.md §4.2).
//!
//! Between flushes, all updates live in a `parking_lot::RwLock`-guarded map.
//! A periodic flusher writes an atomic snapshot (serialize to a temp file in
//! the same directory, then `rename` over the destination) so a crash
//! exposes either the pre- or post-write state, never a torn record
//! (spec.md §3 `PositionRecord` invariant). The rename-over-temp technique
//! and `.bak` rotation are adapted from the teacher's
//! `oj_daemon::storage::snapshot::rotate_bak_path`.

use ltap_core::{Clock, FileFingerprint, Metrics, PositionRecord};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum PositionStoreError {
    #[error("io error writing snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

const MAX_BAK_FILES: u32 = 3;

/// Picks the next `.bak` / `.bak.N` path, rotating older backups out.
/// Adapted from `oj_daemon::storage::snapshot::rotate_bak_path`.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| if n == 1 { path.with_extension("bak") } else { path.with_extension(format!("bak.{n}")) };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = std::fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = std::fs::rename(&src, bak(n + 1));
        }
    }
    bak(1)
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct Snapshot {
    records: HashMap<PathBuf, PositionRecord>,
}

struct Inner<C: Clock> {
    snapshot_path: PathBuf,
    records: RwLock<HashMap<PathBuf, PositionRecord>>,
    clock: C,
    metrics: Metrics,
    stopped: Notify,
    cancel: CancellationToken,
}

/// Durable position store. `C: Clock` is generic so tests can drive the
/// flush interval deterministically with `FakeClock`.
#[derive(Clone)]
pub struct PositionStore<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> PositionStore<C> {
    /// Loads the existing snapshot (if any) from `snapshot_path`.
    pub fn open(snapshot_path: PathBuf, clock: C, metrics: Metrics) -> Result<Self, PositionStoreError> {
        let records = if snapshot_path.exists() {
            let bytes = std::fs::read(&snapshot_path)?;
            let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
            snapshot.records
        } else {
            HashMap::new()
        };
        Ok(Self {
            inner: Arc::new(Inner {
                snapshot_path,
                records: RwLock::new(records),
                clock,
                metrics,
                stopped: Notify::new(),
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Returns the stored record for `path`, or `None` if never seen. The
    /// caller (File Supervisor) is responsible for comparing
    /// [`PositionRecord::is_stale`] against the current fingerprint and
    /// applying the seek strategy when it is (spec.md §4.2, §4.4.2).
    pub fn get_record(&self, path: &Path) -> Option<PositionRecord> {
        self.inner.records.read().get(path).cloned()
    }

    /// Convenience accessor matching spec.md §4.2's `get_offset(path) → int`.
    pub fn get_offset(&self, path: &Path) -> Option<u64> {
        self.get_record(path).map(|r| r.offset)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(&self, path: &Path, offset: u64, size: u64, mtime: chrono::DateTime<chrono::Utc>, fingerprint: FileFingerprint, bytes_delta: u64, lines_delta: u64) {
        let now = self.inner.clock.now_utc();
        let mut records = self.inner.records.write();
        let entry = records.entry(path.to_path_buf()).or_insert_with(|| PositionRecord {
            path: path.to_path_buf(),
            offset: 0,
            size: 0,
            mtime,
            fingerprint,
            bytes_read_total: 0,
            lines_read_total: 0,
            updated_at: now,
        });
        entry.offset = offset;
        entry.size = size;
        entry.mtime = mtime;
        entry.fingerprint = fingerprint;
        entry.bytes_read_total += bytes_delta;
        entry.lines_read_total += lines_delta;
        entry.updated_at = now;
    }

    pub fn remove(&self, path: &Path) {
        self.inner.records.write().remove(path);
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.records.read().len()
    }

    /// Writes the durable snapshot atomically: serialize, write to a temp
    /// file beside the destination, then `rename` over it. The previous
    /// snapshot is preserved as a rotated `.bak` before being replaced.
    pub fn flush(&self) -> Result<(), PositionStoreError> {
        let snapshot = {
            let records = self.inner.records.read();
            Snapshot { records: records.clone() }
        };
        let bytes = serde_json::to_vec(&snapshot)?;

        let tmp_path = self.inner.snapshot_path.with_extension("tmp");
        if let Some(parent) = self.inner.snapshot_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp_path, &bytes)?;

        if self.inner.snapshot_path.exists() {
            let bak = rotate_bak_path(&self.inner.snapshot_path);
            let _ = std::fs::copy(&self.inner.snapshot_path, bak);
        }
        std::fs::rename(&tmp_path, &self.inner.snapshot_path)?;
        tracing::debug!(component = "position_store", records = snapshot.records.len(), "flushed position snapshot");
        Ok(())
    }

    /// Spawns the periodic flusher task (spec.md §4.2).
    pub fn start(&self, flush_interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        let cancel = self.inner.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = store.flush() {
                            tracing::warn!(component = "position_store", %error, "periodic flush failed");
                            store.inner.metrics.errors("position_store", "flush_failed");
                        }
                    }
                    _ = cancel.cancelled() => {
                        tracing::info!(component = "position_store", "stopping, flushing synchronously");
                        if let Err(error) = store.flush() {
                            tracing::warn!(component = "position_store", %error, "final flush failed");
                        }
                        store.inner.stopped.notify_one();
                        break;
                    }
                }
            }
        })
    }

    /// Cancels the flusher and waits for its synchronous final flush.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        self.inner.stopped.notified().await;
    }
}
