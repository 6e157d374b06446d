// SPDX-License-Identifier: MIT

//! Filesystem change notification for the tail loop (spec.md §6:
//! "events for paths with operation codes (write/create/chmod/remove)").
//! Built on the `notify` crate's recommended (platform-native) watcher,
//! the same crate and channel-bridging idiom the teacher uses to drive a
//! blocking `tail -f` loop from async code.

use async_trait::async_trait;
use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Write,
    Create,
    Chmod,
    Remove,
}

#[derive(Debug, Clone)]
pub struct FsChangeEvent {
    pub path: PathBuf,
    pub op: FsOp,
}

#[derive(Debug, Error)]
pub enum FsNotifierError {
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),
}

/// Abstraction the file supervisor's tail loop selects on alongside its
/// poll ticker (spec.md §4.4.3).
#[async_trait]
pub trait FsNotifier: Send + Sync {
    /// Starts watching `path`'s parent directory (watching the file
    /// itself misses recreate-after-rotation events on many platforms).
    fn watch(&self, path: &Path) -> Result<(), FsNotifierError>;
    fn unwatch(&self, path: &Path);
    /// Receives the next change event for a watched path. Returns `None`
    /// once the notifier has been dropped.
    async fn recv(&self) -> Option<FsChangeEvent>;
}

/// `notify`-backed implementation (spec.md §6, grounded in the teacher's
/// `tail_file` use of `notify::recommended_watcher`).
pub struct NotifyFsNotifier {
    watcher: Mutex<notify::RecommendedWatcher>,
    watched_dirs: Mutex<HashSet<PathBuf>>,
    watched_files: Arc<Mutex<HashSet<PathBuf>>>,
    rx: Mutex<tokio::sync::mpsc::UnboundedReceiver<FsChangeEvent>>,
}

impl NotifyFsNotifier {
    pub fn new() -> Result<Self, FsNotifierError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let watched_files: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));
        let filter = Arc::clone(&watched_files);

        let watcher = notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| {
            let Ok(event) = res else { return };
            let Some(op) = classify(&event.kind) else { return };
            let filter = filter.lock();
            for path in &event.paths {
                if filter.contains(path) {
                    let _ = tx.send(FsChangeEvent { path: path.clone(), op });
                }
            }
        })?;

        Ok(Self { watcher: Mutex::new(watcher), watched_dirs: Mutex::new(HashSet::new()), watched_files, rx: Mutex::new(rx) })
    }
}

fn classify(kind: &EventKind) -> Option<FsOp> {
    match kind {
        EventKind::Create(_) => Some(FsOp::Create),
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => Some(FsOp::Chmod),
        EventKind::Modify(_) => Some(FsOp::Write),
        EventKind::Remove(_) => Some(FsOp::Remove),
        _ => None,
    }
}

#[async_trait]
impl FsNotifier for NotifyFsNotifier {
    fn watch(&self, path: &Path) -> Result<(), FsNotifierError> {
        self.watched_files.lock().insert(path.to_path_buf());
        let dir = path.parent().unwrap_or(path).to_path_buf();
        let mut dirs = self.watched_dirs.lock();
        if !dirs.contains(&dir) {
            self.watcher.lock().watch(&dir, RecursiveMode::NonRecursive)?;
            dirs.insert(dir);
        }
        Ok(())
    }

    fn unwatch(&self, path: &Path) {
        self.watched_files.lock().remove(path);
    }

    async fn recv(&self) -> Option<FsChangeEvent> {
        std::future::poll_fn(|cx| self.rx.lock().poll_recv(cx)).await
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use tokio::sync::mpsc;

    /// In-memory notifier for tests: push events with `push` instead of
    /// relying on real filesystem activity.
    pub struct FakeFsNotifier {
        tx: mpsc::UnboundedSender<FsChangeEvent>,
        rx: Mutex<mpsc::UnboundedReceiver<FsChangeEvent>>,
        watched: Mutex<HashSet<PathBuf>>,
    }

    impl FakeFsNotifier {
        pub fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self { tx, rx: Mutex::new(rx), watched: Mutex::new(HashSet::new()) }
        }

        pub fn push(&self, path: impl Into<PathBuf>, op: FsOp) {
            let _ = self.tx.send(FsChangeEvent { path: path.into(), op });
        }

        pub fn is_watched(&self, path: &Path) -> bool {
            self.watched.lock().contains(path)
        }
    }

    impl Default for FakeFsNotifier {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl FsNotifier for FakeFsNotifier {
        fn watch(&self, path: &Path) -> Result<(), FsNotifierError> {
            self.watched.lock().insert(path.to_path_buf());
            Ok(())
        }

        fn unwatch(&self, path: &Path) {
            self.watched.lock().remove(path);
        }

        async fn recv(&self) -> Option<FsChangeEvent> {
            std::future::poll_fn(|cx| self.rx.lock().poll_recv(cx)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeFsNotifier;
    use super::*;

    #[tokio::test]
    async fn fake_notifier_delivers_pushed_events() {
        let notifier = FakeFsNotifier::new();
        notifier.watch(Path::new("/tmp/a.log")).unwrap();
        notifier.push("/tmp/a.log", FsOp::Write);

        let event = notifier.recv().await.unwrap();
        assert_eq!(event.path, PathBuf::from("/tmp/a.log"));
        assert_eq!(event.op, FsOp::Write);
    }

    #[test]
    fn classify_maps_notify_event_kinds() {
        assert_eq!(classify(&EventKind::Create(notify::event::CreateKind::File)), Some(FsOp::Create));
        assert_eq!(classify(&EventKind::Remove(notify::event::RemoveKind::File)), Some(FsOp::Remove));
        assert_eq!(classify(&EventKind::Modify(notify::event::ModifyKind::Data(notify::event::DataChange::Any))), Some(FsOp::Write));
        assert_eq!(classify(&EventKind::Access(notify::event::AccessKind::Any)), None);
    }
}
