//! File watching seam.
//!
//! The core never watches the file system itself: the embedding
//! application (usually the LSP front-end asking the client for
//! `workspace/didChangeWatchedFiles`) implements [`FileWatcherManager`]
//! and calls back with the changes.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Created,
    Changed,
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: FileChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

pub type WatchCallback = Arc<dyn Fn(&[FileChange]) + Send + Sync>;

/// Registration returned by [`FileWatcherManager::add_file_watchers`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchHandle(pub u64);

pub trait FileWatcherManager: Send + Sync {
    /// Watch `paths` (files or directories, recursively) and report
    /// changes below them to `callback`.
    fn add_file_watchers(&self, paths: &[PathBuf], callback: WatchCallback) -> WatchHandle;

    fn remove_file_watchers(&self, handle: WatchHandle);
}

/// Watcher that never reports anything. Changes can still be pushed with
/// [`crate::imports::ImportsManager::did_change_watched_files`].
#[derive(Debug, Default)]
pub struct NoopFileWatcherManager {
    next: AtomicU64,
}

impl FileWatcherManager for NoopFileWatcherManager {
    fn add_file_watchers(&self, _paths: &[PathBuf], _callback: WatchCallback) -> WatchHandle {
        WatchHandle(self.next.fetch_add(1, Ordering::Relaxed))
    }

    fn remove_file_watchers(&self, _handle: WatchHandle) {}
}

/// Keeps every registration and lets callers fire changes by hand.
#[derive(Default)]
pub struct InMemoryFileWatcherManager {
    next: AtomicU64,
    watchers: Mutex<Vec<(WatchHandle, Vec<PathBuf>, WatchCallback)>>,
}

impl InMemoryFileWatcherManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths of all live registrations, in registration order.
    pub fn watched_paths(&self) -> Vec<Vec<PathBuf>> {
        self.watchers.lock().iter().map(|(_, p, _)| p.clone()).collect()
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Deliver `changes` to every registration watching one of the paths.
    pub fn fire(&self, changes: &[FileChange]) {
        let callbacks: Vec<WatchCallback> = self
            .watchers
            .lock()
            .iter()
            .filter(|(_, paths, _)| {
                changes
                    .iter()
                    .any(|c| paths.iter().any(|p| c.path.starts_with(p)))
            })
            .map(|(_, _, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(changes);
        }
    }
}

impl FileWatcherManager for InMemoryFileWatcherManager {
    fn add_file_watchers(&self, paths: &[PathBuf], callback: WatchCallback) -> WatchHandle {
        let handle = WatchHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.watchers.lock().push((handle, paths.to_vec(), callback));
        handle
    }

    fn remove_file_watchers(&self, handle: WatchHandle) {
        self.watchers.lock().retain(|(h, _, _)| *h != handle);
    }
}
