//! Entries of the imports manager tables.
//!
//! An entry owns one loaded descriptor together with the namespaces that
//! imported it and the file watcher registration that invalidates it. All
//! access goes through the entry's own lock; loading holds it, so two
//! namespaces importing the same library wait for one load.

use std::path::{Path, PathBuf};
use std::sync::Weak;

use parking_lot::{Mutex, MutexGuard};

use super::watcher::WatchHandle;
use crate::base::{is_within, normalize_path};
use crate::namespace::Namespace;

/// Identity of an entry: resolved name (or path) and resolved arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct EntryKey {
    pub name: String,
    pub args: Vec<String>,
}

impl EntryKey {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Files whose change makes an entry stale.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Watched {
    pub origin: Option<PathBuf>,
    /// Every file below these directories counts.
    pub dirs: Vec<PathBuf>,
}

impl Watched {
    pub fn affected_by(&self, path: &Path) -> bool {
        self.origin
            .as_deref()
            .is_some_and(|origin| normalize_path(path) == normalize_path(origin))
            || self.dirs.iter().any(|dir| is_within(path, dir))
    }

    /// Paths handed to the file watcher: the origin's directory and the watched directories.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Vec::new();
        if let Some(parent) = self.origin.as_deref().and_then(Path::parent) {
            paths.push(parent.to_path_buf());
        }
        for dir in &self.dirs {
            if !paths.contains(dir) {
                paths.push(dir.clone());
            }
        }
        paths
    }
}

pub(crate) struct EntryState<D> {
    pub value: Option<D>,
    importers: Vec<Weak<Namespace>>,
    pub watch: Option<WatchHandle>,
    pub watched: Watched,
}

impl<D> EntryState<D> {
    pub fn add_importer(&mut self, importer: &Weak<Namespace>) {
        self.importers.retain(|w| w.strong_count() > 0);
        if !self.importers.iter().any(|w| Weak::ptr_eq(w, importer)) {
            self.importers.push(Weak::clone(importer));
        }
    }
}

pub(crate) struct ImportEntry<D> {
    state: Mutex<EntryState<D>>,
}

impl<D: Clone> ImportEntry<D> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EntryState {
                value: None,
                importers: Vec::new(),
                watch: None,
                watched: Watched::default(),
            }),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, EntryState<D>> {
        self.state.lock()
    }

    /// Drop the loaded value when one of `paths` affects it; returns the dropped value.
    pub fn invalidate_if_affected<'p>(&self, mut paths: impl Iterator<Item = &'p Path>) -> Option<D> {
        let mut state = self.state.lock();
        state.value.as_ref()?;
        if paths.any(|p| state.watched.affected_by(p)) {
            state.value.take()
        } else {
            None
        }
    }

    pub fn invalidate(&self) -> Option<D> {
        self.state.lock().value.take()
    }

    /// No live namespace imports this entry. An entry that is loading right now counts as used.
    pub fn is_unused(&self) -> bool {
        match self.state.try_lock() {
            Some(state) => state.importers.iter().all(|w| w.strong_count() == 0),
            None => false,
        }
    }

    pub fn take_watch(&self) -> Option<WatchHandle> {
        self.state.lock().watch.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watched_origin_and_dirs() {
        let watched = Watched {
            origin: Some(PathBuf::from("/ws/lib/MyLib.py")),
            dirs: vec![PathBuf::from("/ws/pkg")],
        };
        assert!(watched.affected_by(Path::new("/ws/lib/./MyLib.py")));
        assert!(watched.affected_by(Path::new("/ws/pkg/sub/mod.py")));
        assert!(!watched.affected_by(Path::new("/ws/lib/Other.py")));
        assert_eq!(
            watched.watch_paths(),
            vec![PathBuf::from("/ws/lib"), PathBuf::from("/ws/pkg")]
        );
    }

    #[test]
    fn test_invalidate_returns_previous_value_once() {
        let entry: ImportEntry<u32> = ImportEntry::new();
        {
            let mut state = entry.lock();
            state.value = Some(7);
            state.watched.origin = Some(PathBuf::from("/ws/a.py"));
        }
        let changed = [PathBuf::from("/ws/a.py")];
        assert_eq!(entry.invalidate_if_affected(changed.iter().map(PathBuf::as_path)), Some(7));
        assert_eq!(entry.invalidate_if_affected(changed.iter().map(PathBuf::as_path)), None);
    }

    #[test]
    fn test_entry_without_importers_is_unused() {
        let entry: ImportEntry<u32> = ImportEntry::new();
        assert!(entry.is_unused());
        let _guard = entry.lock();
        assert!(!entry.is_unused());
    }
}
