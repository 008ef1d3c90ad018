//! A workspace on disk wired to an imports manager and a documents cache.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use rfcore::imports::InMemoryFileWatcherManager;
use rfcore::{AnalysisConfig, Diagnostic, DocumentsCache, DocumentsManager, ImportsManager, Namespace};

use super::static_loader::StaticLoader;

pub struct TestWorkspace {
    dir: TempDir,
    pub loader: Arc<StaticLoader>,
    pub watcher: Arc<InMemoryFileWatcherManager>,
    pub manager: Arc<ImportsManager>,
    pub cache: Arc<DocumentsCache>,
    pub cancel: CancellationToken,
}

impl TestWorkspace {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self::with_config(AnalysisConfig::default(), StaticLoader::standard(), files)
    }

    pub fn with_config(config: AnalysisConfig, loader: StaticLoader, files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        for (name, text) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("create parent dir");
            }
            fs::write(&path, text).expect("write fixture file");
        }

        let loader = Arc::new(loader);
        let watcher = Arc::new(InMemoryFileWatcherManager::new());
        let documents = Arc::new(DocumentsManager::new());
        let manager = ImportsManager::builder(config, dir.path(), documents)
            .with_loader(Arc::clone(&loader) as Arc<dyn rfcore::loader::LibraryLoader>)
            .with_file_watcher(Arc::clone(&watcher) as Arc<dyn rfcore::imports::FileWatcherManager>)
            .without_data_cache()
            .build();
        let cache = DocumentsCache::new(Arc::clone(&manager));

        Self {
            dir,
            loader,
            watcher,
            manager,
            cache,
            cancel: CancellationToken::new(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn namespace(&self, name: &str) -> Arc<Namespace> {
        self.cache
            .get_namespace_for_path(&self.path(name))
            .expect("namespace for fixture file")
    }

    pub fn diagnostics(&self, name: &str) -> Vec<Diagnostic> {
        self.namespace(name)
            .get_diagnostics(&self.cancel)
            .expect("diagnostics of fixture file")
    }

    /// Replace the text of `name` as an editor would.
    pub fn edit(&self, name: &str, text: &str) {
        let path = self.path(name);
        let documents = self.manager.documents();
        if documents.change(&path, text, Some(1)).is_none() {
            documents.open(&path, text, Some(1));
        }
    }
}
