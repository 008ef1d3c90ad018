//! # Documents Cache
//!
//! One [`Namespace`] per document, reused until the document's model
//! changes. The cache is the [`NamespaceFactory`] of its imports manager,
//! so a resource imported by many suites shares a single namespace.
//!
//! Invalidation follows dependencies:
//!
//! - a changed document drops its own namespace and invalidates every
//!   namespace that imports it (directly or through other resources)
//! - `libraries_changed`, `resources_changed` and `variables_changed`
//!   invalidate namespaces holding one of the dropped descriptors
//! - `imports_changed` invalidates everything

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::base::normalize_path;
use crate::documents::TextDocument;
use crate::error::Result;
use crate::events::{EventEmitter, ListenerId};
use crate::imports::{ImportsManager, NamespaceFactory};

use super::diagnostics::Diagnostic;
use super::namespace::Namespace;

/// Extensions of documents [`DocumentsCache::diagnose_all`] looks at.
const ANALYZED_EXTENSIONS: &[&str] = &["robot", "resource"];

struct Listeners {
    document_changed: ListenerId,
    libraries_changed: ListenerId,
    resources_changed: ListenerId,
    variables_changed: ListenerId,
    imports_changed: ListenerId,
}

pub struct DocumentsCache {
    me: Weak<DocumentsCache>,
    imports_manager: Arc<ImportsManager>,
    namespaces: RwLock<IndexMap<PathBuf, Arc<Namespace>>>,
    listeners: Mutex<Option<Listeners>>,
    pub namespace_initialized: EventEmitter<Arc<Namespace>>,
    pub namespace_invalidated: EventEmitter<Arc<Namespace>>,
}

impl std::fmt::Debug for DocumentsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentsCache")
            .field("namespaces", &self.namespaces.read().len())
            .finish()
    }
}

impl DocumentsCache {
    /// Create the cache and register it as the namespace factory of `imports_manager`.
    pub fn new(imports_manager: Arc<ImportsManager>) -> Arc<Self> {
        let cache = Arc::new_cyclic(|me: &Weak<DocumentsCache>| DocumentsCache {
            me: Weak::clone(me),
            imports_manager,
            namespaces: RwLock::new(IndexMap::new()),
            listeners: Mutex::new(None),
            namespace_initialized: EventEmitter::new(),
            namespace_invalidated: EventEmitter::new(),
        });

        let factory: Weak<dyn NamespaceFactory> = Arc::downgrade(&cache) as Weak<dyn NamespaceFactory>;
        cache.imports_manager.set_namespace_factory(factory);

        let manager = &cache.imports_manager;
        let weak = Weak::clone(&cache.me);
        let document_changed = manager.documents().document_changed.subscribe(move |document| {
            if let Some(cache) = weak.upgrade() {
                cache.document_changed(document);
            }
        });
        let weak = Weak::clone(&cache.me);
        let libraries_changed = manager.libraries_changed.subscribe(move |docs| {
            if let Some(cache) = weak.upgrade() {
                cache.invalidate_where(|ns| ns.uses_library_doc(docs));
            }
        });
        let weak = Weak::clone(&cache.me);
        let resources_changed = manager.resources_changed.subscribe(move |docs| {
            if let Some(cache) = weak.upgrade() {
                cache.invalidate_where(|ns| ns.uses_library_doc(docs));
            }
        });
        let weak = Weak::clone(&cache.me);
        let variables_changed = manager.variables_changed.subscribe(move |docs| {
            if let Some(cache) = weak.upgrade() {
                cache.invalidate_where(|ns| ns.uses_variables_doc(docs));
            }
        });
        let weak = Weak::clone(&cache.me);
        let imports_changed = manager.imports_changed.subscribe(move |_| {
            if let Some(cache) = weak.upgrade() {
                cache.invalidate_where(|_| true);
            }
        });

        *cache.listeners.lock() = Some(Listeners {
            document_changed,
            libraries_changed,
            resources_changed,
            variables_changed,
            imports_changed,
        });
        cache
    }

    pub fn imports_manager(&self) -> &Arc<ImportsManager> {
        &self.imports_manager
    }

    /// The namespace of `document`'s current model.
    pub fn get_namespace(&self, document: &Arc<TextDocument>) -> Result<Arc<Namespace>> {
        let key = normalize_path(document.path());
        let model = document.model();
        if let Some(namespace) = self.namespaces.read().get(&key) {
            if Arc::ptr_eq(namespace.model(), &model) {
                return Ok(Arc::clone(namespace));
            }
        }

        let namespace = Namespace::new(Arc::clone(&self.imports_manager), document);
        self.forward_events(&namespace);

        let replaced = {
            let mut namespaces = self.namespaces.write();
            if let Some(existing) = namespaces.get(&key) {
                if Arc::ptr_eq(existing.model(), namespace.model()) {
                    return Ok(Arc::clone(existing));
                }
            }
            namespaces.insert(key, Arc::clone(&namespace))
        };
        if let Some(old) = replaced {
            old.invalidate();
        }
        debug!("namespace created for '{}'", document.source());
        Ok(namespace)
    }

    /// The namespace of the document at `path`, loading it from disk if needed.
    pub fn get_namespace_for_path(&self, path: &Path) -> Result<Arc<Namespace>> {
        let document = self.imports_manager.documents().get_or_open_from_disk(path)?;
        self.get_namespace(&document)
    }

    /// Cached namespaces, in creation order.
    pub fn namespaces(&self) -> Vec<Arc<Namespace>> {
        self.namespaces.read().values().cloned().collect()
    }

    /// Diagnostics of every known `.robot` and `.resource` document, in parallel.
    pub fn diagnose_all(&self, cancel: &CancellationToken) -> Result<Vec<(PathBuf, Vec<Diagnostic>)>> {
        let documents: Vec<Arc<TextDocument>> = self
            .imports_manager
            .documents()
            .documents()
            .into_iter()
            .filter(|d| {
                d.path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| ANALYZED_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
            })
            .collect();
        debug!("diagnosing {} documents", documents.len());

        documents
            .par_iter()
            .map(|document| -> Result<(PathBuf, Vec<Diagnostic>)> {
                let namespace = self.get_namespace(document)?;
                Ok((document.path().to_path_buf(), namespace.get_diagnostics(cancel)?))
            })
            .collect()
    }

    fn forward_events(&self, namespace: &Arc<Namespace>) {
        let weak = Weak::clone(&self.me);
        namespace.has_initialized.subscribe(move |ns| {
            if let Some(cache) = weak.upgrade() {
                cache.namespace_initialized.emit(ns);
            }
        });
        let weak = Weak::clone(&self.me);
        namespace.has_invalidated.subscribe(move |ns| {
            if let Some(cache) = weak.upgrade() {
                cache.namespace_invalidated.emit(ns);
            }
        });
    }

    fn document_changed(&self, document: &Arc<TextDocument>) {
        let path = normalize_path(document.path());
        let own = self.namespaces.write().shift_remove(&path);
        if let Some(namespace) = own {
            trace!("dropping namespace of changed document '{}'", document.source());
            namespace.invalidate();
        }
        self.invalidate_where(|ns| ns.imports_resource(&path));
    }

    fn invalidate_where(&self, predicate: impl Fn(&Namespace) -> bool) {
        let affected: Vec<Arc<Namespace>> = self
            .namespaces
            .read()
            .values()
            .filter(|ns| predicate(ns))
            .cloned()
            .collect();
        for namespace in affected {
            namespace.invalidate();
        }
    }
}

impl NamespaceFactory for DocumentsCache {
    fn namespace_for(&self, document: &Arc<TextDocument>) -> Result<Arc<Namespace>> {
        self.get_namespace(document)
    }
}

impl Drop for DocumentsCache {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.lock().take() {
            let manager = &self.imports_manager;
            manager.documents().document_changed.unsubscribe(listeners.document_changed);
            manager.libraries_changed.unsubscribe(listeners.libraries_changed);
            manager.resources_changed.unsubscribe(listeners.resources_changed);
            manager.variables_changed.unsubscribe(listeners.variables_changed);
            manager.imports_changed.unsubscribe(listeners.imports_changed);
        }
    }
}
