//! Text documents known to the analysis core.
//!
//! A document is either opened by the editor (its text comes from the
//! client) or read from disk on demand, e.g. when another file imports it
//! as a resource. Every text change is published through
//! [`DocumentsManager::document_changed`]; namespaces depending on the
//! document invalidate themselves from there.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::base::{normalize_path, path_to_source};
use crate::error::Result;
use crate::events::EventEmitter;
use crate::model::{File, parse};

#[derive(Debug)]
struct DocumentState {
    text: Arc<str>,
    version: Option<i32>,
    opened_in_editor: bool,
    model: Option<Arc<File>>,
}

/// One document with its current text and lazily built model.
#[derive(Debug)]
pub struct TextDocument {
    path: PathBuf,
    source: Arc<str>,
    state: RwLock<DocumentState>,
    /// Serializes model builds so concurrent readers parse only once.
    model_lock: Mutex<()>,
}

impl TextDocument {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<Arc<str>>, version: Option<i32>) -> Self {
        let path = normalize_path(&path.into());
        Self {
            source: path_to_source(&path),
            path,
            state: RwLock::new(DocumentState {
                text: text.into(),
                version,
                opened_in_editor: false,
                model: None,
            }),
            model_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &Arc<str> {
        &self.source
    }

    pub fn text(&self) -> Arc<str> {
        Arc::clone(&self.state.read().text)
    }

    pub fn version(&self) -> Option<i32> {
        self.state.read().version
    }

    pub fn is_opened_in_editor(&self) -> bool {
        self.state.read().opened_in_editor
    }

    /// Model of the current text, built on first use.
    pub fn model(&self) -> Arc<File> {
        if let Some(model) = &self.state.read().model {
            return Arc::clone(model);
        }
        let _guard = self.model_lock.lock();
        let text = {
            let state = self.state.read();
            if let Some(model) = &state.model {
                return Arc::clone(model);
            }
            Arc::clone(&state.text)
        };
        let model = Arc::new(parse(&self.source, &text));
        let mut state = self.state.write();
        // text may have changed while parsing; only keep a model of the current text
        if Arc::ptr_eq(&state.text, &text) {
            state.model = Some(Arc::clone(&model));
        }
        model
    }

    fn set_text(&self, text: Arc<str>, version: Option<i32>) {
        let mut state = self.state.write();
        state.text = text;
        state.version = version;
        state.model = None;
    }

    fn set_opened(&self, opened: bool) {
        self.state.write().opened_in_editor = opened;
    }
}

/// All documents the core knows, keyed by normalized path.
#[derive(Debug, Default)]
pub struct DocumentsManager {
    documents: RwLock<IndexMap<PathBuf, Arc<TextDocument>>>,
    /// Fired after the text of a document changed.
    pub document_changed: EventEmitter<Arc<TextDocument>>,
}

impl DocumentsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<Arc<TextDocument>> {
        self.documents.read().get(&normalize_path(path)).cloned()
    }

    pub fn documents(&self) -> Vec<Arc<TextDocument>> {
        self.documents.read().values().cloned().collect()
    }

    /// The editor opened `path` with `text`.
    pub fn open(&self, path: &Path, text: impl Into<Arc<str>>, version: Option<i32>) -> Arc<TextDocument> {
        let text = text.into();
        let key = normalize_path(path);
        let existing = self.documents.read().get(&key).cloned();
        let document = match existing {
            Some(document) => {
                let changed = document.text() != text;
                document.set_text(text, version);
                document.set_opened(true);
                if changed {
                    self.document_changed.emit(&document);
                }
                document
            }
            None => {
                let document = Arc::new(TextDocument::new(key.clone(), text, version));
                document.set_opened(true);
                self.documents.write().insert(key, Arc::clone(&document));
                document
            }
        };
        debug!("document opened: {}", document.source());
        document
    }

    /// The editor sent new text for an open document.
    pub fn change(&self, path: &Path, text: impl Into<Arc<str>>, version: Option<i32>) -> Option<Arc<TextDocument>> {
        let document = self.get(path)?;
        document.set_text(text.into(), version);
        self.document_changed.emit(&document);
        Some(document)
    }

    /// The editor closed the document; its text falls back to the disk content.
    pub fn close(&self, path: &Path) {
        let Some(document) = self.get(path) else {
            return;
        };
        document.set_opened(false);
        match fs::read_to_string(document.path()) {
            Ok(text) => {
                if *document.text() != *text {
                    document.set_text(Arc::from(text), None);
                    self.document_changed.emit(&document);
                }
            }
            Err(_) => {
                self.documents.write().shift_remove(document.path());
                self.document_changed.emit(&document);
            }
        }
    }

    /// The document, read from disk when nobody opened it yet.
    pub fn get_or_open_from_disk(&self, path: &Path) -> Result<Arc<TextDocument>> {
        let key = normalize_path(path);
        if let Some(document) = self.documents.read().get(&key) {
            return Ok(Arc::clone(document));
        }
        let text = fs::read_to_string(&key)?;
        let mut documents = self.documents.write();
        let document = documents
            .entry(key.clone())
            .or_insert_with(|| Arc::new(TextDocument::new(key, text, None)));
        Ok(Arc::clone(document))
    }

    /// A watched file changed on disk. Editor-owned documents keep their text.
    pub fn file_changed_on_disk(&self, path: &Path) {
        let Some(document) = self.get(path) else {
            return;
        };
        if document.is_opened_in_editor() {
            return;
        }
        match fs::read_to_string(document.path()) {
            Ok(text) if *document.text() == *text => return,
            Ok(text) => document.set_text(Arc::from(text), None),
            Err(_) => {
                if self.documents.write().shift_remove(document.path()).is_none() {
                    return;
                }
            }
        }
        self.document_changed.emit(&document);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_model_is_cached_until_text_changes() {
        let manager = DocumentsManager::new();
        let doc = manager.open(Path::new("/ws/a.robot"), "*** Test Cases ***\nT\n    Log    x\n", Some(1));
        let first = doc.model();
        assert!(Arc::ptr_eq(&first, &doc.model()));

        manager.change(Path::new("/ws/a.robot"), "*** Keywords ***\nK\n    No Operation\n", Some(2));
        let second = doc.model();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.keywords().count(), 1);
        assert_eq!(doc.version(), Some(2));
    }

    #[test]
    fn test_change_emits_event() {
        let manager = DocumentsManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        manager.document_changed.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        manager.open(Path::new("/ws/a.robot"), "", None);
        manager.change(Path::new("/ws/./a.robot"), "x", None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_get_or_open_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("common.resource");
        fs::write(&path, "*** Keywords ***\nHello\n    No Operation\n").unwrap();

        let manager = DocumentsManager::new();
        let doc = manager.get_or_open_from_disk(&path).unwrap();
        assert!(!doc.is_opened_in_editor());
        assert_eq!(doc.model().keywords().count(), 1);
        assert!(Arc::ptr_eq(&doc, &manager.get_or_open_from_disk(&path).unwrap()));

        assert!(manager.get_or_open_from_disk(&dir.path().join("missing.resource")).is_err());
    }

    #[test]
    fn test_close_falls_back_to_disk_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.resource");
        fs::write(&path, "disk").unwrap();

        let manager = DocumentsManager::new();
        let doc = manager.open(&path, "editor", Some(3));
        manager.close(&path);
        assert_eq!(&*doc.text(), "disk");
        assert!(!doc.is_opened_in_editor());
    }
}
