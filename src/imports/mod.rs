//! # Imports
//!
//! [`ImportsManager`] resolves `Library`, `Resource` and `Variables`
//! imports to descriptors and shares them between all namespaces of a
//! workspace. It talks to the outside through three seams:
//!
//! - [`crate::loader::LibraryLoader`] produces library and variable descriptors
//! - [`FileWatcherManager`] reports file changes that make entries stale
//! - [`NamespaceFactory`] builds the namespace of an imported resource

mod entry;
mod manager;
mod resolve;
mod watcher;

use std::sync::Arc;

use crate::documents::TextDocument;
use crate::error::Result;
use crate::namespace::Namespace;

pub use manager::{CommandLineVariables, ImportsManager, ImportsManagerBuilder};
pub use resolve::{
    VariableValues, find_file, find_resource, find_variables, is_library_path, is_variables_path,
    replace_import_variables,
};
pub use watcher::{
    FileChange, FileChangeKind, FileWatcherManager, InMemoryFileWatcherManager,
    NoopFileWatcherManager, WatchCallback, WatchHandle,
};

/// Hands out the namespace of a document.
///
/// Implemented by [`crate::namespace::DocumentsCache`], which keeps one
/// namespace per document so that a resource imported from many files is
/// initialized once.
pub trait NamespaceFactory: Send + Sync {
    fn namespace_for(&self, document: &Arc<TextDocument>) -> Result<Arc<Namespace>>;
}
