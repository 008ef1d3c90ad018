//! Records exchanged with the introspection child process.
//!
//! One request is written to the child's stdin as a single JSON line; the
//! last non-empty stdout line is the response.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::library::{LibraryDoc, VariablesDoc};

/// Which import statement a request is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    Library,
    Resource,
    Variables,
}

/// Load a library or variable file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    /// Import name; may still contain variables the child must replace.
    pub name: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Directory of the importing file.
    pub base_dir: PathBuf,
    pub command_line_variables: IndexMap<String, String>,
    /// Variables visible at the import, by full name.
    pub variables: IndexMap<String, String>,
}

impl ImportRequest {
    pub fn new(name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            name: name.into(),
            working_dir: base_dir.clone(),
            base_dir,
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// Complete a partially typed import name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub import_kind: ImportKind,
    pub prefix: String,
    pub base_dir: PathBuf,
    pub variables: IndexMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadRequest {
    Library(ImportRequest),
    Variables(ImportRequest),
    Complete(CompletionRequest),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionKind {
    Module,
    Folder,
    File,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Completion {
    pub label: String,
    pub kind: CompletionKind,
    #[serde(default)]
    pub detail: Option<String>,
}

impl Completion {
    pub fn new(label: impl Into<String>, kind: CompletionKind) -> Self {
        Self {
            label: label.into(),
            kind,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadResponse {
    Library(LibraryDoc),
    Variables(VariablesDoc),
    Completions { items: Vec<Completion> },
    Error {
        message: String,
        #[serde(default)]
        type_name: Option<String>,
    },
}
