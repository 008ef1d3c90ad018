//! Error types for the analysis core.
//!
//! Problems caused by user input (unresolvable imports, unknown keywords,
//! wrong arguments) never surface here: they become diagnostics. This
//! module covers what the caller has to deal with.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced to callers of the analysis core.
#[derive(Debug, Error)]
pub enum Error {
    /// The request was cancelled through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// A cache entry exists but could not be read back.
    #[error("corrupt cache entry {section}/{entry}: {reason}")]
    CorruptCacheEntry {
        section: &'static str,
        entry: String,
        reason: String,
    },

    /// IO error while reading documents or the cache.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The loader child process failed or spoke an unexpected protocol.
    #[error("loader error: {0}")]
    Loader(String),

    /// The loader child process did not answer in time and was killed.
    #[error("loading '{name}' timed out after {seconds} seconds")]
    LoaderTimeout { name: String, seconds: u64 },

    /// An internal invariant was broken; indicates a bug.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// `find_keyword` was asked to fail instead of reporting a diagnostic.
    #[error("{0}")]
    Keyword(String),

    /// An import could not be resolved.
    #[error(transparent)]
    Import(#[from] ImportError),
}

impl Error {
    pub fn loader(message: impl Into<String>) -> Self {
        Self::Loader(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Failures to resolve an import declared in a document.
///
/// The namespace turns these into diagnostics on the import statement.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("Variable '{0}' not found.")]
    UnresolvedVariable(String),

    #[error("Resource file '{0}' does not exist.")]
    ResourceNotFound(String),

    #[error("Variable file '{0}' does not exist.")]
    VariablesNotFound(String),

    #[error("Resource file '{path}' is invalid: {reason}")]
    InvalidResource { path: PathBuf, reason: String },

    #[error("Import name is empty.")]
    EmptyName,
}
