//! # Loader
//!
//! Libraries and variable files are Python code; they are introspected by a
//! child process speaking a one-line JSON protocol. [`LibraryLoader`] is the
//! seam the imports manager talks to, so tests and embedders can provide
//! descriptors without a Python runtime.

mod completions;
mod process;
mod protocol;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::library::{LibraryDoc, VariablesDoc};

pub use completions::complete_from_filesystem;
pub use process::ProcessLoader;
pub use protocol::{
    Completion, CompletionKind, CompletionRequest, ImportKind, ImportRequest, LoadRequest,
    LoadResponse,
};

/// Produces descriptors for imports that need code execution.
///
/// Load failures are reported inside the returned descriptor; only
/// cancellation and internal errors use the `Err` path.
pub trait LibraryLoader: Send + Sync {
    fn load_library(&self, request: &ImportRequest, cancel: &CancellationToken) -> Result<LibraryDoc>;

    fn load_variables(&self, request: &ImportRequest, cancel: &CancellationToken)
    -> Result<VariablesDoc>;

    fn complete_import(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Completion>>;
}
