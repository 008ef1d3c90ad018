//! # Namespace
//!
//! The semantic layer: what a document imports, which keywords and
//! variables it can see, and what is wrong with it.
//!
//! ## Key Types
//!
//! - [`Namespace`] - resolved imports and visible symbols of one document
//! - [`KeywordFinder`] - resolves a call name to exactly one keyword
//! - [`NamespaceAnalyzer`] - walks the model and collects diagnostics and references
//! - [`DiagnosticsModifier`] - severity overrides from configuration and comments
//! - [`DocumentsCache`] - one namespace per document, invalidated along imports

mod analyzer;
pub mod diagnostics;
mod documents_cache;
mod entries;
mod finder;
mod modifier;
#[allow(clippy::module_inception)]
mod namespace;
mod variables;

pub use analyzer::{AnalyzerResult, BlockScope, KeywordReferences, NamespaceAnalyzer};
pub use diagnostics::{Diagnostic, DiagnosticCollector, DiagnosticTag, RelatedInfo, Severity, codes};
pub use documents_cache::DocumentsCache;
pub use entries::{Import, ImportSite, LibraryEntry, ResourceEntry, VariablesEntry};
pub use finder::{FinderDiagnostic, KeywordFinder, KeywordLookup, KeywordTables};
pub use modifier::{DiagnosticsModifier, ModifierAction};
pub use namespace::{Analysis, Namespace, NamespaceState};
pub use variables::{VariableDefinition, VariableKind, VariableScope, builtin_variables};
