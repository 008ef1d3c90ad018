//! # Library Descriptors
//!
//! [`LibraryDoc`] and friends describe what an import provides: keywords
//! with their argument specifications, variables, and load errors.
//! Descriptors of external libraries come from the loader; resource and
//! suite files are described straight from their model.

mod arguments;
mod doc;
mod run_keywords;
mod user_keywords;

pub use arguments::{ArgumentInfo, ArgumentKind, ArgumentSpec, ResolvedArguments};
pub use doc::{
    ImportedVariable, KeywordDoc, KeywordKey, LibraryDoc, LibraryError, LibraryKind, VariablesDoc,
    is_deprecated_doc,
};
pub use run_keywords::RunKeywordKind;
pub use user_keywords::{library_doc_from_model, parse_user_arguments};
