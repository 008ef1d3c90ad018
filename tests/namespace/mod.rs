//! Namespace layer tests
//!
//! End-to-end tests over a workspace on disk:
//! - Import resolution and import diagnostics
//! - Keyword resolution, run-keyword nesting, BDD prefixes
//! - Variable scopes and variable diagnostics
//! - Namespace caching and invalidation
//! - Diagnostic modifiers

pub mod tests_documents_cache;
pub mod tests_imports;
pub mod tests_keywords;
pub mod tests_modifiers;
pub mod tests_variables;
