//! # rfcore
//!
//! Semantic analysis core for Robot Framework language servers: import
//! resolution, per-document namespaces, keyword resolution and diagnostics.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! namespace → Namespaces, keyword finder, analyzer, diagnostics, documents cache
//!   ↓
//! imports   → ImportsManager: shared library/resource/variables descriptors
//!   ↓
//! loader    → LibraryLoader seam, child-process loader, import completions
//! cache     → On-disk descriptor cache keyed by origin and mtimes
//!   ↓
//! documents → Text documents and their lazily built models
//!   ↓
//! library   → LibraryDoc, KeywordDoc, argument specs
//!   ↓
//! model     → Tokens, statements, blocks; variable search and matchers
//!   ↓
//! base      → Positions, ranges, paths, domain constants
//! ```

// ============================================================================
// MODULES (dependency order: base → model → library → documents → cache/loader → imports → namespace)
// ============================================================================

/// Foundation types: Position, Range, Location, path helpers, constants
pub mod base;

/// Configuration handed over by the embedding application
pub mod config;

/// Crate error type
pub mod error;

/// Listener lists used for invalidation
pub mod events;

/// Document model: tokens, statements, blocks, variable helpers
pub mod model;

/// Library, resource and variable file descriptors
pub mod library;

/// Open and on-disk text documents
pub mod documents;

/// Persistent descriptor cache
pub mod cache;

/// Descriptor loading through a child process
pub mod loader;

/// Import resolution shared by all namespaces
pub mod imports;

/// Namespaces, keyword resolution, analysis and diagnostics
pub mod namespace;

// Re-export foundation types
pub use base::{Location, Position, Range};
pub use config::{AnalysisConfig, DiagnosticModifiersConfig, RobotVersion};
pub use error::{Error, ImportError, Result};

// Re-export the main entry points
pub use documents::{DocumentsManager, TextDocument};
pub use imports::{ImportsManager, ImportsManagerBuilder};
pub use namespace::{Diagnostic, DocumentsCache, Namespace, Severity};
