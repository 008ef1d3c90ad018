//! Foundation types for the analysis core.
//!
//! This module provides fundamental types used throughout the crate:
//! - [`Position`], [`Range`], [`Location`] - Line/character positions
//! - Domain constants (default libraries, built-in variables, run-keyword tables)
//! - Lexical path normalization
//!
//! This module has NO dependencies on other rfcore modules.

pub mod constants;
mod paths;
mod position;

pub use paths::{is_within, normalize_path, path_to_source, resolve_against};
pub use position::{Location, Position, Range};
