//! # Data Cache
//!
//! Library and variable descriptors survive restarts in
//! `<cache root>/libdoc` and `<cache root>/variables`. Every entry is a
//! `.meta`/`.spec` pair; the spec is only trusted while its meta matches
//! the files on disk.

mod data_cache;
mod meta;

pub use data_cache::{CacheSection, DataCache, FileDataCache, is_missing};
pub use meta::{LibraryMetaData, META_VERSION, tool_version};
