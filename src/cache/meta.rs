//! Validity metadata of cache entries.
//!
//! A `.meta` file records where a library or variable file came from and
//! the modification times of everything it was loaded from. An entry is
//! reused only while a freshly computed meta is equal to the stored one.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use indexmap::IndexMap;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// Bump when the stored descriptor layout changes.
pub const META_VERSION: &str = "1";

/// Version of the tool that wrote an entry.
pub fn tool_version() -> String {
    format!("rfcore-{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryMetaData {
    pub meta_version: String,
    pub tool_version: String,
    /// Module name or import path as written (after variable replacement).
    pub name: String,
    /// Class inside the module, for `module.Class` imports.
    pub member_name: Option<String>,
    /// File the library was loaded from.
    pub origin: Option<String>,
    /// Package directories whose content is part of the library.
    pub submodule_search_locations: Vec<String>,
    /// Imported by file path rather than by module name.
    pub by_path: bool,
    /// Modification times in nanoseconds, by path.
    pub mtimes: IndexMap<String, u64>,
    pub has_errors: bool,
}

impl LibraryMetaData {
    pub fn new(
        name: impl Into<String>,
        member_name: Option<String>,
        origin: Option<&Path>,
        submodule_search_locations: &[PathBuf],
        by_path: bool,
    ) -> Self {
        let mut meta = Self {
            meta_version: META_VERSION.to_string(),
            tool_version: tool_version(),
            name: name.into(),
            member_name,
            origin: origin.map(|p| p.to_string_lossy().into_owned()),
            submodule_search_locations: submodule_search_locations
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            by_path,
            mtimes: IndexMap::new(),
            has_errors: false,
        };
        meta.mtimes = meta.collect_mtimes();
        meta
    }

    pub fn with_errors(mut self, has_errors: bool) -> Self {
        self.has_errors = has_errors;
        self
    }

    fn collect_mtimes(&self) -> IndexMap<String, u64> {
        let mut mtimes = IndexMap::new();
        if let Some(origin) = &self.origin {
            if let Some(mtime) = mtime_of(Path::new(origin)) {
                mtimes.insert(origin.clone(), mtime);
            }
        }
        for location in &self.submodule_search_locations {
            let mut files: Vec<(String, u64)> = WalkDir::new(location)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| {
                    let mtime = mtime_of(e.path())?;
                    Some((e.path().to_string_lossy().into_owned(), mtime))
                })
                .collect();
            files.sort();
            mtimes.extend(files);
        }
        mtimes
    }

    /// The same meta, recomputed from the current state of the disk.
    pub fn refreshed(&self) -> Self {
        let mut meta = self.clone();
        meta.meta_version = META_VERSION.to_string();
        meta.tool_version = tool_version();
        meta.has_errors = false;
        meta.mtimes = meta.collect_mtimes();
        meta
    }

    /// Stored metadata still describes the files on disk.
    pub fn is_valid(&self) -> bool {
        !self.has_errors && self.origin.is_some() && *self == self.refreshed()
    }

    /// Base name of the `.meta`/`.spec` pair.
    ///
    /// Path imports use a hash of their directory plus the file stem so
    /// equally named files in different directories do not collide.
    pub fn filepath_base(&self) -> String {
        if self.by_path {
            if let Some(origin) = &self.origin {
                let path = Path::new(origin);
                let mut hasher = FxHasher::default();
                path.parent()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default()
                    .hash(&mut hasher);
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                return format!("{:016x}_{stem}", hasher.finish());
            }
        }
        match &self.member_name {
            Some(member) => format!("{}.{member}", self.name),
            None => self.name.clone(),
        }
    }
}

fn mtime_of(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    u64::try_from(modified.duration_since(UNIX_EPOCH).ok()?.as_nanos()).ok()
}
