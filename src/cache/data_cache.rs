//! Sectioned on-disk key/value store for descriptors.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Top-level directories of the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheSection {
    Library,
    Variables,
}

impl CacheSection {
    pub fn dir_name(self) -> &'static str {
        match self {
            CacheSection::Library => "libdoc",
            CacheSection::Variables => "variables",
        }
    }
}

/// Raw storage of cache entries. Typed access lives on `dyn DataCache`.
pub trait DataCache: Send + Sync {
    fn exists(&self, section: CacheSection, entry: &str) -> bool;

    fn read_bytes(&self, section: CacheSection, entry: &str) -> Result<Vec<u8>>;

    /// Store `data` atomically: readers see the old or the new content, never a mix.
    fn write_bytes(&self, section: CacheSection, entry: &str, data: &[u8]) -> Result<()>;
}

impl dyn DataCache {
    /// Read and deserialize an entry.
    pub fn read<T: DeserializeOwned>(&self, section: CacheSection, entry: &str) -> Result<T> {
        let data = self.read_bytes(section, entry)?;
        serde_json::from_slice(&data).map_err(|e| Error::CorruptCacheEntry {
            section: section.dir_name(),
            entry: entry.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn write<T: Serialize>(&self, section: CacheSection, entry: &str, value: &T) -> Result<()> {
        let data = serde_json::to_vec(value)?;
        self.write_bytes(section, entry, &data)
    }
}

/// A [`DataCache`] below a root directory: `<root>/<section>/<entry>`.
#[derive(Clone, Debug)]
pub struct FileDataCache {
    root: PathBuf,
}

impl FileDataCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, section: CacheSection, entry: &str) -> PathBuf {
        self.root.join(section.dir_name()).join(entry)
    }
}

impl DataCache for FileDataCache {
    fn exists(&self, section: CacheSection, entry: &str) -> bool {
        self.entry_path(section, entry).is_file()
    }

    fn read_bytes(&self, section: CacheSection, entry: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.entry_path(section, entry))?)
    }

    fn write_bytes(&self, section: CacheSection, entry: &str, data: &[u8]) -> Result<()> {
        let path = self.entry_path(section, entry);
        let Some(parent) = path.parent() else {
            return Err(Error::invalid_state(format!(
                "cache entry without parent: {}",
                path.display()
            )));
        };
        fs::create_dir_all(parent)?;

        let temp = parent.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&temp, data)?;
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        tracing::trace!("cache write {}", path.display());
        Ok(())
    }
}

/// Is `error` a plain "entry not there"?
pub fn is_missing(error: &Error) -> bool {
    matches!(error, Error::Io(e) if e.kind() == ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{KeywordDoc, LibraryDoc, LibraryKind};

    fn cache(dir: &tempfile::TempDir) -> Box<dyn DataCache> {
        Box::new(FileDataCache::new(dir.path()))
    }

    #[test]
    fn test_write_then_read_library_doc() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        let doc = LibraryDoc::new("Collections", LibraryKind::Library)
            .with_keywords([KeywordDoc::new("Append To List", "")]);

        cache.write(CacheSection::Library, "Collections.spec", &doc).unwrap();
        assert!(cache.exists(CacheSection::Library, "Collections.spec"));
        assert!(dir.path().join("libdoc").join("Collections.spec").is_file());

        let back: LibraryDoc = cache.read(CacheSection::Library, "Collections.spec").unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_corrupt_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        cache.write_bytes(CacheSection::Variables, "v.spec", b"{not json").unwrap();

        let err = cache.read::<LibraryDoc>(CacheSection::Variables, "v.spec").unwrap_err();
        assert!(matches!(err, Error::CorruptCacheEntry { section: "variables", .. }));
    }

    #[test]
    fn test_missing_entry_is_io_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        assert!(!cache.exists(CacheSection::Library, "nope.meta"));
        let err = cache.read::<LibraryDoc>(CacheSection::Library, "nope.meta").unwrap_err();
        assert!(is_missing(&err));
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        cache.write(CacheSection::Library, "a.meta", &1u32).unwrap();
        cache.write(CacheSection::Library, "a.meta", &2u32).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path().join("libdoc"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.meta")]);
        assert_eq!(cache.read::<u32>(CacheSection::Library, "a.meta").unwrap(), 2);
    }
}
