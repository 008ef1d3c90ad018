//! Lexical path helpers.
//!
//! Paths are compared by their normalized form so that `a/./b.resource`
//! and `a/c/../b.resource` identify the same document without touching
//! the file system.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Remove `.` components and resolve `..` against preceding components.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` joined to `base` unless it is already absolute, normalized.
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}

/// Shared string form of a path, used as document source.
pub fn path_to_source(path: &Path) -> Arc<str> {
    Arc::from(path.to_string_lossy().as_ref())
}

/// Is `path` equal to `dir` or somewhere below it?
pub fn is_within(path: &Path, dir: &Path) -> bool {
    normalize_path(path).starts_with(normalize_path(dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize_path(Path::new("/../x")), PathBuf::from("/x"));
    }

    #[test]
    fn test_resolve_against_base() {
        let base = Path::new("/ws/suites");
        assert_eq!(
            resolve_against(base, Path::new("../res/common.resource")),
            PathBuf::from("/ws/res/common.resource")
        );
        assert_eq!(resolve_against(base, Path::new("/abs/x.py")), PathBuf::from("/abs/x.py"));
    }

    #[test]
    fn test_is_within() {
        assert!(is_within(Path::new("/ws/lib/pkg/mod.py"), Path::new("/ws/lib")));
        assert!(!is_within(Path::new("/ws/libx/mod.py"), Path::new("/ws/lib")));
    }
}
