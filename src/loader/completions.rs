//! Import name completion straight from the file system.
//!
//! Used when the loader child cannot answer: lists standard libraries,
//! Python modules and files with the extensions an import accepts.

use std::fs;
use std::path::{Path, PathBuf};

use super::protocol::{Completion, CompletionKind, ImportKind};
use crate::base::constants::{RESOURCE_EXTENSIONS, STDLIBS, VARIABLES_EXTENSIONS};

/// Candidates for a partially typed import name.
///
/// `search_paths` are tried in order after `base_dir`. The result is sorted
/// by label with duplicates removed.
pub fn complete_from_filesystem(
    kind: ImportKind,
    prefix: &str,
    base_dir: &Path,
    search_paths: &[PathBuf],
) -> Vec<Completion> {
    let mut items = Vec::new();
    let is_path = prefix.contains('/') || prefix.contains('\\') || prefix.starts_with('.');

    match kind {
        ImportKind::Library if !is_path => {
            if !prefix.contains('.') {
                items.extend(
                    STDLIBS
                        .iter()
                        .filter(|name| !matches!(**name, "Reserved" | "Easter"))
                        .map(|name| {
                            Completion::new(*name, CompletionKind::Module)
                                .with_detail("Standard library")
                        }),
                );
            }
            for root in std::iter::once(base_dir).chain(search_paths.iter().map(PathBuf::as_path)) {
                items.extend(module_completions(root, prefix));
            }
        }
        ImportKind::Library => items.extend(path_completions(base_dir, prefix, &["py"])),
        ImportKind::Resource => items.extend(path_completions(base_dir, prefix, RESOURCE_EXTENSIONS)),
        ImportKind::Variables => {
            items.extend(path_completions(base_dir, prefix, VARIABLES_EXTENSIONS))
        }
    }

    if !is_path && kind != ImportKind::Library {
        for root in search_paths {
            items.extend(path_completions(root, prefix, extensions_of(kind)));
        }
    }

    items.sort_by(|a, b| a.label.cmp(&b.label).then(a.kind.cmp(&b.kind)));
    items.dedup_by(|a, b| a.label == b.label);
    items
}

fn extensions_of(kind: ImportKind) -> &'static [&'static str] {
    match kind {
        ImportKind::Library => &["py"],
        ImportKind::Resource => RESOURCE_EXTENSIONS,
        ImportKind::Variables => VARIABLES_EXTENSIONS,
    }
}

/// Modules below `root` for a dotted prefix such as `mypkg.sub`.
fn module_completions(root: &Path, prefix: &str) -> Vec<Completion> {
    let mut parts: Vec<&str> = prefix.split('.').collect();
    parts.pop();
    let dir = parts.iter().fold(root.to_path_buf(), |dir, part| dir.join(part));
    let label_prefix: String = parts.iter().map(|p| format!("{p}.")).collect();

    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|entry| {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name.starts_with("__") {
                return None;
            }
            if path.is_dir() {
                path.join("__init__.py")
                    .is_file()
                    .then(|| Completion::new(format!("{label_prefix}{name}"), CompletionKind::Module))
            } else if path.extension().is_some_and(|ext| ext == "py") {
                let stem = path.file_stem()?.to_string_lossy().into_owned();
                Some(Completion::new(format!("{label_prefix}{stem}"), CompletionKind::Module))
            } else {
                None
            }
        })
        .collect()
}

/// Folders and matching files for a path-like prefix, relative to `root`.
fn path_completions(root: &Path, prefix: &str, extensions: &[&str]) -> Vec<Completion> {
    let normalized = prefix.replace('\\', "/");
    let (dir_part, _) = normalized.rsplit_once('/').unwrap_or(("", normalized.as_str()));
    let label_prefix = if dir_part.is_empty() && !normalized.starts_with('/') {
        String::new()
    } else {
        format!("{dir_part}/")
    };
    let dir = if normalized.starts_with('/') {
        PathBuf::from(format!("{dir_part}/"))
    } else {
        root.join(dir_part)
    };

    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|entry| {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name == "__pycache__" {
                return None;
            }
            if path.is_dir() {
                Some(Completion::new(format!("{label_prefix}{name}/"), CompletionKind::Folder))
            } else {
                let ext = path.extension()?.to_string_lossy().to_lowercase();
                extensions
                    .contains(&ext.as_str())
                    .then(|| Completion::new(format!("{label_prefix}{name}"), CompletionKind::File))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("resources")).unwrap();
        fs::create_dir_all(root.join("mypkg")).unwrap();
        fs::write(root.join("mypkg").join("__init__.py"), "").unwrap();
        fs::write(root.join("mypkg").join("helpers.py"), "").unwrap();
        fs::write(root.join("MyLib.py"), "").unwrap();
        fs::write(root.join("common.resource"), "").unwrap();
        fs::write(root.join("notes.md"), "").unwrap();
        fs::write(root.join("vars.yaml"), "").unwrap();
        dir
    }

    fn labels(items: &[Completion]) -> Vec<&str> {
        items.iter().map(|c| c.label.as_str()).collect()
    }

    #[test]
    fn test_library_completion_lists_stdlibs_and_modules() {
        let dir = workspace();
        let items = complete_from_filesystem(ImportKind::Library, "", dir.path(), &[]);
        let labels = labels(&items);
        assert!(labels.contains(&"Collections"));
        assert!(labels.contains(&"MyLib"));
        assert!(labels.contains(&"mypkg"));
        assert!(!labels.contains(&"Reserved"));
        assert!(!labels.contains(&"Easter"));
    }

    #[test]
    fn test_dotted_prefix_lists_package_content() {
        let dir = workspace();
        let items = complete_from_filesystem(ImportKind::Library, "mypkg.", dir.path(), &[]);
        assert_eq!(labels(&items), vec!["mypkg.helpers"]);
    }

    #[test]
    fn test_resource_completion_filters_extensions() {
        let dir = workspace();
        let items = complete_from_filesystem(ImportKind::Resource, "", dir.path(), &[]);
        let labels = labels(&items);
        assert!(labels.contains(&"common.resource"));
        assert!(labels.contains(&"resources/"));
        assert!(!labels.contains(&"notes.md"));
        assert!(!labels.contains(&"MyLib.py"));
    }

    #[test]
    fn test_variables_completion_in_subfolder() {
        let dir = workspace();
        fs::write(dir.path().join("resources").join("env.py"), "").unwrap();
        let items = complete_from_filesystem(ImportKind::Variables, "resources/", dir.path(), &[]);
        assert_eq!(labels(&items), vec!["resources/env.py"]);
        assert_eq!(items[0].kind, CompletionKind::File);
    }
}
