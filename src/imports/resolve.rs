//! Resolution of import names.
//!
//! Import names may contain variables (`${CURDIR}/common.resource`,
//! `%{LIBS}/MyLib.py`); they are replaced before the file is looked up
//! relative to the importing file and then along the search path.

use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::base::constants::{RESOURCE_EXTENSIONS, VARIABLES_EXTENSIONS};
use crate::base::{normalize_path, resolve_against};
use crate::error::ImportError;
use crate::model::normalize;
use crate::model::variables::{
    ALL_IDENTIFIERS, is_number_literal, is_variable, replace_variables, search_variable,
};

/// Values stored variables are nested at most this deep.
const MAX_NESTING: usize = 10;

/// Variable values visible while resolving an import name.
#[derive(Clone, Debug, Default)]
pub struct VariableValues {
    /// Normalized name to (full name, value).
    values: IndexMap<SmolStr, (String, String)>,
}

impl VariableValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values keyed by full variable name (`${HOST}`) or bare name (`HOST`).
    pub fn from_map(map: &IndexMap<String, String>) -> Self {
        let mut values = Self::new();
        for (name, value) in map {
            values.insert(name, value.clone());
        }
        values
    }

    pub fn insert(&mut self, name: &str, value: String) {
        let full_name = if is_variable(name) {
            name.to_string()
        } else {
            format!("${{{name}}}")
        };
        self.values.insert(lookup_key(name), (full_name, value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&lookup_key(name)).map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Later values win.
    pub fn extend(&mut self, other: &VariableValues) {
        self.values
            .extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Full name to value, as sent to the loader.
    pub fn to_map(&self) -> IndexMap<String, String> {
        self.values.values().cloned().collect()
    }
}

fn lookup_key(name: &str) -> SmolStr {
    match search_variable(name, ALL_IDENTIFIERS, true) {
        Ok(m) if m.is_variable() => m.matcher(),
        _ => normalize(name),
    }
}

/// Replace the variables of an import name.
///
/// Built-in path variables (`${CURDIR}`, `${EXECDIR}`, `${TEMPDIR}`, `${/}`,
/// `${:}`), `${SPACE}`, `${EMPTY}`, number literals and `%{ENV=default}`
/// are known without a table; anything else must be in `values`.
pub fn replace_import_variables(
    name: &str,
    base_dir: &Path,
    values: &VariableValues,
    env: &IndexMap<String, String>,
) -> Result<String, ImportError> {
    replace_nested(name, base_dir, values, env, 0)
}

fn replace_nested(
    name: &str,
    base_dir: &Path,
    values: &VariableValues,
    env: &IndexMap<String, String>,
    depth: usize,
) -> Result<String, ImportError> {
    if depth > MAX_NESTING {
        return Err(ImportError::UnresolvedVariable(name.to_string()));
    }
    let mut failed: Option<ImportError> = None;
    let result = replace_variables(name, |identifier, base| {
        if identifier == '%' {
            return environment_value(base, env);
        }
        if let Some(value) = builtin_value(base, base_dir) {
            return Some(value);
        }
        let stored = values.get(base)?;
        match replace_nested(stored, base_dir, values, env, depth + 1) {
            Ok(value) => Some(value),
            Err(error) => {
                failed.get_or_insert(error);
                None
            }
        }
    });
    match (result, failed) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(error)) => Err(error),
        (Err(variable), None) => Err(ImportError::UnresolvedVariable(variable)),
    }
}

fn environment_value(base: &str, env: &IndexMap<String, String>) -> Option<String> {
    let (variable, default) = match base.split_once('=') {
        Some((variable, default)) => (variable, Some(default)),
        None => (base, None),
    };
    env.get(variable)
        .cloned()
        .or_else(|| std::env::var(variable).ok())
        .or_else(|| default.map(str::to_string))
}

fn builtin_value(base: &str, base_dir: &Path) -> Option<String> {
    if is_number_literal(base) {
        return Some(base.trim().to_string());
    }
    let value = match base {
        "/" => MAIN_SEPARATOR.to_string(),
        ":" => if cfg!(windows) { ";" } else { ":" }.to_string(),
        "\\n" => "\n".to_string(),
        _ => match normalize(base).as_str() {
            "curdir" => base_dir.to_string_lossy().into_owned(),
            "execdir" => std::env::current_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            "tempdir" => std::env::temp_dir().to_string_lossy().into_owned(),
            "space" => " ".to_string(),
            "empty" => String::new(),
            "true" => "True".to_string(),
            "false" => "False".to_string(),
            "none" | "null" => "None".to_string(),
            _ => return None,
        },
    };
    Some(value)
}

// ============================================================================
// FILE LOOKUP
// ============================================================================

/// Does a library import name refer to a file rather than a module?
pub fn is_library_path(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".py") || name.contains('/') || name.contains('\\') || Path::new(name).is_absolute()
}

/// Does a variables import name refer to a file rather than a module?
pub fn is_variables_path(name: &str) -> bool {
    name.contains('/')
        || name.contains('\\')
        || Path::new(name).is_absolute()
        || extension_of(Path::new(name))
            .is_some_and(|ext| VARIABLES_EXTENSIONS.contains(&ext.as_str()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// `name` relative to `base_dir`, else relative to the first search path containing it.
pub fn find_file(name: &str, base_dir: &Path, search_paths: &[PathBuf]) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() {
        return path.exists().then(|| normalize_path(path));
    }
    std::iter::once(base_dir)
        .chain(search_paths.iter().map(PathBuf::as_path))
        .map(|dir| resolve_against(dir, path))
        .find(|candidate| candidate.exists())
}

/// Path of a resource file; the file must exist and have a resource extension.
pub fn find_resource(name: &str, base_dir: &Path, search_paths: &[PathBuf]) -> Result<PathBuf, ImportError> {
    let path = find_file(name, base_dir, search_paths)
        .filter(|p| p.is_file())
        .ok_or_else(|| ImportError::ResourceNotFound(name.to_string()))?;
    let extension = extension_of(&path).unwrap_or_default();
    if !RESOURCE_EXTENSIONS.contains(&extension.as_str()) {
        let mut supported: Vec<String> = RESOURCE_EXTENSIONS.iter().map(|e| format!("'.{e}'")).collect();
        supported.sort();
        let last = supported.pop().unwrap_or_default();
        return Err(ImportError::InvalidResource {
            path,
            reason: format!(
                "Invalid resource file extension '.{extension}'. Supported extensions are {} and {last}.",
                supported.join(", ")
            ),
        });
    }
    Ok(path)
}

/// Path of a variable file, or `None` for module style names the loader resolves.
pub fn find_variables(
    name: &str,
    base_dir: &Path,
    search_paths: &[PathBuf],
) -> Result<Option<PathBuf>, ImportError> {
    if !is_variables_path(name) {
        return Ok(None);
    }
    find_file(name, base_dir, search_paths)
        .filter(|p| p.is_file())
        .map(Some)
        .ok_or_else(|| ImportError::VariablesNotFound(name.to_string()))
}
