//! Descriptors of libraries, resources and variable files.
//!
//! These are what the loader child process sends back, what the data cache
//! stores and what namespaces resolve keywords against.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use super::arguments::ArgumentSpec;
use super::run_keywords::RunKeywordKind;
use crate::base::Range;
use crate::base::constants::BUILTIN_LIBRARY_NAME;
use crate::model::KeywordMatcher;

/// What kind of import produced a [`LibraryDoc`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    #[default]
    Library,
    Resource,
    /// The keywords and variables a suite file defines for itself.
    Suite,
    Variables,
}

/// An error reported while loading a library or reading a resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryError {
    pub message: String,
    /// Python exception type, when the loader reports one.
    pub type_name: Option<String>,
    pub source: Option<String>,
    /// 1-based line in `source`.
    pub line_no: Option<u32>,
}

impl LibraryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>, line_no: Option<u32>) -> Self {
        self.source = Some(source.into());
        self.line_no = line_no;
        self
    }
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.type_name {
            Some(type_name) => write!(f, "{type_name}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// A variable defined by a resource file or a variable file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportedVariable {
    /// Full name including the sigil, e.g. `${HOST}`.
    pub name: String,
    /// Literal value as written, when known.
    pub value: Option<String>,
    pub source: Option<String>,
    pub range: Range,
}

impl ImportedVariable {
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            value,
            ..Self::default()
        }
    }
}

/// Lazily built matcher; never serialized and ignored by equality.
#[derive(Clone, Debug, Default)]
struct LazyMatcher(OnceLock<KeywordMatcher>);

impl PartialEq for LazyMatcher {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for LazyMatcher {}

// ============================================================================
// KEYWORDS
// ============================================================================

/// Identity of a keyword across namespaces, used to key reference maps.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeywordKey {
    pub library: Arc<str>,
    pub source: Option<Arc<str>>,
    pub name: Arc<str>,
    pub line: u32,
}

impl fmt::Display for KeywordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.library, self.name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordDoc {
    pub name: String,
    pub args: ArgumentSpec,
    pub doc: String,
    pub tags: Vec<String>,
    /// File the keyword is defined in, when known.
    pub source: Option<String>,
    /// Range of the keyword name in `source`.
    pub range: Range,
    /// Name of the owning library or resource.
    pub library_name: String,
    pub library_source: Option<String>,
    pub deprecated: bool,
    pub is_private: bool,
    /// Problem with the definition itself (bad `[Arguments]`, duplicates...).
    pub error: Option<String>,
    #[serde(skip)]
    matcher: LazyMatcher,
}

impl KeywordDoc {
    pub fn new(name: impl Into<String>, library_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            library_name: library_name.into(),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: ArgumentSpec) -> Self {
        self.args = args;
        self
    }

    pub fn with_tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>, range: Range) -> Self {
        self.source = Some(source.into());
        self.range = range;
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self.deprecated = is_deprecated_doc(&self.doc);
        self
    }

    pub fn matcher(&self) -> &KeywordMatcher {
        self.matcher.0.get_or_init(|| KeywordMatcher::new(&self.name))
    }

    pub fn is_embedded(&self) -> bool {
        self.matcher().is_embedded()
    }

    /// `Library.Keyword`, as listed in ambiguity messages.
    pub fn longname(&self) -> String {
        if self.library_name.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.library_name, self.name)
        }
    }

    pub fn key(&self) -> KeywordKey {
        KeywordKey {
            library: Arc::from(self.library_name.as_str()),
            source: self.source.as_deref().map(Arc::from),
            name: Arc::from(self.name.as_str()),
            line: self.range.start.line,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.library_name == BUILTIN_LIBRARY_NAME
    }

    /// Classification of the BuiltIn keywords that call other keywords.
    pub fn run_keyword_kind(&self) -> Option<RunKeywordKind> {
        if self.is_builtin() {
            RunKeywordKind::classify(&self.name)
        } else {
            None
        }
    }

    pub fn is_reserved(&self) -> bool {
        self.library_name == crate::base::constants::RESERVED_LIBRARY_NAME
    }
}

/// `*DEPRECATED*` or `*DEPRECATED message*` at the start of the documentation.
pub fn is_deprecated_doc(doc: &str) -> bool {
    doc.starts_with("*DEPRECATED") && doc[1..].contains('*')
}

// ============================================================================
// LIBRARIES
// ============================================================================

/// Immutable description of a library, resource file or suite file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryDoc {
    pub name: String,
    pub kind: LibraryKind,
    pub doc: String,
    pub version: String,
    /// File the library was loaded from.
    pub source: Option<String>,
    /// Python module name, for module based libraries.
    pub module_name: Option<String>,
    pub keywords: Vec<Arc<KeywordDoc>>,
    /// Variables a resource file defines.
    pub variables: Vec<ImportedVariable>,
    pub errors: Vec<LibraryError>,
    /// Package search locations of module based libraries.
    pub module_search_paths: Vec<String>,
    /// Libraries acting as listeners may legitimately have no keywords.
    pub has_listener: bool,
    /// Number of imports a resource or suite declares.
    pub import_count: usize,
}

impl LibraryDoc {
    pub fn new(name: impl Into<String>, kind: LibraryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Self::default()
        }
    }

    /// A descriptor standing in for a library that failed to load.
    pub fn from_error(
        name: impl Into<String>,
        kind: LibraryKind,
        source: Option<String>,
        error: LibraryError,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            source,
            errors: vec![error],
            ..Self::default()
        }
    }

    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = KeywordDoc>) -> Self {
        let library = self.name.clone();
        let source = self.source.clone();
        self.keywords = keywords
            .into_iter()
            .map(|mut kw| {
                if kw.library_name.is_empty() {
                    kw.library_name = library.clone();
                }
                if kw.library_source.is_none() {
                    kw.library_source = source.clone();
                }
                Arc::new(kw)
            })
            .collect();
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// A resource without keywords, variables and imports.
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.variables.is_empty() && self.import_count == 0
    }
}

/// Variables exported by a variable file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariablesDoc {
    pub name: String,
    pub source: Option<String>,
    pub variables: Vec<ImportedVariable>,
    pub errors: Vec<LibraryError>,
}

impl VariablesDoc {
    pub fn new(name: impl Into<String>, source: Option<String>) -> Self {
        Self {
            name: name.into(),
            source,
            ..Self::default()
        }
    }

    pub fn from_error(name: impl Into<String>, source: Option<String>, error: LibraryError) -> Self {
        Self {
            name: name.into(),
            source,
            errors: vec![error],
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
