//! Keyword resolution.
//!
//! A call name is looked up in this order:
//!
//! 1. the document's own keywords,
//! 2. `Owner.Keyword` names, split at every dot,
//! 3. keywords of imported resources, then of imported libraries.
//!
//! BDD prefixes (`Given`, `When`, ...) are stripped before (Robot Framework 7
//! and later) or after (older versions) the plain lookup. Results are cached
//! per `(name, handle_bdd)`; changing the search order yields a new finder.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::base::constants::is_standard_library;
use crate::config::RobotVersion;
use crate::library::{KeywordDoc, LibraryDoc};
use crate::model::{Languages, eq_namespace};

use super::diagnostics::{Severity, codes};
use super::entries::{LibraryEntry, ResourceEntry};

/// A problem found while resolving one name. The caller decides the range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinderDiagnostic {
    pub message: String,
    pub severity: Severity,
    pub code: &'static str,
}

impl FinderDiagnostic {
    fn error(message: impl Into<String>, code: &'static str) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
            code,
        }
    }
}

/// Outcome of one lookup.
#[derive(Clone, Debug, Default)]
pub struct KeywordLookup {
    pub keyword: Option<Arc<KeywordDoc>>,
    pub diagnostics: Vec<FinderDiagnostic>,
    /// `"Given "` when the name was found after stripping that prefix.
    pub bdd_prefix: Option<String>,
}

impl KeywordLookup {
    /// Error message for callers that want a failed lookup as an error.
    pub fn error_message(&self) -> Option<&str> {
        self.diagnostics
            .iter()
            .find(|d| d.severity == Severity::Error)
            .map(|d| d.message.as_str())
    }
}

/// Keyword tables a finder searches.
#[derive(Clone, Debug)]
pub struct KeywordTables {
    /// Keywords of the document itself.
    pub self_doc: Arc<LibraryDoc>,
    pub libraries: Vec<Arc<LibraryEntry>>,
    pub resources: Vec<Arc<ResourceEntry>>,
}

#[derive(Clone, Copy)]
enum Owner<'a> {
    SelfDoc,
    Library(&'a LibraryEntry),
    Resource(&'a ResourceEntry),
}

impl Owner<'_> {
    fn name(&self) -> Option<&str> {
        match self {
            Owner::SelfDoc => None,
            Owner::Library(entry) => Some(entry.name()),
            Owner::Resource(entry) => Some(entry.name()),
        }
    }
}

type Candidate<'a> = (Owner<'a>, &'a Arc<KeywordDoc>);

/// The search stopped after recording why.
struct SearchCancelled;

type SearchResult<T> = Result<T, SearchCancelled>;

#[derive(Debug)]
pub struct KeywordFinder {
    tables: Arc<KeywordTables>,
    source: Arc<str>,
    languages: Languages,
    robot_version: RobotVersion,
    search_order: Vec<String>,
    cache: Mutex<FxHashMap<(String, bool), KeywordLookup>>,
}

impl Clone for KeywordFinder {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            source: Arc::clone(&self.source),
            languages: self.languages.clone(),
            robot_version: self.robot_version,
            search_order: self.search_order.clone(),
            cache: Mutex::new(self.cache.lock().clone()),
        }
    }
}

impl KeywordFinder {
    pub fn new(
        tables: Arc<KeywordTables>,
        source: Arc<str>,
        languages: Languages,
        robot_version: RobotVersion,
        search_order: Vec<String>,
    ) -> Self {
        Self {
            tables,
            source,
            languages,
            robot_version,
            search_order,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn tables(&self) -> &Arc<KeywordTables> {
        &self.tables
    }

    pub fn search_order(&self) -> &[String] {
        &self.search_order
    }

    /// The same tables with another search order and an empty cache.
    pub fn with_search_order(&self, search_order: Vec<String>) -> Self {
        Self::new(
            Arc::clone(&self.tables),
            Arc::clone(&self.source),
            self.languages.clone(),
            self.robot_version,
            search_order,
        )
    }

    pub fn find_keyword(&self, name: &str, handle_bdd: bool) -> KeywordLookup {
        let key = (name.to_string(), handle_bdd);
        if let Some(cached) = self.cache.lock().get(&key) {
            return cached.clone();
        }

        let mut lookup = KeywordLookup::default();
        match self.find(name, handle_bdd, &mut lookup) {
            Ok(Some(keyword)) => lookup.keyword = Some(Arc::clone(keyword)),
            Ok(None) => lookup.diagnostics.push(FinderDiagnostic::error(
                format!("No keyword with name '{name}' found."),
                codes::KEYWORD_NOT_FOUND,
            )),
            Err(SearchCancelled) => {}
        }
        trace!(
            "find keyword '{}' -> {:?}",
            name,
            lookup.keyword.as_ref().map(|k| k.longname())
        );
        self.cache.lock().insert(key, lookup.clone());
        lookup
    }

    fn find<'a>(
        &'a self,
        name: &str,
        handle_bdd: bool,
        lookup: &mut KeywordLookup,
    ) -> SearchResult<Option<&'a Arc<KeywordDoc>>> {
        if name.trim().is_empty() {
            lookup.diagnostics.push(FinderDiagnostic::error(
                "Keyword name cannot be empty.",
                codes::KEYWORD_NAME_EMPTY,
            ));
            return Err(SearchCancelled);
        }

        let bdd_first = self.robot_version.bdd_prefix_first();
        if handle_bdd && bdd_first {
            if let Some(found) = self.find_bdd_style(name, lookup)? {
                return Ok(Some(found));
            }
        }

        let mut result = self.find_in_self(name, lookup)?;
        if result.is_none() && name.contains('.') {
            result = self.find_explicit(name, lookup)?;
        }
        if result.is_none() {
            result = self.find_implicit(name, lookup)?;
        }
        if result.is_none() && handle_bdd && !bdd_first {
            return self.find_bdd_style(name, lookup);
        }
        Ok(result)
    }

    fn find_bdd_style<'a>(
        &'a self,
        name: &str,
        lookup: &mut KeywordLookup,
    ) -> SearchResult<Option<&'a Arc<KeywordDoc>>> {
        let Some((prefix, rest)) = self.languages.split_bdd_prefix(name) else {
            return Ok(None);
        };
        let found = self.find(&rest, false, lookup)?;
        if found.is_some() {
            lookup.bdd_prefix = Some(format!("{prefix} "));
        }
        Ok(found)
    }

    fn find_in_self<'a>(
        &'a self,
        name: &str,
        lookup: &mut KeywordLookup,
    ) -> SearchResult<Option<&'a Arc<KeywordDoc>>> {
        let mut found: Vec<Candidate<'a>> = matching(&self.tables.self_doc, name)
            .map(|kw| (Owner::SelfDoc, kw))
            .collect();
        if found.len() > 1 {
            found = select_best_matches(found);
        }
        self.single(name, found, false, lookup)
    }

    fn find_explicit<'a>(
        &'a self,
        name: &str,
        lookup: &mut KeywordLookup,
    ) -> SearchResult<Option<&'a Arc<KeywordDoc>>> {
        let mut found = Vec::new();
        for (owner_name, keyword_name) in owner_and_keyword_names(name) {
            found.extend(self.keywords_of_owner(owner_name, keyword_name));
        }
        if found.len() > 1 {
            found = select_best_matches(found);
        }
        self.single(name, found, false, lookup)
    }

    fn keywords_of_owner<'a>(&'a self, owner_name: &str, keyword_name: &str) -> Vec<Candidate<'a>> {
        let mut found = Vec::new();
        for entry in &self.tables.libraries {
            if eq_namespace(entry.name(), owner_name) {
                found.extend(matching(&entry.library_doc, keyword_name).map(|kw| (Owner::Library(entry), kw)));
            }
        }
        for entry in &self.tables.resources {
            if eq_namespace(entry.name(), owner_name) {
                found.extend(matching(&entry.library_doc, keyword_name).map(|kw| (Owner::Resource(entry), kw)));
            }
        }
        found
    }

    fn find_implicit<'a>(
        &'a self,
        name: &str,
        lookup: &mut KeywordLookup,
    ) -> SearchResult<Option<&'a Arc<KeywordDoc>>> {
        match self.find_in_resources(name, lookup)? {
            Some(found) => Ok(Some(found)),
            None => self.find_in_libraries(name, lookup),
        }
    }

    fn find_in_resources<'a>(
        &'a self,
        name: &str,
        lookup: &mut KeywordLookup,
    ) -> SearchResult<Option<&'a Arc<KeywordDoc>>> {
        let mut found: Vec<Candidate<'a>> = Vec::new();
        for entry in &self.tables.resources {
            found.extend(matching(&entry.library_doc, name).map(|kw| (Owner::Resource(entry), kw)));
        }
        if found.len() > 1 {
            found = self.prioritize_same_file_or_public(found);
            if found.len() > 1 {
                found = select_best_matches(found);
                if found.len() > 1 {
                    found = self.apply_search_order(found);
                }
            }
        }
        self.single(name, found, true, lookup)
    }

    fn find_in_libraries<'a>(
        &'a self,
        name: &str,
        lookup: &mut KeywordLookup,
    ) -> SearchResult<Option<&'a Arc<KeywordDoc>>> {
        let mut found: Vec<Candidate<'a>> = Vec::new();
        for entry in &self.tables.libraries {
            found.extend(matching(&entry.library_doc, name).map(|kw| (Owner::Library(entry), kw)));
        }
        if found.len() > 1 {
            found = select_best_matches(found);
            if found.len() > 1 {
                found = self.apply_search_order(found);
            }
        }
        if found.len() == 2 {
            found = filter_standard_library(found, lookup);
        }
        self.single(name, found, true, lookup)
    }

    fn single<'a>(
        &self,
        name: &str,
        found: Vec<Candidate<'a>>,
        implicit: bool,
        lookup: &mut KeywordLookup,
    ) -> SearchResult<Option<&'a Arc<KeywordDoc>>> {
        match found.as_slice() {
            [] => Ok(None),
            [(_, keyword)] => Ok(Some(*keyword)),
            _ => {
                lookup.diagnostics.push(FinderDiagnostic::error(
                    multiple_keywords_message(name, &found, implicit),
                    codes::MULTIPLE_KEYWORDS,
                ));
                Err(SearchCancelled)
            }
        }
    }

    fn prioritize_same_file_or_public<'a>(&self, found: Vec<Candidate<'a>>) -> Vec<Candidate<'a>> {
        let same_file: Vec<Candidate<'a>> = found
            .iter()
            .filter(|(_, kw)| kw.source.as_deref() == Some(&*self.source))
            .copied()
            .collect();
        if !same_file.is_empty() {
            return same_file;
        }
        let public: Vec<Candidate<'a>> = found.iter().filter(|(_, kw)| !kw.is_private).copied().collect();
        if public.is_empty() { found } else { public }
    }

    fn apply_search_order<'a>(&self, found: Vec<Candidate<'a>>) -> Vec<Candidate<'a>> {
        for wanted in &self.search_order {
            if let Some(candidate) = found
                .iter()
                .find(|(owner, _)| owner.name().is_some_and(|n| eq_namespace(wanted, n)))
            {
                return vec![*candidate];
            }
        }
        found
    }

    /// Owner key and owner text length of an explicitly qualified call.
    ///
    /// For `Collections.Append To List` resolved to `keyword`, this is the
    /// library entry's name and the length of `Collections`.
    pub fn explicit_owner(&self, name: &str, keyword: &Arc<KeywordDoc>) -> Option<(Arc<str>, usize)> {
        owner_and_keyword_names(name).find_map(|(owner_name, keyword_name)| {
            self.keywords_of_owner(owner_name, keyword_name)
                .into_iter()
                .find(|(_, kw)| Arc::ptr_eq(kw, keyword))
                .and_then(|(owner, _)| owner.name().map(|n| (Arc::from(n), owner_name.len())))
        })
    }
}

fn matching<'a, 'n>(doc: &'a LibraryDoc, name: &'n str) -> impl Iterator<Item = &'a Arc<KeywordDoc>> {
    doc.keywords.iter().filter(move |kw| kw.matcher().matches(name))
}

/// `a.b.c` yields `("a", "b.c")` and `("a.b", "c")`.
fn owner_and_keyword_names(name: &str) -> impl Iterator<Item = (&str, &str)> {
    name.match_indices('.')
        .map(move |(index, _)| (&name[..index], &name[index + 1..]))
}

/// Normal keywords win over embedded ones; among embedded ones, drop every
/// candidate another candidate matches more specifically.
fn select_best_matches(found: Vec<Candidate<'_>>) -> Vec<Candidate<'_>> {
    let normal: Vec<Candidate<'_>> = found.iter().filter(|(_, kw)| !kw.is_embedded()).copied().collect();
    if !normal.is_empty() {
        return normal;
    }
    let best: Vec<Candidate<'_>> = found
        .iter()
        .filter(|(_, kw)| !found.iter().any(|(_, other)| is_better_match(other, kw)))
        .copied()
        .collect();
    if best.is_empty() { found } else { best }
}

fn is_better_match(candidate: &KeywordDoc, other: &KeywordDoc) -> bool {
    other.matcher().matches(&candidate.name) && !candidate.matcher().matches(&other.name)
}

fn filter_standard_library<'a>(found: Vec<Candidate<'a>>, lookup: &mut KeywordLookup) -> Vec<Candidate<'a>> {
    let (first, second) = (found[0], found[1]);
    let is_standard = |candidate: &Candidate<'_>| match candidate.0 {
        Owner::Library(entry) => is_standard_library(&entry.library_doc.name),
        _ => false,
    };
    let (standard, custom) = if is_standard(&first) {
        (first, second)
    } else if is_standard(&second) {
        (second, first)
    } else {
        return found;
    };
    let (Owner::Library(standard_entry), Owner::Library(custom_entry)) = (standard.0, custom.0) else {
        return found;
    };
    let imported_as = |entry: &LibraryEntry| {
        entry
            .alias
            .as_ref()
            .map(|alias| format!(" imported as '{alias}'"))
            .unwrap_or_default()
    };
    lookup.diagnostics.push(FinderDiagnostic {
        message: format!(
            "Keyword '{}' found both from a custom library '{}'{} and a standard library '{}'{}. \
             The custom keyword is used. To select explicitly, and to get rid of this warning, \
             use either '{}.{}' or '{}.{}'.",
            standard.1.name,
            custom_entry.library_doc.name,
            imported_as(custom_entry),
            standard_entry.library_doc.name,
            imported_as(standard_entry),
            custom_entry.name(),
            custom.1.name,
            standard_entry.name(),
            standard.1.name,
        ),
        severity: Severity::Warning,
        code: codes::CONFLICTING_LIBRARY_KEYWORDS,
    });
    vec![custom]
}

fn multiple_keywords_message(name: &str, found: &[Candidate<'_>], implicit: bool) -> String {
    let mut message = if found.iter().any(|(_, kw)| kw.is_embedded()) {
        format!("Multiple keywords matching name '{name}' found")
    } else if implicit {
        format!("Multiple keywords with name '{name}' found. Give the full name of the keyword you want to use")
    } else {
        format!("Multiple keywords with name '{name}' found")
    };
    let mut names: Vec<String> = found
        .iter()
        .map(|(owner, kw)| match owner.name() {
            Some(owner) => format!("{owner}.{}", kw.name),
            None => kw.name.clone(),
        })
        .collect();
    names.sort();
    message.push(':');
    for name in names {
        message.push_str("\n    ");
        message.push_str(&name);
    }
    message
}
