//! Imports declared by a document and what they resolved to.

use std::fmt;
use std::sync::Arc;

use crate::base::{Location, Range};
use crate::library::{LibraryDoc, VariablesDoc};
use crate::loader::ImportKind;
use crate::model::{Statement, StatementKind, TokenKind};

use super::variables::VariableDefinition;

/// Where an import statement is written.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImportSite {
    /// Name as written; `None` when the setting has no value.
    pub name: Option<String>,
    pub name_range: Range,
    /// Range of the whole statement.
    pub range: Range,
    pub source: Arc<str>,
}

impl ImportSite {
    pub fn location(&self) -> Location {
        Location::new(Arc::clone(&self.source), self.range)
    }
}

/// One `Library`, `Resource` or `Variables` setting.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Import {
    Library {
        site: ImportSite,
        args: Vec<String>,
        alias: Option<String>,
        alias_range: Option<Range>,
    },
    Resource {
        site: ImportSite,
    },
    Variables {
        site: ImportSite,
        args: Vec<String>,
    },
}

impl Import {
    /// Read an import statement; other statements give `None`.
    pub fn from_statement(statement: &Statement, source: &Arc<str>) -> Option<Self> {
        let name_token = statement.get_token(TokenKind::Name);
        let site = ImportSite {
            name: name_token.map(|t| t.value.clone()).filter(|n| !n.trim().is_empty()),
            name_range: name_token.map(|t| t.range()).unwrap_or_else(|| statement.range()),
            range: statement.range(),
            source: Arc::clone(source),
        };
        let args = || {
            statement
                .get_tokens(TokenKind::Argument)
                .map(|t| t.value.clone())
                .collect::<Vec<_>>()
        };
        match statement.kind {
            StatementKind::LibraryImport => {
                // the alias is the name token after WITH NAME / AS
                let alias = statement
                    .tokens
                    .iter()
                    .skip_while(|t| t.kind != TokenKind::WithName)
                    .find(|t| t.kind == TokenKind::Name);
                Some(Import::Library {
                    site,
                    args: args(),
                    alias: alias.map(|t| t.value.clone()),
                    alias_range: alias.map(|t| t.range()),
                })
            }
            StatementKind::ResourceImport => Some(Import::Resource { site }),
            StatementKind::VariablesImport => Some(Import::Variables { site, args: args() }),
            _ => None,
        }
    }

    pub fn site(&self) -> &ImportSite {
        match self {
            Import::Library { site, .. } | Import::Resource { site } | Import::Variables { site, .. } => site,
        }
    }

    pub fn kind(&self) -> ImportKind {
        match self {
            Import::Library { .. } => ImportKind::Library,
            Import::Resource { .. } => ImportKind::Resource,
            Import::Variables { .. } => ImportKind::Variables,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.site().name.as_deref()
    }

    pub fn range(&self) -> Range {
        self.site().range
    }

    pub fn args(&self) -> &[String] {
        match self {
            Import::Library { args, .. } | Import::Variables { args, .. } => args,
            Import::Resource { .. } => &[],
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Import::Library { alias, .. } => alias.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// ENTRIES
// ============================================================================

/// A library import resolved to its descriptor.
#[derive(Clone, Debug)]
pub struct LibraryEntry {
    /// Import name as written.
    pub import_name: String,
    pub args: Vec<String>,
    pub alias: Option<String>,
    pub library_doc: Arc<LibraryDoc>,
    /// Where it was imported; `None` for default libraries.
    pub import: Option<ImportSite>,
}

impl LibraryEntry {
    /// Name used as keyword owner: the alias, else the library name.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.library_doc.name)
    }

    pub fn import_location(&self) -> Option<Location> {
        self.import.as_ref().map(ImportSite::location)
    }
}

impl fmt::Display for LibraryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.import_name)?;
        if !self.args.is_empty() {
            write!(f, "  {}", self.args.join("  "))?;
        }
        if let Some(alias) = &self.alias {
            write!(f, "  AS  {alias}")?;
        }
        Ok(())
    }
}

/// A resource import with the keywords and variables it contributes.
#[derive(Clone, Debug)]
pub struct ResourceEntry {
    pub import_name: String,
    pub library_doc: Arc<LibraryDoc>,
    pub import: Option<ImportSite>,
    /// Imports the resource itself declares.
    pub imports: Vec<Import>,
    pub variables: Vec<Arc<VariableDefinition>>,
}

impl ResourceEntry {
    pub fn name(&self) -> &str {
        &self.library_doc.name
    }

    pub fn source(&self) -> Option<&str> {
        self.library_doc.source.as_deref()
    }

    pub fn import_location(&self) -> Option<Location> {
        self.import.as_ref().map(ImportSite::location)
    }
}

impl fmt::Display for ResourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.import_name)
    }
}

/// A variables import with its contributed variables.
#[derive(Clone, Debug)]
pub struct VariablesEntry {
    pub import_name: String,
    pub args: Vec<String>,
    pub variables_doc: Arc<VariablesDoc>,
    pub import: Option<ImportSite>,
    pub variables: Vec<Arc<VariableDefinition>>,
}

impl VariablesEntry {
    pub fn name(&self) -> &str {
        &self.variables_doc.name
    }

    pub fn import_location(&self) -> Option<Location> {
        self.import.as_ref().map(ImportSite::location)
    }
}

impl fmt::Display for VariablesEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.import_name)?;
        if !self.args.is_empty() {
            write!(f, "  {}", self.args.join("  "))?;
        }
        Ok(())
    }
}
