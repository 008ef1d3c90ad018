//! Diagnostics produced while building and analysing a namespace.
//!
//! Every diagnostic carries a stable code from [`codes`]; the codes are what
//! workspace configuration and `# robotcode:` directives refer to.

use std::fmt;
use std::sync::Arc;

use crate::base::constants::DIAGNOSTICS_SOURCE;
use crate::base::{Location, Range};

// ============================================================================
// DIAGNOSTIC TYPES
// ============================================================================

/// Severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Severity {
    /// Convert to LSP severity number.
    pub fn to_lsp(&self) -> u32 {
        match self {
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::Info => 3,
            Severity::Hint => 4,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "information",
            Severity::Hint => "hint",
        })
    }
}

/// Rendering hints a client may apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticTag {
    Unnecessary,
    Deprecated,
}

/// Related information for a diagnostic.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelatedInfo {
    pub location: Location,
    pub message: Arc<str>,
}

impl RelatedInfo {
    pub fn new(location: Location, message: impl Into<Arc<str>>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }
}

/// A diagnostic message with location.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: Severity,
    pub code: Option<Arc<str>>,
    pub message: Arc<str>,
    pub source: &'static str,
    pub tags: Vec<DiagnosticTag>,
    pub related: Vec<RelatedInfo>,
}

impl Diagnostic {
    pub fn new(range: Range, severity: Severity, message: impl Into<Arc<str>>) -> Self {
        Self {
            range,
            severity,
            code: None,
            message: message.into(),
            source: DIAGNOSTICS_SOURCE,
            tags: Vec::new(),
            related: Vec::new(),
        }
    }

    /// Create a new error diagnostic.
    pub fn error(range: Range, message: impl Into<Arc<str>>) -> Self {
        Self::new(range, Severity::Error, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(range: Range, message: impl Into<Arc<str>>) -> Self {
        Self::new(range, Severity::Warning, message)
    }

    pub fn info(range: Range, message: impl Into<Arc<str>>) -> Self {
        Self::new(range, Severity::Info, message)
    }

    pub fn hint(range: Range, message: impl Into<Arc<str>>) -> Self {
        Self::new(range, Severity::Hint, message)
    }

    /// Set the error code.
    pub fn with_code(mut self, code: impl Into<Arc<str>>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_tag(mut self, tag: DiagnosticTag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Add related information.
    pub fn with_related(mut self, info: RelatedInfo) -> Self {
        self.related.push(info);
        self
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

// ============================================================================
// DIAGNOSTIC CODES
// ============================================================================

/// Stable diagnostic codes.
pub mod codes {
    // ========================================================================
    // KEYWORDS
    // ========================================================================

    pub const KEYWORD_NOT_FOUND: &str = "KeywordNotFound";
    pub const MULTIPLE_KEYWORDS: &str = "MultipleKeywords";
    pub const CONFLICTING_LIBRARY_KEYWORDS: &str = "ConflictingLibraryKeywords";
    pub const KEYWORD_NAME_EMPTY: &str = "KeywordNameEmpty";
    pub const DEPRECATED_KEYWORD: &str = "DeprecatedKeyword";
    pub const PRIVATE_KEYWORD: &str = "PrivateKeyword";
    pub const RESERVED_KEYWORD: &str = "ReservedKeyword";
    pub const KEYWORD_CONTAINS_ERRORS: &str = "KeywordContainsErrors";
    /// Arguments of a resolved call do not fit its signature.
    pub const KEYWORD_ERROR: &str = "KeywordError";
    pub const INCORRECT_USE: &str = "IncorrectUse";

    // ========================================================================
    // VARIABLES
    // ========================================================================

    pub const VARIABLE_NOT_FOUND: &str = "VariableNotFound";
    pub const ENVIRONMENT_VARIABLE_NOT_FOUND: &str = "EnvironmentVariableNotFound";
    pub const VARIABLE_ALREADY_DEFINED: &str = "VariableAlreadyDefined";
    pub const VARIABLE_OVERRIDDEN: &str = "VariableOverridden";
    pub const OVERRIDDEN_BY_COMMAND_LINE: &str = "OverriddenByCommandLine";

    // ========================================================================
    // IMPORTS
    // ========================================================================

    pub const LIBRARY_ALREADY_IMPORTED: &str = "LibraryAlreadyImported";
    pub const RESOURCE_ALREADY_IMPORTED: &str = "ResourceAlreadyImported";
    pub const VARIABLES_ALREADY_IMPORTED: &str = "VariablesAlreadyImported";
    pub const POSSIBLE_CIRCULAR_IMPORT: &str = "PossibleCircularImport";
    pub const RECURSIVE_IMPORT: &str = "RecursiveImport";
    pub const LIBRARY_OVERRIDES_BUILTIN: &str = "LibraryOverridesBuiltIn";
    pub const LIBRARY_CONTAINS_NO_KEYWORDS: &str = "LibraryContainsNoKeywords";
    pub const RESOURCE_EMPTY: &str = "ResourceEmpty";
    pub const IMPORT_CONTAINS_ERRORS: &str = "ImportContainsErrors";
    pub const IMPORT_REQUIRES_VALUE: &str = "ImportRequiresValue";

    // ========================================================================
    // MODEL
    // ========================================================================

    pub const TEST_CASE_NAME_EMPTY: &str = "TestCaseNameEmpty";
    pub const CODE_UNREACHABLE: &str = "CodeUnreachable";
    pub const MODEL_ERROR: &str = "ModelError";
    pub const TOKEN_ERROR: &str = "TokenError";
    pub const INVALID_HEADER: &str = "InvalidHeader";
    pub const DEPRECATED_HEADER: &str = "DeprecatedHeader";
    pub const DEPRECATED_FORCE_TAG: &str = "DeprecatedForceTag";
    pub const DEPRECATED_HYPHEN_TAG: &str = "DeprecatedHyphenTag";
    pub const DEPRECATED_RETURN_SETTING: &str = "DeprecatedReturnSetting";
}

// ============================================================================
// DIAGNOSTIC COLLECTOR
// ============================================================================

/// Collects diagnostics of one document in report order.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_code_tags_and_related() {
        let first = Location::new("/ws/a.robot", Range::from_coords(1, 0, 1, 11));
        let diagnostic = Diagnostic::info(Range::from_coords(2, 0, 2, 11), "Library \"Collections\" already imported.")
            .with_code(codes::LIBRARY_ALREADY_IMPORTED)
            .with_related(RelatedInfo::new(first.clone(), "Already imported here."))
            .with_tag(DiagnosticTag::Unnecessary);

        assert!(diagnostic.has_code("LibraryAlreadyImported"));
        assert_eq!(diagnostic.severity.to_lsp(), 3);
        assert_eq!(diagnostic.related[0].location, first);
        assert_eq!(diagnostic.source, DIAGNOSTICS_SOURCE);
    }

    #[test]
    fn test_collector_counts_errors() {
        let mut collector = DiagnosticCollector::new();
        collector.add(Diagnostic::error(Range::zero(), "a"));
        collector.add(Diagnostic::hint(Range::zero(), "b"));
        assert_eq!(collector.len(), 2);
        assert_eq!(collector.error_count(), 1);
    }
}
