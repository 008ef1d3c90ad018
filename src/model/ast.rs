//! Document model: sections, definitions, blocks and statements.
//!
//! A [`File`] is what the analysis core consumes. It is produced by
//! [`crate::model::parse`] or by any other front-end that can build the
//! same shapes from its own token stream.

use std::sync::Arc;

use super::tokens::{Token, TokenKind};
use crate::base::Range;

// ============================================================================
// STATEMENTS
// ============================================================================

/// What a single logical line (after `...` continuation) means.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatementKind {
    SectionHeader,

    // Settings section
    LibraryImport,
    ResourceImport,
    VariablesImport,
    Documentation,
    Metadata,
    SuiteName,
    SuiteSetup,
    SuiteTeardown,
    TestSetup,
    TestTeardown,
    TestTemplate,
    TestTimeout,
    TestTags,
    ForceTags,
    DefaultTags,
    KeywordTags,

    // Variables section
    Variable,

    // Test and keyword sections
    TestCaseName,
    KeywordName,
    Setup,
    Teardown,
    Template,
    Timeout,
    Tags,
    Arguments,
    ReturnSetting,
    KeywordCall,
    /// A row of a templated test: arguments for the template keyword.
    TemplateArguments,

    // Control structures
    ForHeader,
    IfHeader,
    InlineIfHeader,
    ElseIfHeader,
    ElseHeader,
    TryHeader,
    ExceptHeader,
    FinallyHeader,
    WhileHeader,
    GroupHeader,
    End,
    ReturnStatement,
    Break,
    Continue,
    Var,

    Comment,
    EmptyLine,
    Error,
}

impl StatementKind {
    pub fn is_import(&self) -> bool {
        matches!(
            self,
            StatementKind::LibraryImport
                | StatementKind::ResourceImport
                | StatementKind::VariablesImport
        )
    }

    /// Fixtures name a keyword in their first data cell.
    pub fn is_fixture(&self) -> bool {
        matches!(
            self,
            StatementKind::SuiteSetup
                | StatementKind::SuiteTeardown
                | StatementKind::TestSetup
                | StatementKind::TestTeardown
                | StatementKind::Setup
                | StatementKind::Teardown
        )
    }
}

/// One logical line of data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    /// Data and comment tokens in source order. Separators are not kept.
    pub tokens: Vec<Token>,
    /// Structural errors of this statement (`ModelError` diagnostics).
    pub errors: Vec<Arc<str>>,
}

impl Statement {
    pub fn new(kind: StatementKind, tokens: Vec<Token>) -> Self {
        Self {
            kind,
            tokens,
            errors: Vec::new(),
        }
    }

    pub fn with_error(mut self, error: impl Into<Arc<str>>) -> Self {
        self.errors.push(error.into());
        self
    }

    pub fn get_token(&self, kind: TokenKind) -> Option<&Token> {
        self.tokens.iter().find(|t| t.kind == kind)
    }

    pub fn get_tokens(&self, kind: TokenKind) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(move |t| t.kind == kind)
    }

    pub fn get_value(&self, kind: TokenKind) -> Option<&str> {
        self.get_token(kind).map(|t| t.value.as_str())
    }

    /// Data tokens, without comments.
    pub fn data_tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(|t| t.kind != TokenKind::Comment)
    }

    pub fn comments(&self) -> impl Iterator<Item = &Token> {
        self.get_tokens(TokenKind::Comment)
    }

    /// Statement has no data, only comments or nothing.
    pub fn is_empty(&self) -> bool {
        self.data_tokens().next().is_none()
    }

    pub fn first_line(&self) -> u32 {
        self.tokens.first().map(|t| t.line).unwrap_or(0)
    }

    pub fn last_line(&self) -> u32 {
        self.tokens.iter().map(|t| t.line).max().unwrap_or(0)
    }

    /// Range from the first to the last data token.
    pub fn range(&self) -> Range {
        let mut tokens = self.data_tokens();
        let Some(first) = tokens.next() else {
            return self
                .tokens
                .first()
                .map(|t| t.range())
                .unwrap_or_default();
        };
        let last = tokens.last().unwrap_or(first);
        first.range().extend(&last.range())
    }
}

// ============================================================================
// BLOCKS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    For,
    If,
    InlineIf,
    ElseIf,
    Else,
    Try,
    Except,
    Finally,
    While,
    Group,
}

impl BlockKind {
    pub fn label(&self) -> &'static str {
        match self {
            BlockKind::For => "FOR",
            BlockKind::If | BlockKind::InlineIf => "IF",
            BlockKind::ElseIf => "ELSE IF",
            BlockKind::Else => "ELSE",
            BlockKind::Try => "TRY",
            BlockKind::Except => "EXCEPT",
            BlockKind::Finally => "FINALLY",
            BlockKind::While => "WHILE",
            BlockKind::Group => "GROUP",
        }
    }
}

/// A control structure. `IF` and `TRY` keep their `ELSE IF`/`ELSE`/
/// `EXCEPT`/`FINALLY` parts in `branches`; an inline `IF` has no `END`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub header: Statement,
    pub body: Vec<BodyItem>,
    pub branches: Vec<Block>,
    pub end: Option<Statement>,
}

impl Block {
    pub fn new(kind: BlockKind, header: Statement) -> Self {
        Self {
            kind,
            header,
            body: Vec::new(),
            branches: Vec::new(),
            end: None,
        }
    }

    /// Every statement of this block, headers and `END` included, in source order.
    pub fn statements(&self) -> Vec<&Statement> {
        let mut out = vec![&self.header];
        collect_statements(&self.body, &mut out);
        for branch in &self.branches {
            out.extend(branch.statements());
        }
        if let Some(end) = &self.end {
            out.push(end);
        }
        out
    }

    pub fn last_line(&self) -> u32 {
        self.statements()
            .iter()
            .map(|s| s.last_line())
            .max()
            .unwrap_or_else(|| self.header.last_line())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BodyItem {
    Statement(Statement),
    Block(Block),
}

impl BodyItem {
    pub fn first_line(&self) -> u32 {
        match self {
            BodyItem::Statement(s) => s.first_line(),
            BodyItem::Block(b) => b.header.first_line(),
        }
    }
}

fn collect_statements<'a>(body: &'a [BodyItem], out: &mut Vec<&'a Statement>) {
    for item in body {
        match item {
            BodyItem::Statement(s) => out.push(s),
            BodyItem::Block(b) => out.extend(b.statements()),
        }
    }
}

// ============================================================================
// DEFINITIONS AND SECTIONS
// ============================================================================

/// A test case, task or user keyword: a name statement and its body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Definition {
    pub header: Statement,
    pub body: Vec<BodyItem>,
}

impl Definition {
    /// Token carrying the test or keyword name.
    pub fn name_token(&self) -> Option<&Token> {
        self.header
            .tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::TestCaseName | TokenKind::KeywordName))
    }

    pub fn name(&self) -> &str {
        self.name_token().map(|t| t.value.as_str()).unwrap_or("")
    }

    /// Settings (`[Arguments]`, `[Tags]`, ...) of this definition, wherever they appear in the body.
    pub fn settings(&self) -> impl Iterator<Item = &Statement> {
        self.body.iter().filter_map(|item| match item {
            BodyItem::Statement(s)
                if s.tokens.first().is_some_and(|t| t.kind.is_setting()) =>
            {
                Some(s)
            }
            _ => None,
        })
    }

    pub fn setting(&self, kind: StatementKind) -> Option<&Statement> {
        self.settings().find(|s| s.kind == kind)
    }

    pub fn statements(&self) -> Vec<&Statement> {
        let mut out = vec![&self.header];
        collect_statements(&self.body, &mut out);
        out
    }

    /// Range from the name to the last line of the body.
    pub fn range(&self) -> Range {
        let start = self.header.range().start;
        let end = self
            .statements()
            .iter()
            .rev()
            .find(|s| !s.is_empty())
            .map(|s| s.range().end)
            .unwrap_or_else(|| self.header.range().end);
        Range::new(start, end)
    }

    pub fn last_line(&self) -> u32 {
        self.statements()
            .iter()
            .map(|s| s.last_line())
            .max()
            .unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Settings,
    Variables,
    TestCases,
    Tasks,
    Keywords,
    Comments,
    /// Data before the first section header; ignored like a comment section.
    Implicit,
    /// Unknown section header; its content is ignored.
    Invalid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub header: Option<Statement>,
    /// Settings, variables and comment rows.
    pub statements: Vec<Statement>,
    /// Tests, tasks or keywords.
    pub definitions: Vec<Definition>,
}

impl Section {
    pub fn new(kind: SectionKind, header: Option<Statement>) -> Self {
        Self {
            kind,
            header,
            statements: Vec::new(),
            definitions: Vec::new(),
        }
    }

    pub fn first_line(&self) -> u32 {
        self.header.as_ref().map(|h| h.first_line()).unwrap_or(0)
    }

    pub fn last_line(&self) -> u32 {
        let stmts = self.statements.iter().map(|s| s.last_line());
        let defs = self.definitions.iter().map(|d| d.last_line());
        stmts
            .chain(defs)
            .max()
            .unwrap_or_else(|| self.first_line())
    }
}

/// A parsed document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct File {
    /// Path (or URI) of the document.
    pub source: Arc<str>,
    pub sections: Vec<Section>,
    /// Number of lines in the source text.
    pub line_count: u32,
}

impl File {
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        Self {
            source: source.into(),
            sections: Vec::new(),
            line_count: 0,
        }
    }

    fn statements_of(&self, kind: SectionKind) -> impl Iterator<Item = &Statement> {
        self.sections
            .iter()
            .filter(move |s| s.kind == kind)
            .flat_map(|s| s.statements.iter())
    }

    fn definitions_of(&self, kind: SectionKind) -> impl Iterator<Item = &Definition> {
        self.sections
            .iter()
            .filter(move |s| s.kind == kind)
            .flat_map(|s| s.definitions.iter())
    }

    /// All rows of the Settings sections.
    pub fn settings(&self) -> impl Iterator<Item = &Statement> {
        self.statements_of(SectionKind::Settings)
    }

    pub fn imports(&self) -> impl Iterator<Item = &Statement> {
        self.settings().filter(|s| s.kind.is_import())
    }

    pub fn setting(&self, kind: StatementKind) -> Option<&Statement> {
        self.settings().find(|s| s.kind == kind)
    }

    /// Rows of the Variables sections.
    pub fn variables(&self) -> impl Iterator<Item = &Statement> {
        self.statements_of(SectionKind::Variables)
            .filter(|s| s.kind == StatementKind::Variable)
    }

    /// Tests and tasks.
    pub fn test_cases(&self) -> impl Iterator<Item = &Definition> {
        self.definitions_of(SectionKind::TestCases)
            .chain(self.definitions_of(SectionKind::Tasks))
    }

    pub fn keywords(&self) -> impl Iterator<Item = &Definition> {
        self.definitions_of(SectionKind::Keywords)
    }

    pub fn has_tests(&self) -> bool {
        self.sections
            .iter()
            .any(|s| matches!(s.kind, SectionKind::TestCases | SectionKind::Tasks))
    }

    /// Every statement of the document in source order.
    pub fn statements(&self) -> Vec<&Statement> {
        let mut out = Vec::new();
        for section in &self.sections {
            if let Some(h) = &section.header {
                out.push(h);
            }
            out.extend(section.statements.iter());
            for def in &section.definitions {
                out.extend(def.statements());
            }
        }
        out.sort_by_key(|s| s.first_line());
        out
    }
}
