//! Tokens of the cell-oriented document model.

use std::fmt;

use crate::base::{Position, Range};

/// Kind of a single cell in a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Section headers
    SettingHeader,
    VariableHeader,
    TestCaseHeader,
    TaskHeader,
    KeywordHeader,
    CommentHeader,
    InvalidHeader,

    // Suite settings
    Documentation,
    SuiteName,
    SuiteSetup,
    SuiteTeardown,
    Metadata,
    TestSetup,
    TestTeardown,
    TestTemplate,
    TestTimeout,
    TestTags,
    ForceTags,
    DefaultTags,
    KeywordTags,
    Library,
    Resource,
    Variables,

    // Test and keyword settings
    Setup,
    Teardown,
    Template,
    Timeout,
    Tags,
    Arguments,
    ReturnSetting,

    // Data
    TestCaseName,
    KeywordName,
    /// Import name, template name or fixture keyword name.
    Name,
    /// `AS` / `WITH NAME` in library imports.
    WithName,
    /// Variable name in the Variables section, FOR loop variables, `AS ${var}`, `VAR ${var}`.
    Variable,
    Argument,
    Assign,
    Keyword,
    /// `name=value` option of a control structure (`limit=`, `scope=`, `type=`...).
    Option,

    // Control structures
    For,
    ForSeparator,
    End,
    If,
    InlineIf,
    ElseIf,
    Else,
    Try,
    Except,
    Finally,
    As,
    While,
    Return,
    Break,
    Continue,
    Var,
    Group,

    // Other
    Comment,
    Error,
}

impl TokenKind {
    /// Tokens that name a setting (`Library`, `[Arguments]`, ...).
    pub fn is_setting(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Documentation
                | SuiteName
                | SuiteSetup
                | SuiteTeardown
                | Metadata
                | TestSetup
                | TestTeardown
                | TestTemplate
                | TestTimeout
                | TestTags
                | ForceTags
                | DefaultTags
                | KeywordTags
                | Library
                | Resource
                | Variables
                | Setup
                | Teardown
                | Template
                | Timeout
                | Tags
                | Arguments
                | ReturnSetting
        )
    }

    pub fn is_header(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            SettingHeader
                | VariableHeader
                | TestCaseHeader
                | TaskHeader
                | KeywordHeader
                | CommentHeader
                | InvalidHeader
        )
    }

    /// Control structure markers (`FOR`, `IF`, `END`, ...).
    pub fn is_control(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            For | ForSeparator
                | End
                | If
                | InlineIf
                | ElseIf
                | Else
                | Try
                | Except
                | Finally
                | As
                | While
                | Return
                | Break
                | Continue
                | Var
                | Group
        )
    }
}

/// One cell of a statement with its position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    /// 0-based line.
    pub line: u32,
    /// 0-based character column.
    pub col: u32,
    /// Tokenizer error attached to this cell.
    pub error: Option<String>,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, line: u32, col: u32) -> Self {
        Self {
            kind,
            value: value.into(),
            line,
            col,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn start(&self) -> Position {
        Position::new(self.line, self.col)
    }

    pub fn char_len(&self) -> u32 {
        self.value.chars().count() as u32
    }

    pub fn range(&self) -> Range {
        Range::at(self.start(), self.char_len())
    }

    /// Same position, different kind and value. Used when a cell is
    /// re-interpreted, e.g. the arguments of a templated test.
    pub fn retyped(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            value: self.value.clone(),
            line: self.line,
            col: self.col,
            error: None,
        }
    }

    /// A token covering `value[start..end]` (byte offsets) of this one.
    pub fn slice(&self, kind: TokenKind, start: usize, end: usize) -> Token {
        let prefix = self.value[..start].chars().count() as u32;
        Token {
            kind,
            value: self.value[start..end].to_string(),
            line: self.line,
            col: self.col + prefix,
            error: None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_counts_characters_not_bytes() {
        let token = Token::new(TokenKind::Argument, "äöü", 2, 4);
        assert_eq!(token.range(), Range::from_coords(2, 4, 2, 7));
    }

    #[test]
    fn test_slice_offsets_column() {
        let token = Token::new(TokenKind::Keyword, "Lib.Keyword", 0, 4);
        let kw = token.slice(TokenKind::Keyword, 4, 11);
        assert_eq!(kw.value, "Keyword");
        assert_eq!(kw.col, 8);
    }
}
