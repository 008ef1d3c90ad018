//! Builds a [`File`] from Robot Framework plain text.
//!
//! Supports the space separated and the pipe separated format, `...`
//! continuation, comments, all section kinds, settings, control structures
//! (including inline `IF`) and templated tests. Structural problems are
//! recorded as statement errors instead of aborting the build.

use super::ast::{
    Block, BlockKind, BodyItem, Definition, File, Section, SectionKind, Statement, StatementKind,
};
use super::tokens::{Token, TokenKind};
use super::variables::{is_assign, strip_assign_mark};

/// Build the model of `text`; `source` is stored as the file's path.
pub fn parse(source: &str, text: &str) -> File {
    let mut builder = FileBuilder::new(source);
    let mut line_count = 0;
    for (number, line) in text.lines().enumerate() {
        builder.line(split_line(number as u32, line));
        line_count = number as u32 + 1;
    }
    let mut file = builder.finish();
    file.line_count = line_count;
    apply_templates(&mut file);
    file
}

/// Kind of a section header cell and whether it uses the deprecated singular form.
pub fn section_header_kind(value: &str) -> Option<(SectionKind, bool)> {
    let name: String = value
        .trim_matches(|c: char| c == '*' || c.is_whitespace())
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    let kind = match name.as_str() {
        "settings" | "setting" => SectionKind::Settings,
        "variables" | "variable" => SectionKind::Variables,
        "testcases" | "testcase" => SectionKind::TestCases,
        "tasks" | "task" => SectionKind::Tasks,
        "keywords" | "keyword" => SectionKind::Keywords,
        "comments" | "comment" => SectionKind::Comments,
        _ => return None,
    };
    Some((kind, !name.ends_with('s')))
}

// ============================================================================
// LINES AND CELLS
// ============================================================================

#[derive(Clone, Debug)]
struct Cell {
    value: String,
    line: u32,
    col: u32,
}

impl Cell {
    fn token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.value.clone(), self.line, self.col)
    }
}

#[derive(Debug)]
struct RawLine {
    indented: bool,
    cells: Vec<Cell>,
    comment: Option<Token>,
}

fn char_col(text: &str, byte: usize) -> u32 {
    text[..byte].chars().count() as u32
}

fn split_line(line: u32, text: &str) -> RawLine {
    let is_pipe = text.starts_with('|')
        && text[1..].chars().next().is_none_or(char::is_whitespace);
    let (indented, pieces) = if is_pipe {
        split_pipes(text)
    } else {
        (
            text.starts_with(char::is_whitespace),
            split_spaces(text),
        )
    };

    let mut cells = Vec::new();
    let mut comment = None;
    for (byte, value) in pieces {
        if value.starts_with('#') {
            let rest = text[byte..].trim_end();
            comment = Some(Token::new(
                TokenKind::Comment,
                rest,
                line,
                char_col(text, byte),
            ));
            break;
        }
        cells.push(Cell {
            value: value.to_string(),
            line,
            col: char_col(text, byte),
        });
    }
    RawLine {
        indented,
        cells,
        comment,
    }
}

/// Cells separated by two or more spaces or a tab.
fn split_spaces(text: &str) -> Vec<(usize, &str)> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let is_separator_at = |i: usize| -> bool {
        let c = chars[i].1;
        c == '\t'
            || (c.is_whitespace()
                && chars.get(i + 1).is_none_or(|(_, next)| next.is_whitespace()))
    };

    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() && chars[i].1.is_whitespace() {
        i += 1;
    }
    while i < chars.len() {
        let start = chars[i].0;
        while i < chars.len() && !is_separator_at(i) {
            i += 1;
        }
        let end = chars.get(i).map(|(b, _)| *b).unwrap_or(text.len());
        out.push((start, &text[start..end]));
        while i < chars.len() && chars[i].1.is_whitespace() {
            i += 1;
        }
    }
    out
}

/// Cells of a line in pipe separated format. Leading empty cells mark indentation.
fn split_pipes(text: &str) -> (bool, Vec<(usize, &str)>) {
    let skip_ws = |from: usize| -> usize {
        text[from..]
            .char_indices()
            .find(|(_, c)| !c.is_whitespace())
            .map(|(i, _)| from + i)
            .unwrap_or(text.len())
    };

    let mut pieces = Vec::new();
    let mut cell_start = skip_ws(1);
    let mut search = cell_start;
    while let Some(rel) = text[search..].find('|') {
        let at = search + rel;
        let prev_ws = at == cell_start || text[..at].ends_with(char::is_whitespace);
        let next_ws = text[at + 1..].chars().next().is_none_or(char::is_whitespace);
        if prev_ws && next_ws {
            pieces.push((cell_start, text[cell_start..at].trim_end()));
            cell_start = skip_ws(at + 1);
            search = cell_start;
        } else {
            search = at + 1;
        }
    }
    let rest = text[cell_start..].trim_end();
    if !rest.is_empty() {
        pieces.push((cell_start, rest));
    }

    let leading_empty = pieces.iter().take_while(|(_, v)| v.is_empty()).count();
    let indented = leading_empty > 0;
    (indented, pieces.into_iter().skip(leading_empty).collect())
}

// ============================================================================
// ROWS AND SECTIONS
// ============================================================================

/// A logical line: one physical line plus its `...` continuations.
#[derive(Debug)]
struct Row {
    indented: bool,
    cells: Vec<Cell>,
    comments: Vec<Token>,
}

impl Row {
    fn is_data(&self) -> bool {
        !self.cells.is_empty()
    }
}

struct FileBuilder {
    file: File,
    kind: SectionKind,
    header: Option<Statement>,
    rows: Vec<Row>,
}

impl FileBuilder {
    fn new(source: &str) -> Self {
        Self {
            file: File::new(source),
            kind: SectionKind::Implicit,
            header: None,
            rows: Vec::new(),
        }
    }

    fn line(&mut self, line: RawLine) {
        if line.cells.is_empty() && line.comment.is_none() {
            return;
        }

        if !line.indented
            && line
                .cells
                .first()
                .is_some_and(|c| c.value.starts_with('*'))
        {
            self.flush();
            self.start_section(line);
            return;
        }

        if line.cells.first().is_some_and(|c| c.value == "...") {
            if let Some(row) = self.rows.iter_mut().rev().find(|r| r.is_data()) {
                row.cells.extend(line.cells.into_iter().skip(1));
                row.comments.extend(line.comment);
                return;
            }
            self.rows.push(Row {
                indented: line.indented,
                cells: line.cells.into_iter().skip(1).collect(),
                comments: line.comment.into_iter().collect(),
            });
            return;
        }

        self.rows.push(Row {
            indented: line.indented,
            cells: line.cells,
            comments: line.comment.into_iter().collect(),
        });
    }

    fn start_section(&mut self, line: RawLine) {
        let mut cells = line.cells.into_iter();
        let Some(first) = cells.next() else {
            return;
        };
        let (kind, token) = match section_header_kind(&first.value) {
            Some((kind, _)) => {
                let token_kind = match kind {
                    SectionKind::Settings => TokenKind::SettingHeader,
                    SectionKind::Variables => TokenKind::VariableHeader,
                    SectionKind::TestCases => TokenKind::TestCaseHeader,
                    SectionKind::Tasks => TokenKind::TaskHeader,
                    SectionKind::Keywords => TokenKind::KeywordHeader,
                    _ => TokenKind::CommentHeader,
                };
                (kind, first.token(token_kind))
            }
            None => (
                SectionKind::Invalid,
                first.token(TokenKind::InvalidHeader).with_error(format!(
                    "Unrecognized section header '{}'. Valid sections: 'Settings', 'Variables', \
                     'Test Cases', 'Tasks', 'Keywords' and 'Comments'.",
                    first.value
                )),
            ),
        };
        let mut tokens = vec![token];
        tokens.extend(cells.map(|c| c.token(TokenKind::Argument)));
        tokens.extend(line.comment);
        self.kind = kind;
        self.header = Some(Statement::new(StatementKind::SectionHeader, tokens));
    }

    fn flush(&mut self) {
        let rows = std::mem::take(&mut self.rows);
        let header = self.header.take();
        if header.is_none() && rows.is_empty() {
            return;
        }
        let mut section = Section::new(self.kind, header);
        match self.kind {
            SectionKind::Settings => {
                section.statements = rows.into_iter().map(suite_setting).collect();
            }
            SectionKind::Variables => {
                section.statements = rows.into_iter().map(variable_statement).collect();
            }
            SectionKind::TestCases | SectionKind::Tasks => {
                let (stray, definitions) = build_definitions(rows, false);
                section.statements = stray;
                section.definitions = definitions;
            }
            SectionKind::Keywords => {
                let (stray, definitions) = build_definitions(rows, true);
                section.statements = stray;
                section.definitions = definitions;
            }
            SectionKind::Comments | SectionKind::Implicit | SectionKind::Invalid => {}
        }
        self.file.sections.push(section);
    }

    fn finish(mut self) -> File {
        self.flush();
        self.file
    }
}

fn comment_statement(comments: Vec<Token>) -> Statement {
    Statement::new(StatementKind::Comment, comments)
}

fn with_comments(mut tokens: Vec<Token>, comments: Vec<Token>) -> Vec<Token> {
    tokens.extend(comments);
    tokens
}

// ============================================================================
// SETTINGS AND VARIABLES
// ============================================================================

fn normalize_setting(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn suite_setting(row: Row) -> Statement {
    if !row.is_data() {
        return comment_statement(row.comments);
    }
    let Row {
        cells, comments, ..
    } = row;
    let name = &cells[0];
    let values = &cells[1..];

    use StatementKind as S;
    use TokenKind as T;
    let (token_kind, kind) = match normalize_setting(&name.value).as_str() {
        "documentation" => (T::Documentation, S::Documentation),
        "name" => (T::SuiteName, S::SuiteName),
        "metadata" => (T::Metadata, S::Metadata),
        "suitesetup" | "suiteprecondition" => (T::SuiteSetup, S::SuiteSetup),
        "suiteteardown" | "suitepostcondition" => (T::SuiteTeardown, S::SuiteTeardown),
        "testsetup" | "tasksetup" | "testprecondition" => (T::TestSetup, S::TestSetup),
        "testteardown" | "taskteardown" | "testpostcondition" => {
            (T::TestTeardown, S::TestTeardown)
        }
        "testtemplate" | "tasktemplate" => (T::TestTemplate, S::TestTemplate),
        "testtimeout" | "tasktimeout" => (T::TestTimeout, S::TestTimeout),
        "testtags" | "tasktags" => (T::TestTags, S::TestTags),
        "forcetags" => (T::ForceTags, S::ForceTags),
        "defaulttags" => (T::DefaultTags, S::DefaultTags),
        "keywordtags" => (T::KeywordTags, S::KeywordTags),
        "library" => (T::Library, S::LibraryImport),
        "resource" => (T::Resource, S::ResourceImport),
        "variables" => (T::Variables, S::VariablesImport),
        _ => {
            let mut tokens = vec![name.token(T::Error)];
            tokens.extend(values.iter().map(|c| c.token(T::Argument)));
            return Statement::new(S::Error, with_comments(tokens, comments))
                .with_error(format!("Non-existing setting '{}'.", name.value));
        }
    };

    let mut tokens = vec![name.token(token_kind)];
    let mut errors = Vec::new();
    match kind {
        S::LibraryImport => {
            let alias_at = (values.len() >= 3)
                .then(|| values.len() - 2)
                .filter(|&i| matches!(values[i].value.as_str(), "AS" | "WITH NAME"));
            for (i, cell) in values.iter().enumerate() {
                let kind = match (i, alias_at) {
                    (0, _) => T::Name,
                    (i, Some(at)) if i == at => T::WithName,
                    (i, Some(at)) if i == at + 1 => T::Name,
                    _ => T::Argument,
                };
                tokens.push(cell.token(kind));
            }
        }
        S::ResourceImport => {
            for (i, cell) in values.iter().enumerate() {
                tokens.push(cell.token(if i == 0 { T::Name } else { T::Argument }));
            }
            if values.len() > 1 {
                errors.push(format!(
                    "Setting 'Resource' accepts only one value, got {}.",
                    values.len()
                ));
            }
        }
        S::VariablesImport | S::Metadata => {
            for (i, cell) in values.iter().enumerate() {
                tokens.push(cell.token(if i == 0 { T::Name } else { T::Argument }));
            }
        }
        S::SuiteSetup | S::SuiteTeardown | S::TestSetup | S::TestTeardown => {
            tokens.extend(fixture_tokens(values));
        }
        S::TestTemplate => {
            tokens.extend(values.iter().take(1).map(|c| c.token(T::Name)));
            tokens.extend(values.iter().skip(1).map(|c| c.token(T::Argument)));
            if values.len() > 1 {
                errors.push(format!(
                    "Setting '{}' accepts only one value, got {}.",
                    name.value,
                    values.len()
                ));
            }
        }
        S::TestTimeout | S::SuiteName => {
            tokens.extend(values.iter().map(|c| c.token(T::Argument)));
            if values.len() > 1 {
                errors.push(format!(
                    "Setting '{}' accepts only one value, got {}.",
                    name.value,
                    values.len()
                ));
            }
        }
        _ => tokens.extend(values.iter().map(|c| c.token(T::Argument))),
    }

    let mut statement = Statement::new(kind, with_comments(tokens, comments));
    for error in errors {
        statement = statement.with_error(error);
    }
    statement
}

fn fixture_tokens(values: &[Cell]) -> Vec<Token> {
    values
        .iter()
        .enumerate()
        .map(|(i, c)| {
            c.token(if i == 0 {
                TokenKind::Name
            } else {
                TokenKind::Argument
            })
        })
        .collect()
}

fn variable_statement(row: Row) -> Statement {
    if !row.is_data() {
        return comment_statement(row.comments);
    }
    let Row {
        cells, comments, ..
    } = row;
    let name = &cells[0];
    let mut tokens = vec![name.token(TokenKind::Variable)];
    tokens.extend(cells[1..].iter().map(|c| c.token(TokenKind::Argument)));
    let statement = Statement::new(StatementKind::Variable, with_comments(tokens, comments));
    if is_assign(&name.value, true, false) {
        statement
    } else {
        statement.with_error(format!("Invalid variable name '{}'.", name.value))
    }
}

// ============================================================================
// TESTS AND KEYWORDS
// ============================================================================

fn build_definitions(rows: Vec<Row>, is_keyword: bool) -> (Vec<Statement>, Vec<Definition>) {
    let mut stray = Vec::new();
    let mut definitions = Vec::new();
    let mut current: Option<(Statement, Vec<Row>)> = None;

    for row in rows {
        let starts_definition = !row.indented && row.cells.first().is_some_and(|c| !c.value.is_empty());
        if starts_definition {
            if let Some((header, body)) = current.take() {
                definitions.push(build_definition(header, body, is_keyword));
            }
            let Row {
                cells, comments, ..
            } = row;
            let name_kind = if is_keyword {
                TokenKind::KeywordName
            } else {
                TokenKind::TestCaseName
            };
            let header_kind = if is_keyword {
                StatementKind::KeywordName
            } else {
                StatementKind::TestCaseName
            };
            let mut cells = cells.into_iter();
            let name = cells.next().map(|c| c.token(name_kind));
            let rest: Vec<Cell> = cells.collect();
            let mut body = Vec::new();
            let header_tokens = if rest.is_empty() {
                with_comments(name.into_iter().collect(), comments)
            } else {
                body.push(Row {
                    indented: true,
                    cells: rest,
                    comments,
                });
                name.into_iter().collect()
            };
            current = Some((Statement::new(header_kind, header_tokens), body));
            continue;
        }

        match current.as_mut() {
            Some((_, body)) => body.push(row),
            None if row.is_data() => {
                let tokens = row
                    .cells
                    .iter()
                    .map(|c| c.token(TokenKind::Error))
                    .collect();
                stray.push(
                    Statement::new(StatementKind::Error, with_comments(tokens, row.comments))
                        .with_error("Statement is not inside a test case, task or keyword."),
                );
            }
            None => stray.push(comment_statement(row.comments)),
        }
    }
    if let Some((header, body)) = current.take() {
        definitions.push(build_definition(header, body, is_keyword));
    }
    (stray, definitions)
}

enum Parsed {
    Statement(Statement),
    Open(BlockKind, Statement),
    Branch(BlockKind, Statement),
    End(Statement),
    Inline(Block),
}

fn build_definition(header: Statement, rows: Vec<Row>, is_keyword: bool) -> Definition {
    let mut body: Vec<BodyItem> = Vec::new();
    let mut stack: Vec<Block> = Vec::new();

    for row in rows {
        match classify_body_row(row, is_keyword) {
            Parsed::Statement(s) => push_item(&mut stack, &mut body, BodyItem::Statement(s)),
            Parsed::Inline(b) => push_item(&mut stack, &mut body, BodyItem::Block(b)),
            Parsed::Open(kind, header) => stack.push(Block::new(kind, header)),
            Parsed::Branch(kind, header) => {
                if let Some(rejected) = open_branch(&mut stack, kind, header) {
                    push_item(&mut stack, &mut body, BodyItem::Statement(rejected));
                }
            }
            Parsed::End(end) => match stack.pop() {
                Some(mut block) => {
                    block.end = Some(end);
                    validate_block(&mut block);
                    push_item(&mut stack, &mut body, BodyItem::Block(block));
                }
                None => {
                    let end = end.with_error("END is not allowed in this context.");
                    push_item(&mut stack, &mut body, BodyItem::Statement(end));
                }
            },
        }
    }

    while let Some(mut block) = stack.pop() {
        let message = match block.kind {
            BlockKind::For => "FOR loop must have closing END.",
            BlockKind::While => "WHILE loop must have closing END.",
            BlockKind::Try => "TRY must have closing END.",
            BlockKind::Group => "GROUP must have closing END.",
            _ => "IF must have closing END.",
        };
        block.header.errors.push(message.into());
        validate_block(&mut block);
        push_item(&mut stack, &mut body, BodyItem::Block(block));
    }

    Definition { header, body }
}

fn current_body(block: &mut Block) -> &mut Vec<BodyItem> {
    if block.branches.is_empty() {
        &mut block.body
    } else {
        let last = block.branches.len() - 1;
        &mut block.branches[last].body
    }
}

fn push_item(stack: &mut [Block], body: &mut Vec<BodyItem>, item: BodyItem) {
    match stack.last_mut() {
        Some(top) => current_body(top).push(item),
        None => body.push(item),
    }
}

/// Attach an `ELSE IF`/`ELSE`/`EXCEPT`/`FINALLY` branch to the open block.
/// Returns the header back when it has no block to belong to.
fn open_branch(stack: &mut [Block], kind: BlockKind, mut header: Statement) -> Option<Statement> {
    let Some(top) = stack.last_mut() else {
        return Some(header.with_error(format!("{} is not allowed in this context.", kind.label())));
    };
    match (top.kind, kind) {
        (BlockKind::If, BlockKind::ElseIf) => {
            if has_branch(top, BlockKind::Else) {
                header.errors.push("ELSE IF not allowed after ELSE.".into());
            }
        }
        (BlockKind::If, BlockKind::Else) => {
            if has_branch(top, BlockKind::Else) {
                header.errors.push("Only one ELSE allowed.".into());
            }
        }
        (BlockKind::Try, BlockKind::Except) => {
            if has_branch(top, BlockKind::Else) || has_branch(top, BlockKind::Finally) {
                header.errors.push("EXCEPT not allowed after ELSE or FINALLY.".into());
            }
        }
        (BlockKind::Try, BlockKind::Else) => {
            if !has_branch(top, BlockKind::Except) {
                header.errors.push("TRY structure requires EXCEPT before ELSE.".into());
            }
        }
        (BlockKind::Try, BlockKind::Finally) => {
            if has_branch(top, BlockKind::Finally) {
                header.errors.push("Only one FINALLY allowed.".into());
            }
        }
        _ => {
            return Some(header.with_error(format!(
                "{} is not allowed in this context.",
                kind.label()
            )));
        }
    }
    top.branches.push(Block::new(kind, header));
    None
}

fn has_branch(block: &Block, kind: BlockKind) -> bool {
    block.branches.iter().any(|b| b.kind == kind)
}

fn has_data(body: &[BodyItem]) -> bool {
    body.iter().any(|item| match item {
        BodyItem::Block(_) => true,
        BodyItem::Statement(s) => s.kind != StatementKind::Comment,
    })
}

fn validate_block(block: &mut Block) {
    if !has_data(&block.body) {
        let message = match block.kind {
            BlockKind::For => Some("FOR loop cannot be empty."),
            BlockKind::While => Some("WHILE loop cannot be empty."),
            BlockKind::If => Some("IF branch cannot be empty."),
            BlockKind::Try => Some("TRY branch cannot be empty."),
            _ => None,
        };
        if let Some(message) = message {
            block.header.errors.push(message.into());
        }
    }
    for branch in &mut block.branches {
        if !has_data(&branch.body) {
            let message = format!("{} branch cannot be empty.", branch.kind.label());
            branch.header.errors.push(message.into());
        }
    }
    if block.kind == BlockKind::Try
        && !block
            .branches
            .iter()
            .any(|b| matches!(b.kind, BlockKind::Except | BlockKind::Finally))
    {
        block
            .header
            .errors
            .push("TRY structure must have EXCEPT or FINALLY branch.".into());
    }
}

fn classify_body_row(row: Row, is_keyword: bool) -> Parsed {
    let Row {
        cells, comments, ..
    } = row;
    let Some(first) = cells.first() else {
        return Parsed::Statement(comment_statement(comments));
    };

    if first.value.starts_with('[') && first.value.ends_with(']') {
        return Parsed::Statement(body_setting(&cells, comments, is_keyword));
    }

    let marker = first.value.as_str();
    let args = &cells[1..];
    match marker {
        "FOR" => Parsed::Open(BlockKind::For, for_header(&cells, comments)),
        "WHILE" => Parsed::Open(BlockKind::While, while_header(&cells, comments)),
        "IF" if cells.len() > 2 => Parsed::Inline(inline_if(&[], &cells, comments)),
        "IF" => {
            let mut s = control(StatementKind::IfHeader, TokenKind::If, &cells, comments);
            if args.is_empty() {
                s.errors.push("IF must have a condition.".into());
            }
            Parsed::Open(BlockKind::If, s)
        }
        "ELSE IF" => {
            let mut s = control(StatementKind::ElseIfHeader, TokenKind::ElseIf, &cells, comments);
            match args.len() {
                0 => s.errors.push("ELSE IF must have a condition.".into()),
                1 => {}
                _ => s.errors.push(
                    format!(
                        "ELSE IF cannot have more than one condition, got {}.",
                        quoted_list(&args[1..])
                    )
                    .into(),
                ),
            }
            Parsed::Branch(BlockKind::ElseIf, s)
        }
        "ELSE" => Parsed::Branch(
            BlockKind::Else,
            no_args(StatementKind::ElseHeader, TokenKind::Else, &cells, comments),
        ),
        "TRY" => Parsed::Open(
            BlockKind::Try,
            no_args(StatementKind::TryHeader, TokenKind::Try, &cells, comments),
        ),
        "EXCEPT" => Parsed::Branch(BlockKind::Except, except_header(&cells, comments)),
        "FINALLY" => Parsed::Branch(
            BlockKind::Finally,
            no_args(StatementKind::FinallyHeader, TokenKind::Finally, &cells, comments),
        ),
        "GROUP" => {
            let mut s = control(StatementKind::GroupHeader, TokenKind::Group, &cells, comments);
            if args.len() > 1 {
                s.errors.push(
                    format!("GROUP accepts only one name, got {}.", quoted_list(args)).into(),
                );
            }
            Parsed::Open(BlockKind::Group, s)
        }
        "END" => Parsed::End(no_args(StatementKind::End, TokenKind::End, &cells, comments)),
        "RETURN" => Parsed::Statement(control(
            StatementKind::ReturnStatement,
            TokenKind::Return,
            &cells,
            comments,
        )),
        "BREAK" => Parsed::Statement(no_args(StatementKind::Break, TokenKind::Break, &cells, comments)),
        "CONTINUE" => Parsed::Statement(no_args(
            StatementKind::Continue,
            TokenKind::Continue,
            &cells,
            comments,
        )),
        "VAR" => Parsed::Statement(var_statement(&cells, comments)),
        _ => {
            let assigns = cells
                .iter()
                .take_while(|c| is_assign(&c.value, true, true))
                .count();
            if cells.get(assigns).is_some_and(|c| c.value == "IF") && cells.len() > assigns + 1 {
                return Parsed::Inline(inline_if(&cells[..assigns], &cells[assigns..], comments));
            }
            Parsed::Statement(keyword_call(&cells, comments, true))
        }
    }
}

fn quoted_list(cells: &[Cell]) -> String {
    cells
        .iter()
        .map(|c| format!("'{}'", c.value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Marker token followed by plain arguments.
fn control(kind: StatementKind, marker: TokenKind, cells: &[Cell], comments: Vec<Token>) -> Statement {
    let mut tokens = vec![cells[0].token(marker)];
    tokens.extend(cells[1..].iter().map(|c| c.token(TokenKind::Argument)));
    Statement::new(kind, with_comments(tokens, comments))
}

/// Marker that does not accept arguments.
fn no_args(kind: StatementKind, marker: TokenKind, cells: &[Cell], comments: Vec<Token>) -> Statement {
    let statement = control(kind, marker, cells, comments);
    if cells.len() > 1 {
        let message = format!(
            "{} does not accept arguments, got {}.",
            cells[0].value,
            quoted_list(&cells[1..])
        );
        statement.with_error(message)
    } else {
        statement
    }
}

fn option_name<'a>(value: &'a str, allowed: &[&str]) -> Option<&'a str> {
    let (name, _) = value.split_once('=')?;
    allowed.contains(&name).then_some(name)
}

fn for_header(cells: &[Cell], comments: Vec<Token>) -> Statement {
    let mut tokens = vec![cells[0].token(TokenKind::For)];
    let mut separator: Option<&str> = None;
    let mut variables = Vec::new();
    let mut values = 0;
    for cell in &cells[1..] {
        match separator {
            None if matches!(cell.value.as_str(), "IN" | "IN RANGE" | "IN ENUMERATE" | "IN ZIP") => {
                separator = Some(cell.value.as_str());
                tokens.push(cell.token(TokenKind::ForSeparator));
            }
            None => {
                variables.push(cell.value.clone());
                tokens.push(cell.token(TokenKind::Variable));
            }
            Some(sep) => {
                let options: &[&str] = match sep {
                    "IN ENUMERATE" => &["start"],
                    "IN ZIP" => &["mode", "fill"],
                    _ => &[],
                };
                if option_name(&cell.value, options).is_some() {
                    tokens.push(cell.token(TokenKind::Option));
                } else {
                    values += 1;
                    tokens.push(cell.token(TokenKind::Argument));
                }
            }
        }
    }

    let mut statement = Statement::new(StatementKind::ForHeader, with_comments(tokens, comments));
    if variables.is_empty() {
        statement.errors.push("FOR loop has no loop variables.".into());
    }
    for variable in &variables {
        if !is_assign(variable, false, false) {
            statement
                .errors
                .push(format!("FOR loop has invalid loop variable '{variable}'.").into());
        }
    }
    match separator {
        None => statement
            .errors
            .push("FOR loop has no 'IN' or other valid separator.".into()),
        Some(_) if values == 0 => statement.errors.push("FOR loop has no loop values.".into()),
        Some(_) => {}
    }
    statement
}

fn while_header(cells: &[Cell], comments: Vec<Token>) -> Statement {
    let mut tokens = vec![cells[0].token(TokenKind::While)];
    let mut conditions = Vec::new();
    for cell in &cells[1..] {
        if option_name(&cell.value, &["limit", "on_limit", "on_limit_message"]).is_some() {
            tokens.push(cell.token(TokenKind::Option));
        } else {
            conditions.push(cell.clone());
            tokens.push(cell.token(TokenKind::Argument));
        }
    }
    let statement = Statement::new(StatementKind::WhileHeader, with_comments(tokens, comments));
    if conditions.len() > 1 {
        let message = format!(
            "WHILE cannot have more than one condition, got {}.",
            quoted_list(&conditions)
        );
        return statement.with_error(message);
    }
    statement
}

fn except_header(cells: &[Cell], comments: Vec<Token>) -> Statement {
    let mut tokens = vec![cells[0].token(TokenKind::Except)];
    let mut errors = Vec::new();
    let mut iter = cells[1..].iter();
    while let Some(cell) = iter.next() {
        if cell.value == "AS" {
            tokens.push(cell.token(TokenKind::As));
            match iter.next() {
                Some(var) => {
                    if !is_assign(&var.value, false, false) {
                        errors.push(format!("EXCEPT AS variable '{}' is invalid.", var.value));
                    }
                    tokens.push(var.token(TokenKind::Variable));
                    for extra in iter.by_ref() {
                        errors.push(format!(
                            "EXCEPT AS accepts only one value, got extra '{}'.",
                            extra.value
                        ));
                        tokens.push(extra.token(TokenKind::Argument));
                    }
                }
                None => errors.push("EXCEPT AS requires a value.".to_string()),
            }
        } else if option_name(&cell.value, &["type"]).is_some() {
            tokens.push(cell.token(TokenKind::Option));
        } else {
            tokens.push(cell.token(TokenKind::Argument));
        }
    }
    let mut statement = Statement::new(StatementKind::ExceptHeader, with_comments(tokens, comments));
    statement.errors.extend(errors.into_iter().map(Into::into));
    statement
}

fn var_statement(cells: &[Cell], comments: Vec<Token>) -> Statement {
    let mut tokens = vec![cells[0].token(TokenKind::Var)];
    let mut errors = Vec::new();
    match cells.get(1) {
        Some(name) => {
            tokens.push(name.token(TokenKind::Variable));
            if !is_assign(&name.value, true, false) {
                errors.push(format!("Invalid variable name '{}'.", name.value));
            }
        }
        None => errors.push("VAR requires a variable name.".to_string()),
    }
    for cell in cells.iter().skip(2) {
        if option_name(&cell.value, &["scope", "separator"]).is_some() {
            tokens.push(cell.token(TokenKind::Option));
        } else {
            tokens.push(cell.token(TokenKind::Argument));
        }
    }
    let mut statement = Statement::new(StatementKind::Var, with_comments(tokens, comments));
    statement.errors.extend(errors.into_iter().map(Into::into));
    statement
}

fn keyword_call(cells: &[Cell], comments: Vec<Token>, allow_assign: bool) -> Statement {
    let assigns = if allow_assign {
        cells
            .iter()
            .take_while(|c| is_assign(&c.value, true, true))
            .count()
    } else {
        0
    };
    let mut tokens: Vec<Token> = cells[..assigns]
        .iter()
        .map(|c| c.token(TokenKind::Assign))
        .collect();
    if let Some(keyword) = cells.get(assigns) {
        tokens.push(keyword.token(TokenKind::Keyword));
    }
    tokens.extend(
        cells
            .iter()
            .skip(assigns + 1)
            .map(|c| c.token(TokenKind::Argument)),
    );

    let mut statement = Statement::new(StatementKind::KeywordCall, with_comments(tokens, comments));
    if assigns > 1
        && cells[..assigns - 1]
            .iter()
            .any(|c| strip_assign_mark(&c.value) != c.value)
    {
        statement
            .errors
            .push("Assign mark '=' can be used only with the last variable.".into());
    }
    statement
}

fn body_setting(cells: &[Cell], comments: Vec<Token>, is_keyword: bool) -> Statement {
    use StatementKind as S;
    use TokenKind as T;

    let name = &cells[0];
    let inner = name.value[1..name.value.len() - 1].to_string();
    let values = &cells[1..];
    let normalized = normalize_setting(&inner);

    let known = match normalized.as_str() {
        "documentation" => Some((T::Documentation, S::Documentation, true, true)),
        "tags" => Some((T::Tags, S::Tags, true, true)),
        "setup" | "precondition" => Some((T::Setup, S::Setup, true, true)),
        "teardown" | "postcondition" => Some((T::Teardown, S::Teardown, true, true)),
        "timeout" => Some((T::Timeout, S::Timeout, true, true)),
        "template" => Some((T::Template, S::Template, true, false)),
        "arguments" => Some((T::Arguments, S::Arguments, false, true)),
        "return" => Some((T::ReturnSetting, S::ReturnSetting, false, true)),
        _ => None,
    };

    let Some((token_kind, kind, in_test, in_keyword)) = known else {
        let mut tokens = vec![name.token(T::Error)];
        tokens.extend(values.iter().map(|c| c.token(T::Argument)));
        return Statement::new(S::Error, with_comments(tokens, comments))
            .with_error(format!("Non-existing setting '{}'.", name.value));
    };

    let allowed = if is_keyword { in_keyword } else { in_test };
    let mut tokens = vec![name.token(token_kind)];
    match kind {
        S::Setup | S::Teardown => tokens.extend(fixture_tokens(values)),
        S::Template => {
            tokens.extend(values.iter().take(1).map(|c| c.token(T::Name)));
            tokens.extend(values.iter().skip(1).map(|c| c.token(T::Argument)));
        }
        _ => tokens.extend(values.iter().map(|c| c.token(T::Argument))),
    }
    let mut statement = Statement::new(kind, with_comments(tokens, comments));
    if !allowed {
        let owner = if is_keyword {
            "user keywords"
        } else {
            "tests or tasks"
        };
        statement
            .errors
            .push(format!("Setting '{inner}' is not allowed with {owner}.").into());
    } else if matches!(kind, S::Template | S::Timeout) && values.len() > 1 {
        statement.errors.push(
            format!("Setting '{inner}' accepts only one value, got {}.", values.len()).into(),
        );
    }
    statement
}

/// Inline `IF`: `[assign...]  IF  cond  body...  [ELSE IF  cond  body...]  [ELSE  body...]`.
fn inline_if(assigns: &[Cell], cells: &[Cell], comments: Vec<Token>) -> Block {
    let mut header_tokens: Vec<Token> = assigns.iter().map(|c| c.token(TokenKind::Assign)).collect();
    header_tokens.push(cells[0].token(TokenKind::InlineIf));
    if let Some(condition) = cells.get(1) {
        header_tokens.push(condition.token(TokenKind::Argument));
    }
    let mut header = Statement::new(StatementKind::InlineIfHeader, with_comments(header_tokens, comments));

    // (marker, condition, body cells)
    let mut parts: Vec<(Option<&Cell>, Option<&Cell>, Vec<Cell>)> = vec![(None, None, Vec::new())];
    let mut i = 2;
    while i < cells.len() {
        let cell = &cells[i];
        match cell.value.as_str() {
            "ELSE IF" => {
                parts.push((Some(cell), cells.get(i + 1), Vec::new()));
                i += 2;
                continue;
            }
            "ELSE" => parts.push((Some(cell), None, Vec::new())),
            _ => {
                if let Some(last) = parts.last_mut() {
                    last.2.push(cell.clone());
                }
            }
        }
        i += 1;
    }

    let mut block = Block::new(BlockKind::InlineIf, Statement::new(StatementKind::InlineIfHeader, Vec::new()));
    let mut seen_else = false;
    for (marker, condition, body) in parts {
        let statement = match inline_body(&body) {
            Ok(s) => Some(s),
            Err(message) => {
                header.errors.push(message.into());
                None
            }
        };
        match marker {
            None => block.body.extend(statement.map(BodyItem::Statement)),
            Some(marker) => {
                let is_else_if = marker.value == "ELSE IF";
                let (kind, stmt_kind, token_kind) = if is_else_if {
                    (BlockKind::ElseIf, StatementKind::ElseIfHeader, TokenKind::ElseIf)
                } else {
                    (BlockKind::Else, StatementKind::ElseHeader, TokenKind::Else)
                };
                let mut tokens = vec![marker.token(token_kind)];
                if is_else_if {
                    match condition {
                        Some(c) => tokens.push(c.token(TokenKind::Argument)),
                        None => header.errors.push("ELSE IF must have a condition.".into()),
                    }
                    if seen_else {
                        header.errors.push("ELSE IF not allowed after ELSE.".into());
                    }
                } else if seen_else {
                    header.errors.push("Only one ELSE allowed.".into());
                } else {
                    seen_else = true;
                }
                let mut branch = Block::new(kind, Statement::new(stmt_kind, tokens));
                branch.body.extend(statement.map(BodyItem::Statement));
                block.branches.push(branch);
            }
        }
    }
    block.header = header;
    block
}

fn inline_body(cells: &[Cell]) -> Result<Statement, &'static str> {
    let Some(first) = cells.first() else {
        return Err("Inline IF branches cannot be empty.");
    };
    Ok(match first.value.as_str() {
        "IF" => return Err("Inline IF cannot be nested."),
        "RETURN" => control(StatementKind::ReturnStatement, TokenKind::Return, cells, Vec::new()),
        "BREAK" => no_args(StatementKind::Break, TokenKind::Break, cells, Vec::new()),
        "CONTINUE" => no_args(StatementKind::Continue, TokenKind::Continue, cells, Vec::new()),
        _ => keyword_call(cells, Vec::new(), false),
    })
}

// ============================================================================
// TEMPLATES
// ============================================================================

fn template_name(statement: &Statement) -> Option<String> {
    let name = statement.get_value(TokenKind::Name)?;
    (!name.is_empty() && !name.eq_ignore_ascii_case("NONE")).then(|| name.to_string())
}

/// Rows of templated tests are arguments for the template keyword.
fn apply_templates(file: &mut File) {
    let suite_template = file
        .setting(StatementKind::TestTemplate)
        .and_then(template_name);

    for section in &mut file.sections {
        if !matches!(section.kind, SectionKind::TestCases | SectionKind::Tasks) {
            continue;
        }
        for definition in &mut section.definitions {
            let templated = match definition.setting(StatementKind::Template) {
                Some(local) => template_name(local).is_some(),
                None => suite_template.is_some(),
            };
            if templated {
                retype_template_rows(&mut definition.body);
            }
        }
    }
}

fn retype_template_rows(body: &mut [BodyItem]) {
    for item in body {
        match item {
            BodyItem::Statement(s) if s.kind == StatementKind::KeywordCall => {
                s.kind = StatementKind::TemplateArguments;
                for token in &mut s.tokens {
                    if token.kind != TokenKind::Comment {
                        token.kind = TokenKind::Argument;
                    }
                }
            }
            BodyItem::Block(block) if block.kind != BlockKind::InlineIf => {
                retype_template_rows(&mut block.body);
                for branch in &mut block.branches {
                    retype_template_rows(&mut branch.body);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(statement: &Statement) -> Vec<TokenKind> {
        statement.tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_space_separated_cells_and_columns() {
        let line = split_line(3, "    Log    hello world\tsecond");
        assert!(line.indented);
        let cells: Vec<_> = line.cells.iter().map(|c| (c.value.as_str(), c.col)).collect();
        assert_eq!(cells, vec![("Log", 4), ("hello world", 11), ("second", 23)]);
    }

    #[test]
    fn test_pipe_separated_cells() {
        let line = split_line(0, "|    | Log | a|b |");
        assert!(line.indented);
        let values: Vec<_> = line.cells.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["Log", "a|b"]);
    }

    #[test]
    fn test_comment_cell_ends_data() {
        let line = split_line(0, "    Log    x    # robotcode: ignore[KeywordNotFound]");
        assert_eq!(line.cells.len(), 2);
        let comment = line.comment.unwrap();
        assert_eq!(comment.value, "# robotcode: ignore[KeywordNotFound]");
        assert_eq!(comment.col, 16);
    }

    #[test]
    fn test_sections_and_imports() {
        let file = parse(
            "/t/suite.robot",
            "*** Settings ***\n\
             Library    Collections\n\
             Library    Remote    http://x    AS    Rem\n\
             Resource    common.resource\n\
             Variables    vars.py    arg\n",
        );
        let imports: Vec<_> = file.imports().collect();
        assert_eq!(imports.len(), 4);
        assert_eq!(imports[0].get_value(TokenKind::Name), Some("Collections"));
        assert_eq!(
            kinds(imports[1]),
            vec![
                TokenKind::Library,
                TokenKind::Name,
                TokenKind::Argument,
                TokenKind::WithName,
                TokenKind::Name
            ]
        );
        assert_eq!(imports[2].kind, StatementKind::ResourceImport);
        assert_eq!(imports[3].get_tokens(TokenKind::Argument).count(), 1);
    }

    #[test]
    fn test_continuation_joins_cells() {
        let file = parse(
            "/t/a.robot",
            "*** Test Cases ***\nExample\n    Log Many    a\n    ...    b    c\n",
        );
        let test = file.test_cases().next().unwrap();
        let BodyItem::Statement(call) = &test.body[0] else {
            panic!("expected statement");
        };
        assert_eq!(call.get_tokens(TokenKind::Argument).count(), 3);
        assert_eq!(call.last_line(), 3);
    }

    #[test]
    fn test_keyword_call_with_assignments() {
        let file = parse(
            "/t/a.robot",
            "*** Keywords ***\nKw\n    ${a}    ${b}=    Get Two\n",
        );
        let kw = file.keywords().next().unwrap();
        let BodyItem::Statement(call) = &kw.body[0] else {
            panic!("expected statement");
        };
        assert_eq!(
            kinds(call),
            vec![TokenKind::Assign, TokenKind::Assign, TokenKind::Keyword]
        );
        assert!(call.errors.is_empty());
    }

    #[test]
    fn test_blocks_nest_and_close() {
        let file = parse(
            "/t/a.robot",
            "*** Test Cases ***\n\
             T\n\
             \x20   FOR    ${i}    IN RANGE    3\n\
             \x20       IF    $i > 1\n\
             \x20           Log    big\n\
             \x20       ELSE\n\
             \x20           Log    small\n\
             \x20       END\n\
             \x20   END\n",
        );
        let test = file.test_cases().next().unwrap();
        let BodyItem::Block(for_block) = &test.body[0] else {
            panic!("expected FOR block");
        };
        assert_eq!(for_block.kind, BlockKind::For);
        assert!(for_block.end.is_some());
        let BodyItem::Block(if_block) = &for_block.body[0] else {
            panic!("expected IF block");
        };
        assert_eq!(if_block.branches.len(), 1);
        assert_eq!(if_block.branches[0].kind, BlockKind::Else);
        assert!(for_block.statements().iter().all(|s| s.errors.is_empty()));
    }

    #[test]
    fn test_missing_end_is_reported_on_header() {
        let file = parse("/t/a.robot", "*** Test Cases ***\nT\n    FOR    ${i}    IN    a\n        Log    ${i}\n");
        let test = file.test_cases().next().unwrap();
        let BodyItem::Block(block) = &test.body[0] else {
            panic!("expected block");
        };
        assert_eq!(block.header.errors.len(), 1);
        assert_eq!(&*block.header.errors[0], "FOR loop must have closing END.");
    }

    #[test]
    fn test_unexpected_end() {
        let file = parse("/t/a.robot", "*** Keywords ***\nK\n    END\n");
        let kw = file.keywords().next().unwrap();
        let BodyItem::Statement(end) = &kw.body[0] else {
            panic!("expected statement");
        };
        assert_eq!(&*end.errors[0], "END is not allowed in this context.");
    }

    #[test]
    fn test_inline_if_with_else() {
        let file = parse(
            "/t/a.robot",
            "*** Keywords ***\nK\n    ${x}=    IF    $a    Get A    ELSE    Get B\n",
        );
        let kw = file.keywords().next().unwrap();
        let BodyItem::Block(block) = &kw.body[0] else {
            panic!("expected inline IF");
        };
        assert_eq!(block.kind, BlockKind::InlineIf);
        assert_eq!(block.header.get_value(TokenKind::Assign), Some("${x}="));
        assert_eq!(block.header.get_value(TokenKind::Argument), Some("$a"));
        assert_eq!(block.branches.len(), 1);
        let BodyItem::Statement(else_call) = &block.branches[0].body[0] else {
            panic!("expected statement");
        };
        assert_eq!(else_call.get_value(TokenKind::Keyword), Some("Get B"));
    }

    #[test]
    fn test_section_headers() {
        assert_eq!(section_header_kind("*** Test Cases ***"), Some((SectionKind::TestCases, false)));
        assert_eq!(section_header_kind("*Setting*"), Some((SectionKind::Settings, true)));
        assert_eq!(section_header_kind("*** Nope ***"), None);

        let file = parse("/t/a.robot", "*** Nope ***\nwhatever\n");
        let header = file.sections[0].header.as_ref().unwrap();
        assert!(header.tokens[0].error.is_some());
    }

    #[test]
    fn test_template_rows_become_arguments() {
        let file = parse(
            "/t/a.robot",
            "*** Settings ***\nTest Template    Check\n\n*** Test Cases ***\nT\n    1    2\nU\n    [Template]    NONE\n    Log    x\n",
        );
        let tests: Vec<_> = file.test_cases().collect();
        let BodyItem::Statement(row) = &tests[0].body[0] else {
            panic!("expected statement");
        };
        assert_eq!(row.kind, StatementKind::TemplateArguments);
        assert_eq!(row.get_tokens(TokenKind::Argument).count(), 2);
        let BodyItem::Statement(call) = &tests[1].body[1] else {
            panic!("expected statement");
        };
        assert_eq!(call.kind, StatementKind::KeywordCall);
    }

    #[test]
    fn test_setting_not_allowed_in_tests() {
        let file = parse("/t/a.robot", "*** Test Cases ***\nT\n    [Arguments]    ${a}\n");
        let test = file.test_cases().next().unwrap();
        let BodyItem::Statement(s) = &test.body[0] else {
            panic!("expected statement");
        };
        assert_eq!(
            &*s.errors[0],
            "Setting 'Arguments' is not allowed with tests or tasks."
        );
    }
}
