//! # Namespace Analyzer
//!
//! Walks one document against its initialized [`NamespaceState`] and
//! produces diagnostics plus the reference maps navigation features need.
//!
//! The walk visits sections in a fixed order: settings, variables, tests,
//! keywords. Each test and keyword gets a local scope; assignments become
//! visible to the statements after them.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::base::constants::{
    BUILTIN_KEYWORDS_WITH_EXPRESSIONS, SET_LIBRARY_SEARCH_ORDER_NAME, SET_VARIABLE_KEYWORDS, VariableScopeName,
};
use crate::base::{Location, Range};
use crate::error::{Error, Result};
use crate::library::{KeywordDoc, KeywordKey, RunKeywordKind};
use crate::model::variables::{ALL_IDENTIFIERS, is_number_literal, strip_assign_mark, variable_matches};
use crate::model::{
    Block, BlockKind, BodyItem, Definition, EmbeddedArguments, File, SectionKind, Statement, StatementKind, Token,
    TokenKind, contains_variable, expression_variables, normalize, search_variable, section_header_kind,
};

use super::diagnostics::{Diagnostic, DiagnosticCollector, DiagnosticTag, RelatedInfo, codes};
use super::finder::KeywordFinder;
use super::namespace::{Namespace, NamespaceState, suite_variable};
use super::variables::{VariableDefinition, VariableKind, VariableScope};

// ============================================================================
// RESULT
// ============================================================================

/// Where a keyword is called from.
#[derive(Clone, Debug)]
pub struct KeywordReferences {
    pub keyword: Arc<KeywordDoc>,
    pub locations: Vec<Location>,
}

/// Variables visible inside one test or keyword.
#[derive(Clone, Debug)]
pub struct BlockScope {
    /// Range of the test or keyword name.
    pub name_range: Range,
    pub range: Range,
    /// Arguments first, then locals in assignment order.
    pub variables: Vec<Arc<VariableDefinition>>,
}

#[derive(Clone, Debug, Default)]
pub struct AnalyzerResult {
    pub diagnostics: Vec<Diagnostic>,
    pub keyword_references: IndexMap<KeywordKey, KeywordReferences>,
    pub variable_references: IndexMap<Arc<VariableDefinition>, Vec<Location>>,
    /// Re-assignments of variables that already existed.
    pub local_variable_assignments: IndexMap<Arc<VariableDefinition>, Vec<Location>>,
    pub namespace_references: IndexMap<Arc<str>, Vec<Location>>,
    pub scopes: Vec<BlockScope>,
}

// ============================================================================
// ANALYZER
// ============================================================================

pub struct NamespaceAnalyzer<'a> {
    namespace: &'a Namespace,
    state: &'a NamespaceState,
    model: &'a File,
    source: Arc<str>,
    cancel: &'a CancellationToken,
    /// Replaced when `Set Library Search Order` is called.
    finder: KeywordFinder,
    suite_variables: VariableScope,
    local: Option<BlockScope>,
    suite_template: Option<Arc<KeywordDoc>>,
    template: Option<Arc<KeywordDoc>>,
    diagnostics: DiagnosticCollector,
    result: AnalyzerResult,
}

impl<'a> NamespaceAnalyzer<'a> {
    pub fn new(namespace: &'a Namespace, state: &'a NamespaceState, cancel: &'a CancellationToken) -> Self {
        Self {
            namespace,
            state,
            model: namespace.model(),
            source: Arc::clone(namespace.source()),
            cancel,
            finder: state.finder().clone(),
            suite_variables: state.suite_variables().clone(),
            local: None,
            suite_template: None,
            template: None,
            diagnostics: DiagnosticCollector::new(),
            result: AnalyzerResult::default(),
        }
    }

    pub fn run(mut self) -> Result<AnalyzerResult> {
        let model = self.model;
        self.check_model();

        for section in model.sections.iter().filter(|s| s.kind == SectionKind::Settings) {
            for statement in &section.statements {
                self.visit_setting(statement)?;
            }
        }
        self.visit_variables();
        for test in model.test_cases() {
            self.visit_test(test)?;
        }
        for keyword in model.keywords() {
            self.visit_keyword(keyword)?;
        }

        trace!(
            "analyzed '{}': {} keyword references, {} variable references",
            self.source,
            self.result.keyword_references.len(),
            self.result.variable_references.len()
        );
        self.result.diagnostics = self.diagnostics.into_vec();
        Ok(self.result)
    }

    fn location(&self, range: Range) -> Location {
        Location::new(Arc::clone(&self.source), range)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------------
    // Model
    // ------------------------------------------------------------------------

    fn check_model(&mut self) {
        let model = self.model;
        for header in model.sections.iter().filter_map(|s| s.header.as_ref()) {
            for token in header.tokens.iter().filter(|t| t.kind.is_header() && t.kind != TokenKind::InvalidHeader) {
                if let Some((kind, true)) = section_header_kind(&token.value) {
                    let plural = match kind {
                        SectionKind::Settings => "Settings",
                        SectionKind::Variables => "Variables",
                        SectionKind::TestCases => "Test Cases",
                        SectionKind::Tasks => "Tasks",
                        SectionKind::Keywords => "Keywords",
                        _ => "Comments",
                    };
                    self.diagnostics.add(
                        Diagnostic::hint(
                            token.range(),
                            format!(
                                "Singular section headers like '{}' are deprecated. Use plural format like '*** {plural} ***' instead.",
                                token.value
                            ),
                        )
                        .with_code(codes::DEPRECATED_HEADER)
                        .with_tag(DiagnosticTag::Deprecated),
                    );
                }
            }
        }

        for statement in model.statements() {
            for error in &statement.errors {
                self.diagnostics
                    .add(Diagnostic::error(statement.range(), Arc::clone(error)).with_code(codes::MODEL_ERROR));
            }
            for token in &statement.tokens {
                let Some(error) = &token.error else { continue };
                let code = if token.kind == TokenKind::InvalidHeader {
                    codes::INVALID_HEADER
                } else {
                    codes::TOKEN_ERROR
                };
                self.diagnostics
                    .add(Diagnostic::error(token.range(), error.as_str()).with_code(code));
            }
        }
    }

    // ------------------------------------------------------------------------
    // Settings and variables sections
    // ------------------------------------------------------------------------

    fn visit_setting(&mut self, statement: &Statement) -> Result<()> {
        match statement.kind {
            StatementKind::LibraryImport | StatementKind::ResourceImport | StatementKind::VariablesImport => {
                for token in statement.data_tokens().filter(|t| matches!(t.kind, TokenKind::Name | TokenKind::Argument)) {
                    self.check_token_variables(token);
                }
            }
            kind if kind.is_fixture() => self.visit_fixture(statement)?,
            StatementKind::TestTemplate => {
                if let Some(name) = template_name(statement) {
                    self.suite_template = self.resolve_keyword(name)?;
                }
            }
            StatementKind::ForceTags => {
                if let Some(token) = statement.tokens.first() {
                    self.diagnostics.add(
                        Diagnostic::hint(token.range(), "'Force Tags' is deprecated, use 'Test Tags' instead.")
                            .with_code(codes::DEPRECATED_FORCE_TAG)
                            .with_tag(DiagnosticTag::Deprecated),
                    );
                }
                self.check_arguments(statement);
            }
            StatementKind::TestTags | StatementKind::DefaultTags => self.visit_tags(statement),
            StatementKind::Documentation | StatementKind::Comment | StatementKind::EmptyLine | StatementKind::Error => {}
            _ => self.check_arguments(statement),
        }
        Ok(())
    }

    fn visit_variables(&mut self) {
        let model = self.model;
        let state = self.state;
        let mut seen: IndexMap<smol_str::SmolStr, Arc<VariableDefinition>> = IndexMap::new();

        for statement in model.variables() {
            for token in statement.get_tokens(TokenKind::Argument) {
                self.check_token_variables(token);
            }
            let Some(definition) = suite_variable(statement, &self.source) else {
                continue;
            };
            let definition = self
                .namespace
                .own_variables()
                .iter()
                .find(|d| d.range == definition.range)
                .cloned()
                .unwrap_or_else(|| Arc::new(definition));

            if let Some(first) = seen.get(&definition.matcher) {
                let mut diagnostic = Diagnostic::warning(
                    definition.range,
                    format!("Variable '{}' already defined.", definition.name),
                )
                .with_code(codes::VARIABLE_ALREADY_DEFINED);
                if let Some(location) = first.location() {
                    diagnostic = diagnostic.with_related(RelatedInfo::new(location, "Already defined here."));
                }
                self.diagnostics.add(diagnostic);
                continue;
            }

            if state.command_line_variables().iter().any(|d| d.matcher == definition.matcher) {
                self.diagnostics.add(
                    Diagnostic::hint(
                        definition.range,
                        format!("Variable '{}' is overridden by command line variable.", definition.name),
                    )
                    .with_code(codes::OVERRIDDEN_BY_COMMAND_LINE),
                );
            } else if let Some(imported) = state
                .resources()
                .values()
                .flat_map(|r| r.variables.iter())
                .chain(state.variables_imports().values().flat_map(|v| v.variables.iter()))
                .find(|d| d.matcher == definition.matcher)
            {
                let mut diagnostic = Diagnostic::hint(
                    definition.range,
                    format!("Variable '{}' overrides an imported variable.", definition.name),
                )
                .with_code(codes::VARIABLE_OVERRIDDEN);
                if let Some(location) = imported.location() {
                    diagnostic = diagnostic.with_related(RelatedInfo::new(location, "Imported here."));
                }
                self.diagnostics.add(diagnostic);
            }

            seen.insert(definition.matcher.clone(), definition);
        }
    }

    // ------------------------------------------------------------------------
    // Tests and keywords
    // ------------------------------------------------------------------------

    fn open_scope(&mut self, definition: &Definition) {
        let name_range = definition.name_token().map(Token::range).unwrap_or_else(|| definition.header.range());
        self.local = Some(BlockScope {
            name_range,
            range: definition.range(),
            variables: Vec::new(),
        });
    }

    fn close_scope(&mut self) {
        if let Some(scope) = self.local.take() {
            self.result.scopes.push(scope);
        }
    }

    fn visit_test(&mut self, test: &Definition) -> Result<()> {
        self.check_cancelled()?;
        match test.name_token() {
            Some(token) if !token.value.trim().is_empty() => self.check_token_variables(token),
            _ => self.diagnostics.add(
                Diagnostic::error(test.header.range(), "Test case name cannot be empty.")
                    .with_code(codes::TEST_CASE_NAME_EMPTY),
            ),
        }

        self.open_scope(test);
        self.template = match test.setting(StatementKind::Template) {
            Some(setting) => match template_name(setting) {
                Some(name) => self.resolve_keyword(name)?,
                None => None,
            },
            None => self.suite_template.clone(),
        };

        self.visit_body(&test.body)?;
        self.visit_deferred_settings(test)?;

        self.template = None;
        self.close_scope();
        Ok(())
    }

    fn visit_keyword(&mut self, keyword: &Definition) -> Result<()> {
        self.check_cancelled()?;
        let Some(name_token) = keyword.name_token().filter(|t| !t.value.trim().is_empty()) else {
            self.diagnostics.add(
                Diagnostic::error(keyword.header.range(), "Keyword name cannot be empty.")
                    .with_code(codes::KEYWORD_NAME_EMPTY),
            );
            return Ok(());
        };

        let own_doc = self.namespace.library_doc();
        let own = own_doc.keywords.iter().find(|k| k.range == name_token.range()).cloned();
        if let Some(error) = own.as_ref().and_then(|k| k.error.as_deref()) {
            self.diagnostics
                .add(Diagnostic::error(name_token.range(), error).with_code(codes::KEYWORD_ERROR));
        }

        self.open_scope(keyword);
        let keyword_name: Arc<str> = Arc::from(name_token.value.as_str());
        if let Some(Ok(_)) = EmbeddedArguments::from_name(&name_token.value) {
            for found in variable_matches(&name_token.value, "$") {
                let range = name_token.slice(TokenKind::KeywordName, found.start, found.end).range();
                let base = found.base.unwrap_or("");
                let name = format!("${{{}}}", base.split_once(':').map_or(base, |(n, _)| n.trim()));
                let definition = VariableDefinition::new(
                    VariableKind::EmbeddedArgument {
                        keyword: Arc::clone(&keyword_name),
                    },
                    &name,
                    range,
                    Some(Arc::clone(&self.source)),
                );
                self.push_local(Arc::new(definition));
            }
        }
        if let Some(arguments) = keyword.setting(StatementKind::Arguments) {
            self.visit_arguments(arguments, own.as_deref(), &keyword_name);
        }

        self.visit_body(&keyword.body)?;
        self.visit_deferred_settings(keyword)?;
        self.close_scope();
        Ok(())
    }

    /// `[Arguments]`: defaults may use the arguments before them.
    fn visit_arguments(&mut self, statement: &Statement, own: Option<&KeywordDoc>, keyword_name: &Arc<str>) {
        for token in statement.get_tokens(TokenKind::Argument) {
            let Ok(found) = search_variable(&token.value, "$@&", true) else {
                continue;
            };
            if !found.is_found() {
                continue;
            }
            if token.value[found.end..].starts_with('=') {
                self.check_slice(token, found.end + 1, token.value.len());
            }
            let range = token.slice(TokenKind::Variable, 0, found.end).range();
            let argument = own.and_then(|k| k.args.args.iter().find(|a| a.range == Some(range)));
            if let Some(argument) = argument {
                let definition = VariableDefinition::argument(argument, keyword_name, Some(Arc::clone(&self.source)));
                self.push_local(Arc::new(definition));
            }
        }
    }

    /// `[Teardown]` and `[Return]` run after the body.
    fn visit_deferred_settings(&mut self, definition: &Definition) -> Result<()> {
        if let Some(teardown) = definition.setting(StatementKind::Teardown) {
            self.visit_fixture(teardown)?;
        }
        if let Some(setting) = definition.setting(StatementKind::ReturnSetting) {
            if let Some(token) = setting.tokens.first() {
                self.diagnostics.add(
                    Diagnostic::hint(
                        token.range(),
                        "The '[Return]' setting is deprecated. Use the 'RETURN' statement instead.",
                    )
                    .with_code(codes::DEPRECATED_RETURN_SETTING)
                    .with_tag(DiagnosticTag::Deprecated),
                );
            }
            self.check_arguments(setting);
        }
        Ok(())
    }

    fn visit_fixture(&mut self, statement: &Statement) -> Result<()> {
        let Some(name) = statement.get_token(TokenKind::Name) else {
            return Ok(());
        };
        if name.value.eq_ignore_ascii_case("NONE") {
            return Ok(());
        }
        let args: Vec<&Token> = statement.get_tokens(TokenKind::Argument).collect();
        self.analyze_keyword(name, &args)?;
        Ok(())
    }

    fn visit_tags(&mut self, statement: &Statement) {
        for token in statement.get_tokens(TokenKind::Argument) {
            if token.value.starts_with('-') {
                self.diagnostics.add(
                    Diagnostic::hint(
                        token.range(),
                        "Settings tags starting with a hyphen is deprecated. Escape '-' like '\\-' to use the literal value.",
                    )
                    .with_code(codes::DEPRECATED_HYPHEN_TAG)
                    .with_tag(DiagnosticTag::Deprecated),
                );
            }
            self.check_token_variables(token);
        }
    }

    // ------------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------------

    fn visit_body(&mut self, body: &[BodyItem]) -> Result<()> {
        let mut terminated = false;
        let mut unreachable: Option<Range> = None;
        for item in body {
            if terminated && is_code(item) {
                let range = item_range(item);
                unreachable = Some(unreachable.map_or(range, |u| u.extend(&range)));
            }
            match item {
                BodyItem::Statement(statement) => self.visit_statement(statement)?,
                BodyItem::Block(block) => self.visit_block(block)?,
            }
            if let BodyItem::Statement(statement) = item {
                if matches!(
                    statement.kind,
                    StatementKind::ReturnStatement | StatementKind::Break | StatementKind::Continue
                ) {
                    terminated = true;
                }
            }
        }
        if let Some(range) = unreachable {
            self.diagnostics.add(
                Diagnostic::hint(range, "Code is unreachable.")
                    .with_code(codes::CODE_UNREACHABLE)
                    .with_tag(DiagnosticTag::Unnecessary),
            );
        }
        Ok(())
    }

    fn visit_statement(&mut self, statement: &Statement) -> Result<()> {
        match statement.kind {
            StatementKind::KeywordCall => {
                let Some(keyword) = statement.get_token(TokenKind::Keyword) else {
                    return Ok(());
                };
                let args: Vec<&Token> = statement.get_tokens(TokenKind::Argument).collect();
                self.analyze_keyword(keyword, &args)?;
                for assign in statement.get_tokens(TokenKind::Assign) {
                    self.assign_variable(assign);
                }
            }
            StatementKind::TemplateArguments => self.visit_template_row(statement),
            StatementKind::Setup => self.visit_fixture(statement)?,
            StatementKind::Tags => self.visit_tags(statement),
            StatementKind::Timeout | StatementKind::ReturnStatement => self.check_arguments(statement),
            StatementKind::Var => self.visit_var(statement),
            _ => {}
        }
        Ok(())
    }

    fn visit_template_row(&mut self, statement: &Statement) {
        let args: Vec<&Token> = statement.get_tokens(TokenKind::Argument).collect();
        for token in &args {
            self.check_token_variables(token);
        }
        let Some(template) = self.template.clone() else {
            return;
        };
        if args.is_empty() || template.error.is_some() {
            return;
        }
        if template
            .matcher()
            .embedded()
            .is_some_and(|embedded| embedded.args.len() == args.len())
        {
            return;
        }
        let values: Vec<&str> = args.iter().map(|t| t.value.as_str()).collect();
        if let Err(message) = template.args.validate(&template.name, &values) {
            self.diagnostics
                .add(Diagnostic::error(statement.range(), message).with_code(codes::KEYWORD_ERROR));
        }
    }

    fn visit_var(&mut self, statement: &Statement) {
        self.check_arguments(statement);
        let mut scope = VariableScopeName::Local;
        for option in statement.get_tokens(TokenKind::Option) {
            if let Some((name, value)) = option.value.split_once('=') {
                self.check_slice(option, name.len() + 1, option.value.len());
                if name.eq_ignore_ascii_case("scope") {
                    scope = VariableScopeName::parse(value).unwrap_or(VariableScopeName::Local);
                }
            }
        }
        if !statement.errors.is_empty() {
            return;
        }
        if let Some(token) = statement.get_token(TokenKind::Variable) {
            self.define_from_token(token, scope);
        }
    }

    fn visit_block(&mut self, block: &Block) -> Result<()> {
        let header = &block.header;
        match block.kind {
            BlockKind::For => {
                self.check_arguments(header);
                for variable in header.get_tokens(TokenKind::Variable) {
                    self.define_from_token(variable, VariableScopeName::Local);
                }
            }
            BlockKind::If | BlockKind::ElseIf | BlockKind::InlineIf | BlockKind::While => {
                let mut args = header.get_tokens(TokenKind::Argument);
                if let Some(condition) = args.next() {
                    self.check_expression(condition);
                }
                for token in args.chain(header.get_tokens(TokenKind::Option)) {
                    self.check_token_variables(token);
                }
            }
            BlockKind::Except => {
                self.check_arguments(header);
                if let Some(variable) = header.get_token(TokenKind::Variable) {
                    self.define_from_token(variable, VariableScopeName::Local);
                }
            }
            BlockKind::Group => self.check_arguments(header),
            BlockKind::Else | BlockKind::Try | BlockKind::Finally => {}
        }

        self.visit_body(&block.body)?;
        for branch in &block.branches {
            self.visit_block(branch)?;
        }

        if block.kind == BlockKind::InlineIf {
            for assign in header.get_tokens(TokenKind::Assign) {
                self.assign_variable(assign);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Keyword calls
    // ------------------------------------------------------------------------

    /// Resolve the keyword `token` names and record the reference.
    fn resolve_keyword(&mut self, token: &Token) -> Result<Option<Arc<KeywordDoc>>> {
        self.check_cancelled()?;
        let name = token.value.as_str();
        let lookup = self.finder.find_keyword(name, true);
        for diagnostic in &lookup.diagnostics {
            self.diagnostics.add(
                Diagnostic::new(token.range(), diagnostic.severity, diagnostic.message.as_str())
                    .with_code(diagnostic.code),
            );
        }
        let Some(keyword) = lookup.keyword else {
            return Ok(None);
        };

        let prefix_len = lookup
            .bdd_prefix
            .as_deref()
            .map(|prefix| bdd_prefix_len(name, prefix))
            .unwrap_or(0);
        let mut name_token = token.slice(token.kind, prefix_len, name.len());
        if let Some((owner, owner_len)) = self.finder.explicit_owner(&name_token.value, &keyword) {
            let owner_range = name_token.slice(token.kind, 0, owner_len).range();
            let location = self.location(owner_range);
            self.result.namespace_references.entry(owner).or_default().push(location);
            name_token = name_token.slice(token.kind, owner_len + 1, name_token.value.len());
        }

        let location = self.location(name_token.range());
        self.result
            .keyword_references
            .entry(keyword.key())
            .or_insert_with(|| KeywordReferences {
                keyword: Arc::clone(&keyword),
                locations: Vec::new(),
            })
            .locations
            .push(location);

        self.keyword_diagnostics(&keyword, token.range());
        Ok(Some(keyword))
    }

    fn keyword_diagnostics(&mut self, keyword: &KeywordDoc, range: Range) {
        if keyword.deprecated {
            let message = match deprecation_text(&keyword.doc) {
                Some(text) => format!("Keyword '{}' is deprecated: {text}", keyword.longname()),
                None => format!("Keyword '{}' is deprecated.", keyword.longname()),
            };
            self.diagnostics.add(
                Diagnostic::hint(range, message)
                    .with_code(codes::DEPRECATED_KEYWORD)
                    .with_tag(DiagnosticTag::Deprecated),
            );
        }
        if keyword.is_private && keyword.source.as_deref() != Some(&*self.source) {
            self.diagnostics.add(
                Diagnostic::warning(
                    range,
                    format!(
                        "Keyword '{}' is private and should only be called by keywords in the same file.",
                        keyword.longname()
                    ),
                )
                .with_code(codes::PRIVATE_KEYWORD),
            );
        }
        if keyword.is_reserved() {
            self.diagnostics.add(
                Diagnostic::error(range, format!("'{}' is a reserved keyword.", keyword.name))
                    .with_code(codes::RESERVED_KEYWORD),
            );
        }
        if let Some(error) = &keyword.error {
            let mut diagnostic = Diagnostic::error(range, format!("Keyword definition contains errors: {error}"))
                .with_code(codes::KEYWORD_CONTAINS_ERRORS);
            if let Some(source) = &keyword.source {
                diagnostic = diagnostic.with_related(RelatedInfo::new(
                    Location::new(source.as_str(), keyword.range),
                    error.as_str(),
                ));
            }
            self.diagnostics.add(diagnostic);
        }
    }

    /// A call: the keyword, its arguments and what they define.
    fn analyze_keyword(&mut self, token: &Token, args: &[&Token]) -> Result<Option<Arc<KeywordDoc>>> {
        self.check_cancelled()?;
        if crate::model::is_variable(&token.value) {
            self.check_token_variables(token);
            for arg in args {
                self.check_token_variables(arg);
            }
            return Ok(None);
        }
        self.check_token_variables(token);

        let Some(keyword) = self.resolve_keyword(token)? else {
            if token.value.trim().is_empty() {
                return Ok(None);
            }
            for arg in args {
                self.check_token_variables(arg);
            }
            return Ok(None);
        };

        if let Some(kind) = keyword.run_keyword_kind() {
            self.analyze_run_keyword(kind, token, args)?;
            return Ok(Some(keyword));
        }

        if keyword.error.is_none() {
            let values: Vec<&str> = args.iter().map(|t| t.value.as_str()).collect();
            match keyword.args.validate(&keyword.name, &values) {
                Err(message) => self
                    .diagnostics
                    .add(Diagnostic::error(token.range(), message).with_code(codes::KEYWORD_ERROR)),
                Ok(resolved) => {
                    for (name, _, index) in resolved.named {
                        self.reference_named_argument(&keyword, name, args[index]);
                    }
                }
            }
        }

        let normalized = normalize(&keyword.name);
        let set_variable_scope = keyword
            .is_builtin()
            .then(|| SET_VARIABLE_KEYWORDS.iter().find(|(n, _)| normalize(n) == normalized))
            .flatten()
            .map(|(_, scope)| *scope);
        let has_expression = keyword.is_builtin()
            && BUILTIN_KEYWORDS_WITH_EXPRESSIONS
                .iter()
                .any(|n| normalize(n) == normalized);

        for (index, arg) in args.iter().enumerate() {
            match index {
                0 if set_variable_scope.is_some() => {}
                0 if has_expression => self.check_expression(arg),
                _ => self.check_token_variables(arg),
            }
        }

        if let (Some(scope), Some(name)) = (set_variable_scope, args.first()) {
            self.define_set_variable(name, scope);
        }
        if keyword.is_builtin() && normalized == normalize(SET_LIBRARY_SEARCH_ORDER_NAME) {
            let order: Vec<String> = args.iter().map(|t| t.value.clone()).collect();
            trace!("library search order of '{}' set to {:?}", self.source, order);
            self.finder = self.finder.with_search_order(order);
        }
        Ok(Some(keyword))
    }

    fn analyze_run_keyword(&mut self, kind: RunKeywordKind, token: &Token, args: &[&Token]) -> Result<()> {
        match kind {
            RunKeywordKind::RunKeyword => self.analyze_nested_keyword(token, args, 0),
            RunKeywordKind::WithCondition(count) => self.analyze_nested_keyword(token, args, count),
            RunKeywordKind::RunKeywordIf => {
                let mut rest = args;
                let mut expect_condition = true;
                loop {
                    if expect_condition {
                        let Some((condition, tail)) = rest.split_first() else {
                            self.incorrect_use(token);
                            break;
                        };
                        self.check_expression(condition);
                        rest = tail;
                    }
                    let Some((name, tail)) = rest.split_first() else {
                        self.incorrect_use(token);
                        break;
                    };
                    let end = tail
                        .iter()
                        .position(|t| t.value == "ELSE IF" || t.value == "ELSE")
                        .unwrap_or(tail.len());
                    self.analyze_keyword(name, &tail[..end])?;
                    match tail.get(end) {
                        Some(marker) => {
                            expect_condition = marker.value == "ELSE IF";
                            rest = &tail[end + 1..];
                        }
                        None => break,
                    }
                }
                Ok(())
            }
            RunKeywordKind::RunKeywords => {
                if args.iter().any(|t| t.value == "AND") {
                    for group in args.split(|t| t.value == "AND") {
                        match group.split_first() {
                            Some((name, rest)) => {
                                self.analyze_keyword(name, rest)?;
                            }
                            None => self.incorrect_use(token),
                        }
                    }
                } else {
                    for name in args {
                        self.analyze_keyword(name, &[])?;
                    }
                }
                Ok(())
            }
        }
    }

    /// `skip` leading arguments, then a keyword name and its arguments.
    fn analyze_nested_keyword(&mut self, token: &Token, args: &[&Token], skip: usize) -> Result<()> {
        for arg in args.iter().take(skip) {
            self.check_token_variables(arg);
        }
        match args.get(skip) {
            Some(name) => {
                self.analyze_keyword(name, &args[skip + 1..])?;
            }
            None => self.incorrect_use(token),
        }
        Ok(())
    }

    fn incorrect_use(&mut self, token: &Token) {
        self.diagnostics.add(
            Diagnostic::error(token.range(), format!("Incorrect use of '{}', keyword name is missing.", token.value))
                .with_code(codes::INCORRECT_USE),
        );
    }

    /// `name=value` passed to a user keyword refers to its argument.
    fn reference_named_argument(&mut self, keyword: &KeywordDoc, name: &str, token: &Token) {
        let Some(argument) = keyword.args.get(name).filter(|a| a.range.is_some()) else {
            return;
        };
        let keyword_name: Arc<str> = Arc::from(keyword.name.as_str());
        let definition = VariableDefinition::argument(argument, &keyword_name, keyword.source.as_deref().map(Arc::from));
        let location = self.location(token.slice(token.kind, 0, name.len()).range());
        self.result
            .variable_references
            .entry(Arc::new(definition))
            .or_default()
            .push(location);
    }

    // ------------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------------

    fn push_local(&mut self, definition: Arc<VariableDefinition>) {
        match &mut self.local {
            Some(scope) => scope.variables.push(definition),
            None => {
                self.suite_variables.insert(definition);
            }
        }
    }

    fn lookup_variable(&self, name: &str) -> Option<Arc<VariableDefinition>> {
        if let Some(scope) = &self.local {
            if let Some(local) = scope.variables.iter().rev().find(|d| d.matches(name)) {
                return Some(Arc::clone(local));
            }
        }
        self.suite_variables.find(name).cloned()
    }

    fn add_reference(&mut self, definition: &Arc<VariableDefinition>, range: Range) {
        let location = self.location(range);
        self.result
            .variable_references
            .entry(Arc::clone(definition))
            .or_default()
            .push(location);
    }

    /// Define `name` in `scope`, or record an assignment when it already exists.
    fn define_variable(&mut self, name: &str, range: Range, scope: VariableScopeName) {
        if let Some(existing) = self.lookup_variable(name) {
            self.add_reference(&existing, range);
            let location = self.location(range);
            self.result
                .local_variable_assignments
                .entry(existing)
                .or_default()
                .push(location);
            return;
        }
        let (kind, suite_wide) = match scope {
            VariableScopeName::Local => (VariableKind::Local, false),
            VariableScopeName::Test => (VariableKind::Test, false),
            VariableScopeName::Suite | VariableScopeName::Global => (VariableKind::Suite, true),
        };
        let definition = Arc::new(VariableDefinition::new(kind, name, range, Some(Arc::clone(&self.source))));
        if suite_wide {
            self.suite_variables.insert(definition);
        } else {
            self.push_local(definition);
        }
    }

    /// A `VAR`, `FOR` or `AS` target.
    fn define_from_token(&mut self, token: &Token, scope: VariableScopeName) {
        let name = strip_assign_mark(&token.value);
        let Ok(found) = search_variable(name, "$@&", true) else {
            return;
        };
        if !found.is_found() || !found.items.is_empty() {
            self.check_slice(token, 0, name.len());
            return;
        }
        let range = token.slice(token.kind, found.start, found.end).range();
        self.define_variable(&found.name(), range, scope);
    }

    /// Left side of a keyword call. Item assignments need the variable to exist.
    fn assign_variable(&mut self, token: &Token) {
        let name = strip_assign_mark(&token.value);
        let Ok(found) = search_variable(name, "$@&", true) else {
            return;
        };
        if !found.is_found() {
            return;
        }
        if !found.items.is_empty() || found.base.is_some_and(contains_variable) {
            self.check_slice(token, 0, name.len());
            return;
        }
        let range = token.slice(token.kind, found.start, found.end).range();
        self.define_variable(&found.name(), range, VariableScopeName::Local);
    }

    /// `Set Suite Variable    ${name}    value`: also `\${name}` and `$name`.
    fn define_set_variable(&mut self, token: &Token, scope: VariableScopeName) {
        let value = token.value.strip_prefix('\\').unwrap_or(&token.value);
        let offset = token.value.len() - value.len();
        let (name, end) = match search_variable(value, "$@&", true) {
            Ok(found) if found.is_variable() => (found.name(), token.value.len()),
            _ if value.starts_with('$') && value.len() > 1 && !value.contains('{') => {
                (format!("${{{}}}", &value[1..]), token.value.len())
            }
            _ => {
                self.check_token_variables(token);
                return;
            }
        };
        let range = token.slice(token.kind, offset, end).range();
        self.define_variable(&name, range, scope);
    }

    fn check_arguments(&mut self, statement: &Statement) {
        for token in statement.get_tokens(TokenKind::Argument).chain(statement.get_tokens(TokenKind::Option)) {
            self.check_token_variables(token);
        }
    }

    fn check_token_variables(&mut self, token: &Token) {
        self.check_slice(token, 0, token.value.len());
    }

    /// Check every variable in `token.value[start..end]`.
    fn check_slice(&mut self, token: &Token, start: usize, end: usize) {
        let text = &token.value[start..end];
        for found in variable_matches(text, ALL_IDENTIFIERS) {
            let (Some(identifier), Some(base)) = (found.identifier, found.base) else {
                continue;
            };
            let base_start = start + found.base_start();

            let mut item_start = start + found.name_end();
            for item in &found.items {
                self.check_slice(token, item_start + 1, item_start + 1 + item.len());
                item_start += item.len() + 2;
            }

            if found.is_inline_expression() {
                self.check_inline_expression(token, base_start + 1, base_start + base.len() - 1);
                continue;
            }
            if contains_variable(base) {
                self.check_slice(token, base_start, base_start + base.len());
                continue;
            }
            if identifier == '%' {
                self.check_environment_variable(token, base, start + found.start, start + found.name_end());
                continue;
            }
            if is_number_literal(base) {
                continue;
            }

            let name = found.name();
            if let Some(definition) = self.lookup_variable(&name) {
                let range = token.slice(token.kind, start + found.start, start + found.name_end()).range();
                self.add_reference(&definition, range);
                continue;
            }
            if let Some(prefix) = extended_base(base) {
                if let Some(definition) = self.lookup_variable(&format!("${{{prefix}}}")) {
                    let range = token.slice(token.kind, base_start, base_start + prefix.len()).range();
                    self.add_reference(&definition, range);
                    continue;
                }
            }
            let range = token.slice(token.kind, start + found.start, start + found.name_end()).range();
            self.diagnostics.add(
                Diagnostic::error(range, format!("Variable '{name}' not found."))
                    .with_code(codes::VARIABLE_NOT_FOUND),
            );
        }
    }

    fn check_environment_variable(&mut self, token: &Token, base: &str, start: usize, end: usize) {
        let (name, default) = match base.split_once('=') {
            Some((name, default)) => (name, Some(default)),
            None => (base, None),
        };
        let range = token.slice(token.kind, start, end).range();
        let defined = default.is_some() || self.namespace.has_environment_variable(name);
        if defined {
            let definition = Arc::new(VariableDefinition::environment(&format!("%{{{name}}}")));
            self.add_reference(&definition, range);
        } else {
            self.diagnostics.add(
                Diagnostic::warning(range, format!("Environment variable '%{{{name}}}' not found."))
                    .with_code(codes::ENVIRONMENT_VARIABLE_NOT_FOUND),
            );
        }
    }

    /// Conditions of `IF`/`WHILE` and expression keyword arguments.
    fn check_expression(&mut self, token: &Token) {
        self.check_inline_expression(token, 0, token.value.len());
    }

    /// `$name` references and `${name}` variables of an expression at `token.value[start..end]`.
    fn check_inline_expression(&mut self, token: &Token, start: usize, end: usize) {
        if start >= end {
            return;
        }
        self.check_slice(token, start, end);
        for variable in expression_variables(&token.value[start..end]) {
            let from = start + usize::from(variable.range.start());
            let to = start + usize::from(variable.range.end());
            let range = token.slice(token.kind, from, to).range();
            let name = variable.variable_name();
            match self.lookup_variable(&name) {
                Some(definition) => self.add_reference(&definition, range),
                None => self.diagnostics.add(
                    Diagnostic::error(range, format!("Variable '{name}' not found."))
                        .with_code(codes::VARIABLE_NOT_FOUND),
                ),
            }
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn template_name(statement: &Statement) -> Option<&Token> {
    statement
        .get_token(TokenKind::Name)
        .filter(|t| !t.value.is_empty() && !t.value.eq_ignore_ascii_case("NONE"))
}

fn is_code(item: &BodyItem) -> bool {
    match item {
        BodyItem::Block(_) => true,
        BodyItem::Statement(statement) => {
            !statement.is_empty()
                && !matches!(statement.kind, StatementKind::Comment | StatementKind::EmptyLine)
                && !statement.tokens.first().is_some_and(|t| t.kind.is_setting())
        }
    }
}

fn item_range(item: &BodyItem) -> Range {
    match item {
        BodyItem::Statement(statement) => statement.range(),
        BodyItem::Block(block) => {
            let statements = block.statements();
            let start = block.header.range();
            statements
                .iter()
                .rev()
                .find(|s| !s.is_empty())
                .map_or(start, |last| start.extend(&last.range()))
        }
    }
}

/// Byte length of `prefix` (words joined by single spaces) at the start of
/// `name`, including the whitespace after it.
fn bdd_prefix_len(name: &str, prefix: &str) -> usize {
    let mut words = prefix.split_whitespace().count();
    let mut in_word = false;
    for (index, c) in name.char_indices() {
        if c.is_whitespace() {
            if in_word {
                words -= 1;
                in_word = false;
            }
        } else {
            if words == 0 {
                return index;
            }
            in_word = true;
        }
    }
    0
}

/// `${obj.attr}` and `${x + 1}` resolve through the leading name.
fn extended_base(base: &str) -> Option<&str> {
    let end = base.find(|c: char| !(c.is_alphanumeric() || c == '_' || c == ' '))?;
    let prefix = base[..end].trim_end();
    (!prefix.is_empty()).then_some(prefix)
}

/// Text after the `*DEPRECATED...*` marker on its first line, if any.
fn deprecation_text(doc: &str) -> Option<&str> {
    let rest = doc.trim_start().strip_prefix("*DEPRECATED")?;
    let (inline, after) = rest.split_once('*')?;
    let inline = inline.trim();
    if !inline.is_empty() {
        return Some(inline);
    }
    let after = after.lines().next().unwrap_or("").trim();
    (!after.is_empty()).then_some(after)
}
