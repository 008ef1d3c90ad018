//! Severity overrides for the final diagnostic list.
//!
//! Two sources, applied in this order:
//!
//! 1. workspace configuration, by exact code and then by `*`;
//! 2. `# robotcode: action[Code, Code]` comments in the document.
//!
//! A directive trailing a statement applies to that statement's lines. A
//! directive on a line of its own applies until the end of the enclosing
//! block, test, keyword or section. Later directives win over earlier ones;
//! `reset` goes back to the workspace-level result.

use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::config::DiagnosticModifiersConfig;
use crate::model::{Block, BodyItem, File, Statement};

use super::diagnostics::{Diagnostic, Severity};

static DIRECTIVE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^#\s*robotcode\s*:\s*(.*)$").ok());
static RULE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)([a-z]+)\s*(?:\[([^\]]*)\])?").ok());

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModifierAction {
    Ignore,
    Severity(Severity),
    Reset,
}

impl ModifierAction {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "ignore" => Self::Ignore,
            "error" => Self::Severity(Severity::Error),
            "warn" | "warning" => Self::Severity(Severity::Warning),
            "info" | "information" => Self::Severity(Severity::Info),
            "hint" => Self::Severity(Severity::Hint),
            "reset" => Self::Reset,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LineRule {
    first_line: u32,
    last_line: u32,
    action: ModifierAction,
    /// Lowercase codes; `None` targets every code.
    codes: Option<Vec<String>>,
}

impl LineRule {
    fn applies(&self, line: u32, code: &str) -> bool {
        (self.first_line..=self.last_line).contains(&line)
            && self
                .codes
                .as_ref()
                .is_none_or(|codes| codes.iter().any(|c| c.eq_ignore_ascii_case(code)))
    }
}

#[derive(Clone, Debug, Default)]
pub struct DiagnosticsModifier {
    /// Lowercase code (or `*`) to action.
    workspace: FxHashMap<String, ModifierAction>,
    rules: Vec<LineRule>,
}

impl DiagnosticsModifier {
    pub fn new(model: &File, config: &DiagnosticModifiersConfig) -> Self {
        let mut workspace = FxHashMap::default();
        let lists = [
            (&config.ignore, ModifierAction::Ignore),
            (&config.error, ModifierAction::Severity(Severity::Error)),
            (&config.warning, ModifierAction::Severity(Severity::Warning)),
            (&config.information, ModifierAction::Severity(Severity::Info)),
            (&config.hint, ModifierAction::Severity(Severity::Hint)),
        ];
        for (codes, action) in lists {
            for code in codes {
                workspace.entry(code.trim().to_ascii_lowercase()).or_insert(action);
            }
        }

        let mut rules = Vec::new();
        for section in &model.sections {
            let end = section.last_line();
            if let Some(header) = &section.header {
                collect_statement(header, end, &mut rules);
            }
            for statement in &section.statements {
                collect_statement(statement, end, &mut rules);
            }
            for definition in &section.definitions {
                let end = definition.last_line();
                collect_statement(&definition.header, end, &mut rules);
                collect_body(&definition.body, end, &mut rules);
            }
        }
        if !rules.is_empty() {
            trace!("{} diagnostic directives in '{}'", rules.len(), model.source);
        }

        Self { workspace, rules }
    }

    pub fn is_empty(&self) -> bool {
        self.workspace.is_empty() && self.rules.is_empty()
    }

    /// Drop ignored diagnostics and rewrite severities.
    pub fn apply(&self, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
        if self.is_empty() {
            return diagnostics;
        }
        diagnostics.into_iter().filter_map(|d| self.modify(d)).collect()
    }

    fn workspace_action(&self, code: &str) -> Option<ModifierAction> {
        self.workspace
            .get(&code.to_ascii_lowercase())
            .or_else(|| self.workspace.get("*"))
            .copied()
    }

    fn modify(&self, mut diagnostic: Diagnostic) -> Option<Diagnostic> {
        let code = diagnostic.code.as_deref().unwrap_or("");
        let base = self.workspace_action(code);
        let line = diagnostic.range.start.line;

        let mut action = base;
        for rule in self.rules.iter().filter(|r| r.applies(line, code)) {
            action = match rule.action {
                ModifierAction::Reset => base,
                other => Some(other),
            };
        }

        match action {
            Some(ModifierAction::Ignore) => None,
            Some(ModifierAction::Severity(severity)) => {
                diagnostic.severity = severity;
                Some(diagnostic)
            }
            Some(ModifierAction::Reset) | None => Some(diagnostic),
        }
    }
}

fn collect_body(body: &[BodyItem], end: u32, rules: &mut Vec<LineRule>) {
    for item in body {
        match item {
            BodyItem::Statement(statement) => collect_statement(statement, end, rules),
            BodyItem::Block(block) => collect_block(block, rules),
        }
    }
}

fn collect_block(block: &Block, rules: &mut Vec<LineRule>) {
    let end = block.last_line();
    collect_statement(&block.header, end, rules);
    collect_body(&block.body, end, rules);
    for branch in &block.branches {
        collect_block(branch, rules);
    }
    if let Some(statement) = &block.end {
        collect_statement(statement, end, rules);
    }
}

fn collect_statement(statement: &Statement, end: u32, rules: &mut Vec<LineRule>) {
    let standalone = statement.is_empty();
    for comment in statement.comments() {
        let (first_line, last_line) = if standalone {
            (comment.line, end.max(comment.line))
        } else {
            (statement.first_line(), statement.last_line())
        };
        for (action, codes) in parse_directive(&comment.value) {
            rules.push(LineRule {
                first_line,
                last_line,
                action,
                codes,
            });
        }
    }
}

/// Actions of a `# robotcode: ...` comment, in order.
fn parse_directive(comment: &str) -> Vec<(ModifierAction, Option<Vec<String>>)> {
    let (Some(directive), Some(rule)) = (DIRECTIVE.as_ref(), RULE.as_ref()) else {
        return Vec::new();
    };
    let Some(rest) = directive
        .captures(comment.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    else {
        return Vec::new();
    };

    rule.captures_iter(rest)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let Some(action) = ModifierAction::parse(name) else {
                trace!("unknown diagnostic directive '{name}'");
                return None;
            };
            let codes = caps
                .get(2)
                .map(|m| {
                    m.as_str()
                        .split(',')
                        .map(|c| c.trim().to_ascii_lowercase())
                        .filter(|c| !c.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|codes| !codes.is_empty());
            Some((action, codes))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Range;
    use crate::model::parse;
    use crate::namespace::diagnostics::codes;

    fn diagnostic(line: u32, code: &str) -> Diagnostic {
        Diagnostic::error(Range::from_coords(line, 4, line, 8), "problem").with_code(code)
    }

    const SOURCE: &str = "*** Keywords ***\n\
        First\n\
        \x20   Log    ${a}    # robotcode: ignore[VariableNotFound]\n\
        \x20   Log    ${b}\n\
        \x20   # robotcode: hint\n\
        \x20   Log    ${c}\n\
        \x20   Log    ${d}    # robotcode: reset\n\
        Second\n\
        \x20   Log    ${e}\n";

    #[test]
    fn test_parse_directive() {
        let rules = parse_directive("# robotcode: ignore[KeywordNotFound, VariableNotFound] warn");
        assert_eq!(
            rules,
            vec![
                (
                    ModifierAction::Ignore,
                    Some(vec!["keywordnotfound".to_string(), "variablenotfound".to_string()])
                ),
                (ModifierAction::Severity(Severity::Warning), None),
            ]
        );
        assert!(parse_directive("# just a comment").is_empty());
    }

    #[test]
    fn test_trailing_and_standalone_directives() {
        let model = parse("/ws/kw.resource", SOURCE);
        let modifier = DiagnosticsModifier::new(&model, &DiagnosticModifiersConfig::default());

        let result = modifier.apply(vec![
            diagnostic(2, codes::VARIABLE_NOT_FOUND),
            diagnostic(2, codes::KEYWORD_NOT_FOUND),
            diagnostic(3, codes::VARIABLE_NOT_FOUND),
            diagnostic(5, codes::VARIABLE_NOT_FOUND),
            diagnostic(6, codes::VARIABLE_NOT_FOUND),
            diagnostic(8, codes::VARIABLE_NOT_FOUND),
        ]);

        let seen: Vec<(u32, Severity)> = result.iter().map(|d| (d.range.start.line, d.severity)).collect();
        assert_eq!(
            seen,
            vec![
                (2, Severity::Error),
                (3, Severity::Error),
                (5, Severity::Hint),
                (6, Severity::Error),
                (8, Severity::Error),
            ]
        );
    }

    #[test]
    fn test_workspace_overrides() {
        let model = parse("/ws/suite.robot", "*** Test Cases ***\nT\n    No Operation\n");
        let config = DiagnosticModifiersConfig {
            ignore: vec!["DeprecatedKeyword".to_string()],
            warning: vec!["*".to_string()],
            ..DiagnosticModifiersConfig::default()
        };
        let modifier = DiagnosticsModifier::new(&model, &config);
        let result = modifier.apply(vec![
            diagnostic(2, codes::DEPRECATED_KEYWORD),
            diagnostic(2, codes::KEYWORD_NOT_FOUND),
        ]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].severity, Severity::Warning);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let model = parse("/ws/kw.resource", SOURCE);
        let config = DiagnosticModifiersConfig {
            information: vec![codes::KEYWORD_NOT_FOUND.to_string()],
            ..DiagnosticModifiersConfig::default()
        };
        let modifier = DiagnosticsModifier::new(&model, &config);
        let input = vec![
            diagnostic(2, codes::VARIABLE_NOT_FOUND),
            diagnostic(3, codes::KEYWORD_NOT_FOUND),
            diagnostic(5, codes::VARIABLE_NOT_FOUND),
        ];
        let once = modifier.apply(input);
        let twice = modifier.apply(once.clone());
        assert_eq!(once, twice);
    }
}
