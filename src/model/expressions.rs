//! Logos-based scanner for the Python expressions used by `IF`, `WHILE`,
//! `${{ }}` and the BuiltIn keywords that evaluate their argument.
//!
//! The only thing the analysis needs from an expression is the bare
//! `$name` references; everything else is skipped.

use logos::Logos;
use text_size::{TextRange, TextSize};

/// A `$name` reference inside an expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpressionVariable {
    /// The identifier without `$`.
    pub name: String,
    /// Span of `$name` in the expression, in bytes.
    pub range: TextRange,
}

impl ExpressionVariable {
    /// The variable in normal `${name}` form.
    pub fn variable_name(&self) -> String {
        format!("${{{}}}", self.name)
    }
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r#"[^$'"]+"#)]
enum ExprToken {
    #[token("$")]
    Dollar,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    DoubleQuoted,

    #[regex(r#"'([^'\\\n]|\\.)*'"#)]
    SingleQuoted,
}

/// Collect `$name` references outside string literals.
pub fn expression_variables(expression: &str) -> Vec<ExpressionVariable> {
    let mut lexer = ExprToken::lexer(expression);
    let mut out = Vec::new();
    while let Some(token) = lexer.next() {
        if token != Ok(ExprToken::Dollar) {
            continue;
        }
        let start = lexer.span().start;
        let rest = &expression[lexer.span().end..];
        let len = identifier_len(rest);
        if len == 0 {
            continue;
        }
        let name = &rest[..len];
        out.push(ExpressionVariable {
            name: name.to_string(),
            range: TextRange::new(
                TextSize::new(start as u32),
                TextSize::new((start + 1 + len) as u32),
            ),
        });
        lexer.bump(len);
    }
    out
}

/// Byte length of the Python identifier at the start of `text`.
fn identifier_len(text: &str) -> usize {
    let mut chars = text.char_indices();
    match chars.next() {
        Some((_, c)) if c == '_' || unicode_ident::is_xid_start(c) => {}
        _ => return 0,
    }
    for (i, c) in chars {
        if !unicode_ident::is_xid_continue(c) {
            return i;
        }
    }
    text.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(expression: &str) -> Vec<String> {
        expression_variables(expression)
            .into_iter()
            .map(|v| v.name)
            .collect()
    }

    #[test]
    fn test_finds_bare_variables() {
        assert_eq!(names("$x > 0 and $y_1 == len($items)"), vec!["x", "y_1", "items"]);
    }

    #[test]
    fn test_skips_string_literals() {
        assert_eq!(names(r#"'$a' + "$b \" $c" + $d"#), vec!["d"]);
    }

    #[test]
    fn test_ignores_braced_and_lonely_dollars() {
        assert!(names("${x} + $ + 1").is_empty());
    }

    #[test]
    fn test_unicode_identifiers_and_ranges() {
        let vars = expression_variables("1 + $größe");
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name, "größe");
        assert_eq!(vars[0].variable_name(), "${größe}");
        assert_eq!(vars[0].range.start(), TextSize::new(4));
        assert_eq!(vars[0].range.end(), TextSize::new(4 + 1 + "größe".len() as u32));
    }
}
