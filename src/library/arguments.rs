//! Argument specifications and call-site argument validation.
//!
//! Validation follows the rules of the Robot Framework runtime in dry-run
//! mode: a `name=value` cell is a named argument only when the keyword can
//! take it as one, and list or dict variables switch off count checks
//! because their length is unknown before execution.

use serde::{Deserialize, Serialize};

use crate::base::Range;
use crate::model::variables::{is_dict_variable, is_list_variable, split_from_equals};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArgumentKind {
    PositionalOnly,
    PositionalOnlyMarker,
    PositionalOrNamed,
    VarPositional,
    NamedOnlyMarker,
    NamedOnly,
    VarNamed,
}

/// One declared argument.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentInfo {
    /// Bare name, without sigil or default.
    pub name: String,
    pub kind: ArgumentKind,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
    /// Where a user keyword declares the argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

impl ArgumentInfo {
    pub fn new(name: impl Into<String>, kind: ArgumentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            types: Vec::new(),
            range: None,
        }
    }

    pub fn positional(name: impl Into<String>) -> Self {
        Self::new(name, ArgumentKind::PositionalOrNamed)
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_range(mut self, range: Range) -> Self {
        self.range = Some(range);
        self
    }

    pub fn is_marker(&self) -> bool {
        matches!(
            self.kind,
            ArgumentKind::PositionalOnlyMarker | ArgumentKind::NamedOnlyMarker
        )
    }

    /// How the argument is written in a user keyword: `${x}`, `@{x}`, `&{x}`.
    pub fn variable_name(&self) -> String {
        match self.kind {
            ArgumentKind::VarPositional => format!("@{{{}}}", self.name),
            ArgumentKind::VarNamed => format!("&{{{}}}", self.name),
            _ => format!("${{{}}}", self.name),
        }
    }
}

/// Ordered arguments of a keyword.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentSpec {
    pub args: Vec<ArgumentInfo>,
}

/// Call-site arguments split into positional and named ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedArguments<'a> {
    /// Positional values with their index in the call.
    pub positional: Vec<(usize, &'a str)>,
    /// `(name, value, index)` of every named argument.
    pub named: Vec<(&'a str, &'a str, usize)>,
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

/// `'a'`, `'a' and 'b'`, `'a', 'b' and 'c'`.
fn seq2str(items: &[&str]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| format!("'{i}'")).collect();
    match quoted.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {last}", rest.join(", ")),
    }
}

impl ArgumentSpec {
    pub fn new(args: Vec<ArgumentInfo>) -> Self {
        Self { args }
    }

    fn of_kind(&self, kind: ArgumentKind) -> impl Iterator<Item = &ArgumentInfo> {
        self.args.iter().filter(move |a| a.kind == kind)
    }

    /// Positional-only and positional-or-named arguments, in order.
    pub fn positional(&self) -> impl Iterator<Item = &ArgumentInfo> {
        self.args.iter().filter(|a| {
            matches!(
                a.kind,
                ArgumentKind::PositionalOnly | ArgumentKind::PositionalOrNamed
            )
        })
    }

    pub fn var_positional(&self) -> Option<&ArgumentInfo> {
        self.of_kind(ArgumentKind::VarPositional).next()
    }

    pub fn var_named(&self) -> Option<&ArgumentInfo> {
        self.of_kind(ArgumentKind::VarNamed).next()
    }

    pub fn named_only(&self) -> impl Iterator<Item = &ArgumentInfo> {
        self.of_kind(ArgumentKind::NamedOnly)
    }

    pub fn get(&self, name: &str) -> Option<&ArgumentInfo> {
        self.args.iter().find(|a| !a.is_marker() && a.name == name)
    }

    pub fn minargs(&self) -> usize {
        self.positional().filter(|a| a.default.is_none()).count()
    }

    /// `None` when the keyword accepts any number of positional arguments.
    pub fn maxargs(&self) -> Option<usize> {
        match self.var_positional() {
            Some(_) => None,
            None => Some(self.positional().count()),
        }
    }

    /// Can `name` be given as `name=value`?
    fn accepts_named(&self, name: &str) -> bool {
        self.args.iter().any(|a| {
            a.name == name
                && matches!(
                    a.kind,
                    ArgumentKind::PositionalOrNamed | ArgumentKind::NamedOnly
                )
        })
    }

    fn is_named(&self, arg: &str, previous_named: bool) -> bool {
        let (name, value) = split_from_equals(arg);
        if value.is_none() {
            return false;
        }
        previous_named || self.var_named().is_some() || self.accepts_named(name)
    }

    /// Split call arguments into positional and named ones.
    pub fn resolve<'a>(
        &self,
        keyword_name: &str,
        arguments: &[&'a str],
    ) -> Result<ResolvedArguments<'a>, String> {
        let mut resolved = ResolvedArguments::default();
        for (index, arg) in arguments.iter().enumerate() {
            if self.is_named(arg, !resolved.named.is_empty()) {
                let (name, value) = split_from_equals(arg);
                resolved.named.push((name, value.unwrap_or(""), index));
            } else if !resolved.named.is_empty() && !is_dict_variable(arg) {
                return Err(format!(
                    "Keyword '{keyword_name}' got positional argument after named arguments."
                ));
            } else {
                resolved.positional.push((index, arg));
            }
        }
        Ok(resolved)
    }

    /// Resolve and validate the arguments of a call.
    pub fn validate<'a>(
        &self,
        keyword_name: &str,
        arguments: &[&'a str],
    ) -> Result<ResolvedArguments<'a>, String> {
        let resolved = self.resolve(keyword_name, arguments)?;
        let error = |message: String| Err(format!("Keyword '{keyword_name}' {message}."));

        if resolved
            .positional
            .iter()
            .any(|(_, v)| is_list_variable(v) || is_dict_variable(v))
        {
            return Ok(resolved);
        }

        let named: Vec<&str> = resolved.named.iter().map(|(n, _, _)| *n).collect();
        let positional: Vec<&ArgumentInfo> = self.positional().collect();
        let given = resolved.positional.len();

        for arg in positional.iter().take(given) {
            if named.contains(&arg.name.as_str()) && arg.kind != ArgumentKind::PositionalOnly {
                return error(format!("got multiple values for argument '{}'", arg.name));
            }
        }

        if self.var_named().is_none() {
            for name in &named {
                if self.of_kind(ArgumentKind::PositionalOnly).any(|a| a.name == *name) {
                    return error(format!(
                        "does not accept argument '{name}' as named argument"
                    ));
                }
            }
        }

        let named_positionals = named
            .iter()
            .filter(|n| self.of_kind(ArgumentKind::PositionalOrNamed).any(|a| a.name == **n))
            .count();
        let count = given + named_positionals;
        let (min, max) = (self.minargs(), self.maxargs());
        if count < min || max.is_some_and(|max| count > max) {
            return Err(self.wrong_count_message(keyword_name, count));
        }

        for arg in positional.iter().take(min).skip(given) {
            if !named.contains(&arg.name.as_str()) {
                return error(format!("missing value for argument '{}'", arg.name));
            }
        }

        let mut missing: Vec<&str> = self
            .named_only()
            .filter(|a| a.default.is_none() && !named.contains(&a.name.as_str()))
            .map(|a| a.name.as_str())
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            return error(format!(
                "missing named-only argument{} {}",
                plural(missing.len()),
                seq2str(&missing)
            ));
        }

        if self.var_named().is_none() {
            let mut extra: Vec<&str> = named
                .iter()
                .copied()
                .filter(|n| !self.accepts_named(n))
                .collect();
            if !extra.is_empty() {
                extra.sort_unstable();
                extra.dedup();
                return error(format!(
                    "got unexpected named argument{} {}",
                    plural(extra.len()),
                    seq2str(&extra)
                ));
            }
        }

        Ok(resolved)
    }

    fn wrong_count_message(&self, keyword_name: &str, count: usize) -> String {
        let min = self.minargs();
        let mut expected = match self.maxargs() {
            Some(max) if max == min => format!("{min} argument{}", plural(min)),
            Some(max) => format!("{min} to {max} arguments"),
            None => format!("at least {min} argument{}", plural(min)),
        };
        if self.var_named().is_some() || self.named_only().next().is_some() {
            expected = expected.replace("argument", "non-named argument");
        }
        format!("Keyword '{keyword_name}' expected {expected}, got {count}.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn spec(args: &[(&str, ArgumentKind, Option<&str>)]) -> ArgumentSpec {
        ArgumentSpec::new(
            args.iter()
                .map(|(name, kind, default)| {
                    let info = ArgumentInfo::new(*name, *kind);
                    match default {
                        Some(d) => info.with_default(*d),
                        None => info,
                    }
                })
                .collect(),
        )
    }

    fn log_spec() -> ArgumentSpec {
        use ArgumentKind::*;
        spec(&[
            ("message", PositionalOrNamed, None),
            ("level", PositionalOrNamed, Some("INFO")),
            ("html", PositionalOrNamed, Some("False")),
        ])
    }

    #[rstest]
    #[case(&["hello"])]
    #[case(&["hello", "WARN"])]
    #[case(&["hello", "html=True"])]
    #[case(&["message=hello", "level=DEBUG"])]
    fn test_valid_calls(#[case] args: &[&str]) {
        assert!(log_spec().validate("Log", args).is_ok());
    }

    #[rstest]
    #[case(&[], "Keyword 'Log' expected 1 to 3 arguments, got 0.")]
    #[case(&["a", "b", "c", "d"], "Keyword 'Log' expected 1 to 3 arguments, got 4.")]
    #[case(&["a", "message=b"], "Keyword 'Log' got multiple values for argument 'message'.")]
    #[case(&["level=INFO"], "Keyword 'Log' missing value for argument 'message'.")]
    #[case(&["level=INFO", "x"], "Keyword 'Log' got positional argument after named arguments.")]
    fn test_invalid_calls(#[case] args: &[&str], #[case] message: &str) {
        assert_eq!(log_spec().validate("Log", args).unwrap_err(), message);
    }

    #[rstest]
    #[case(&["@{items}"])]
    #[case(&["&{options}"])]
    #[case(&["a", "b", "c", "d", "&{options}"])]
    #[case(&["level=INFO", "&{options}"])]
    fn test_expansion_skips_count_checks(#[case] args: &[&str]) {
        assert!(log_spec().validate("Log", args).is_ok());
    }

    #[test]
    fn test_unknown_name_is_positional_value() {
        let resolved = log_spec().validate("Log", &["foo=bar"]).unwrap();
        assert_eq!(resolved.positional, vec![(0, "foo=bar")]);
    }

    #[test]
    fn test_kwargs_make_every_equals_named() {
        use ArgumentKind::*;
        let spec = spec(&[("a", PositionalOrNamed, None), ("kwargs", VarNamed, None)]);
        let resolved = spec.validate("K", &["1", "x=2", "y=3"]).unwrap();
        assert_eq!(resolved.named.len(), 2);
        assert_eq!(
            spec.validate("K", &[]).unwrap_err(),
            "Keyword 'K' expected 1 non-named argument, got 0."
        );
    }

    #[test]
    fn test_varargs_and_named_only() {
        use ArgumentKind::*;
        let spec = spec(&[
            ("first", PositionalOrNamed, None),
            ("rest", VarPositional, None),
            ("b", NamedOnly, None),
            ("a", NamedOnly, None),
        ]);
        assert_eq!(
            spec.validate("K", &["1", "2", "3"]).unwrap_err(),
            "Keyword 'K' missing named-only arguments 'a' and 'b'."
        );
        assert!(spec.validate("K", &["1", "a=1", "b=2"]).is_ok());
        assert_eq!(
            spec.validate("K", &[]).unwrap_err(),
            "Keyword 'K' expected at least 1 non-named argument, got 0."
        );
    }

    #[test]
    fn test_positional_only_is_never_named() {
        use ArgumentKind::*;
        let spec = spec(&[("x", PositionalOnly, None), ("y", PositionalOrNamed, Some("1"))]);
        let resolved = spec.validate("K", &["x=1"]).unwrap();
        assert_eq!(resolved.positional.len(), 1);
    }

    #[test]
    fn test_list_variable_skips_count_checks() {
        assert!(log_spec().validate("Log", &["@{many}"]).is_ok());
        assert!(log_spec().validate("Log", &[]).is_err());
    }

    #[test]
    fn test_seq2str() {
        assert_eq!(seq2str(&["a"]), "'a'");
        assert_eq!(seq2str(&["a", "b", "c"]), "'a', 'b' and 'c'");
    }
}
