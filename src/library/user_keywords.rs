//! Descriptors of resource and suite files, built from their model.

use rustc_hash::FxHashSet;

use super::arguments::{ArgumentInfo, ArgumentKind, ArgumentSpec};
use super::doc::{ImportedVariable, KeywordDoc, LibraryDoc, LibraryError, LibraryKind};
use crate::model::variables::{search_variable, strip_assign_mark};
use crate::model::{Definition, EmbeddedArguments, File, StatementKind, Token, TokenKind, normalize};

const PRIVATE_TAG: &str = "robot:private";

/// Build the [`LibraryDoc`] of a resource or suite file.
pub fn library_doc_from_model(file: &File, kind: LibraryKind, name: &str) -> LibraryDoc {
    let mut doc = LibraryDoc::new(name, kind);
    doc.source = Some(file.source.to_string());
    doc.import_count = file.imports().count();
    doc.doc = file
        .setting(StatementKind::Documentation)
        .map(joined_arguments)
        .unwrap_or_default();

    if kind == LibraryKind::Resource && file.has_tests() {
        doc.errors.push(
            LibraryError::new("Resource file with 'Test Cases' section is invalid.")
                .with_source(file.source.to_string(), None),
        );
    }

    let keyword_tags: Vec<String> = file
        .setting(StatementKind::KeywordTags)
        .map(|s| s.get_tokens(TokenKind::Argument).map(|t| t.value.clone()).collect())
        .unwrap_or_default();

    let mut seen = FxHashSet::default();
    let mut keywords = Vec::new();
    for definition in file.keywords() {
        let Some(mut keyword) = keyword_doc(file, definition, name, &keyword_tags) else {
            continue;
        };
        let identity = (
            keyword.matcher().normalized().clone(),
            keyword.is_embedded(),
        );
        if !seen.insert(identity) && keyword.error.is_none() {
            keyword.error = Some("Keyword with same name defined multiple times.".to_string());
        }
        keywords.push(keyword);
    }
    doc = doc.with_keywords(keywords);

    doc.variables = file
        .variables()
        .filter(|s| s.errors.is_empty())
        .filter_map(|statement| {
            let token = statement.get_token(TokenKind::Variable)?;
            let values: Vec<&str> = statement
                .get_tokens(TokenKind::Argument)
                .map(|t| t.value.as_str())
                .collect();
            Some(ImportedVariable {
                name: strip_assign_mark(&token.value).to_string(),
                value: Some(values.join(" ")),
                source: Some(file.source.to_string()),
                range: token.range(),
            })
        })
        .collect();

    doc
}

fn joined_arguments(statement: &crate::model::Statement) -> String {
    statement
        .get_tokens(TokenKind::Argument)
        .map(|t| t.value.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn keyword_doc(
    file: &File,
    definition: &Definition,
    library: &str,
    keyword_tags: &[String],
) -> Option<KeywordDoc> {
    let name_token = definition.name_token()?;
    if name_token.value.trim().is_empty() {
        return None;
    }

    let mut tags: Vec<String> = definition
        .setting(StatementKind::Tags)
        .map(|s| s.get_tokens(TokenKind::Argument).map(|t| t.value.clone()).collect())
        .unwrap_or_default();
    tags.extend(keyword_tags.iter().cloned());

    let mut keyword = KeywordDoc::new(name_token.value.clone(), library)
        .with_source(file.source.to_string(), name_token.range())
        .with_doc(
            definition
                .setting(StatementKind::Documentation)
                .map(joined_arguments)
                .unwrap_or_default(),
        );
    keyword.is_private = tags.iter().any(|t| normalize(t) == PRIVATE_TAG);
    keyword.tags = tags;

    let argument_tokens: Vec<&Token> = definition
        .setting(StatementKind::Arguments)
        .map(|s| s.get_tokens(TokenKind::Argument).collect())
        .unwrap_or_default();

    match EmbeddedArguments::from_name(&name_token.value) {
        Some(Err(error)) => keyword.error = Some(error),
        Some(Ok(_)) if !argument_tokens.is_empty() => {
            keyword.error =
                Some("Keyword cannot have both normal and embedded arguments.".to_string());
        }
        Some(Ok(_)) => {}
        None => {
            let (spec, error) = parse_user_arguments(&argument_tokens);
            keyword.args = spec;
            keyword.error = error;
        }
    }
    Some(keyword)
}

/// Parse the cells of an `[Arguments]` setting.
///
/// Parsing stops at the first error; the arguments read so far are kept.
pub fn parse_user_arguments(tokens: &[&Token]) -> (ArgumentSpec, Option<String>) {
    let mut args = Vec::new();
    let mut seen_default = false;
    let mut named_only = false;
    let mut seen_kwargs = false;

    for token in tokens {
        let value = token.value.as_str();
        let fail = |args: Vec<ArgumentInfo>, message: String| (ArgumentSpec::new(args), Some(message));
        let invalid = || format!("Invalid argument syntax '{value}'.");

        if seen_kwargs {
            return fail(args, "Only last argument can be kwargs.".to_string());
        }
        if value == "@{}" {
            if named_only {
                return fail(args, "Cannot have multiple varargs.".to_string());
            }
            named_only = true;
            args.push(ArgumentInfo::new("", ArgumentKind::NamedOnlyMarker));
            continue;
        }

        let found = match search_variable(value, "$@&", true) {
            Ok(found) if found.is_found() && found.start == 0 && found.items.is_empty() => found,
            _ => return fail(args, invalid()),
        };
        let default = match found.after() {
            "" => None,
            rest => match rest.strip_prefix('=') {
                Some(default) => Some(default),
                None => return fail(args, invalid()),
            },
        };
        let base = found.base.unwrap_or("");
        let (name, types) = match base.split_once(':') {
            Some((name, ty)) => (name.trim(), vec![ty.trim().to_string()]),
            None => (base, Vec::new()),
        };
        if name.is_empty() {
            return fail(args, invalid());
        }
        let range = token.slice(TokenKind::Variable, 0, found.end).range();

        let kind = match found.identifier {
            Some('$') if named_only => ArgumentKind::NamedOnly,
            Some('$') if default.is_some() => {
                seen_default = true;
                ArgumentKind::PositionalOrNamed
            }
            Some('$') if seen_default => {
                return fail(args, "Non-default argument after default arguments.".to_string());
            }
            Some('$') => ArgumentKind::PositionalOrNamed,
            Some('@') if default.is_none() => {
                if named_only {
                    return fail(args, "Cannot have multiple varargs.".to_string());
                }
                named_only = true;
                ArgumentKind::VarPositional
            }
            Some('&') if default.is_none() => {
                seen_kwargs = true;
                ArgumentKind::VarNamed
            }
            _ => return fail(args, invalid()),
        };

        let mut info = ArgumentInfo::new(name, kind).with_range(range);
        info.types = types;
        info.default = default.map(str::to_string);
        args.push(info);
    }
    (ArgumentSpec::new(args), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse;

    fn tokens(values: &[&str]) -> Vec<Token> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Token::new(TokenKind::Argument, *v, 0, i as u32 * 10))
            .collect()
    }

    fn parse_args(values: &[&str]) -> (ArgumentSpec, Option<String>) {
        let tokens = tokens(values);
        let refs: Vec<&Token> = tokens.iter().collect();
        parse_user_arguments(&refs)
    }

    #[test]
    fn test_argument_kinds() {
        let (spec, error) = parse_args(&["${a}", "${b}=1", "@{rest}", "${named}", "&{kwargs}"]);
        assert!(error.is_none());
        let kinds: Vec<_> = spec.args.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ArgumentKind::PositionalOrNamed,
                ArgumentKind::PositionalOrNamed,
                ArgumentKind::VarPositional,
                ArgumentKind::NamedOnly,
                ArgumentKind::VarNamed
            ]
        );
        assert_eq!(spec.args[1].default.as_deref(), Some("1"));
        assert_eq!(spec.minargs(), 1);
        assert_eq!(spec.maxargs(), None);
    }

    #[test]
    fn test_argument_errors() {
        assert_eq!(
            parse_args(&["${a}=1", "${b}"]).1.as_deref(),
            Some("Non-default argument after default arguments.")
        );
        assert_eq!(
            parse_args(&["@{a}", "@{b}"]).1.as_deref(),
            Some("Cannot have multiple varargs.")
        );
        assert_eq!(
            parse_args(&["&{a}", "${b}"]).1.as_deref(),
            Some("Only last argument can be kwargs.")
        );
        assert_eq!(
            parse_args(&["name"]).1.as_deref(),
            Some("Invalid argument syntax 'name'.")
        );
    }

    #[test]
    fn test_argument_range_covers_variable_only() {
        let (spec, _) = parse_args(&["${a}", "${b}=default"]);
        assert_eq!(spec.args[1].range.map(|r| (r.start.character, r.end.character)), Some((10, 14)));
    }

    #[test]
    fn test_resource_doc() {
        let file = parse(
            "/ws/common.resource",
            "*** Settings ***\n\
             Keyword Tags    shared\n\
             \n\
             *** Variables ***\n\
             ${HOST}    localhost\n\
             \n\
             *** Keywords ***\n\
             Open ${page} Page\n\
             \x20   Log    ${page}\n\
             Helper\n\
             \x20   [Tags]    robot:private\n\
             \x20   [Documentation]    *DEPRECATED* gone\n\
             \x20   No Operation\n\
             helper\n\
             \x20   No Operation\n",
        );
        let doc = library_doc_from_model(&file, LibraryKind::Resource, "common");
        assert_eq!(doc.keywords.len(), 3);
        assert!(doc.keywords[0].is_embedded());
        assert!(doc.keywords[1].is_private);
        assert!(doc.keywords[1].deprecated);
        assert!(doc.keywords[1].tags.contains(&"shared".to_string()));
        assert_eq!(
            doc.keywords[2].error.as_deref(),
            Some("Keyword with same name defined multiple times.")
        );
        assert_eq!(doc.variables.len(), 1);
        assert_eq!(doc.variables[0].name, "${HOST}");
        assert_eq!(doc.variables[0].value.as_deref(), Some("localhost"));
        assert!(!doc.is_empty());
    }

    #[test]
    fn test_resource_with_tests_is_invalid() {
        let file = parse("/ws/bad.resource", "*** Test Cases ***\nT\n    No Operation\n");
        let doc = library_doc_from_model(&file, LibraryKind::Resource, "bad");
        assert!(doc.has_errors());
    }
}
