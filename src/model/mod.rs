//! # Document Model
//!
//! Tokens, statements and blocks of a Robot Framework document, plus the
//! helpers every semantic layer shares: variable search, name matchers,
//! embedded-argument patterns, expression scanning and BDD prefixes.

pub mod ast;
pub mod embedded;
pub mod expressions;
pub mod languages;
pub mod matchers;
mod parse;
pub mod tokens;
pub mod variables;

pub use ast::{
    Block, BlockKind, BodyItem, Definition, File, Section, SectionKind, Statement, StatementKind,
};
pub use embedded::EmbeddedArguments;
pub use expressions::{ExpressionVariable, expression_variables};
pub use languages::{Language, Languages};
pub use matchers::{KeywordMatcher, VariableMatcher, eq_namespace, normalize, normalize_namespace};
pub use parse::{parse, section_header_kind};
pub use tokens::{Token, TokenKind};
pub use variables::{
    VariableError, VariableMatch, contains_variable, is_assign, is_variable, search_variable,
    split_from_equals,
};
