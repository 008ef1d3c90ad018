//! Finding `${var}`, `@{list}`, `&{dict}` and `%{ENV}` inside cell values.
//!
//! Offsets are byte offsets into the searched string. All markers the
//! search looks at are ASCII, so every offset lies on a char boundary.

use std::fmt;

use smol_str::SmolStr;
use thiserror::Error;

use super::matchers::normalize;

/// Identifiers recognised by default.
pub const ALL_IDENTIFIERS: &str = "$@&%";

/// A variable could not be parsed, e.g. it was not closed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct VariableError(pub String);

/// One variable occurrence found in a string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableMatch<'a> {
    pub string: &'a str,
    pub identifier: Option<char>,
    /// Text between the braces.
    pub base: Option<&'a str>,
    /// Texts between `[` and `]` following the variable.
    pub items: Vec<&'a str>,
    pub start: usize,
    pub end: usize,
}

impl<'a> VariableMatch<'a> {
    fn none(string: &'a str) -> Self {
        Self {
            string,
            identifier: None,
            base: None,
            items: Vec::new(),
            start: 0,
            end: 0,
        }
    }

    pub fn is_found(&self) -> bool {
        self.identifier.is_some() && self.base.is_some()
    }

    /// The whole string is one variable.
    pub fn is_variable(&self) -> bool {
        self.is_found() && self.start == 0 && self.end == self.string.len()
    }

    /// Variable name without items, e.g. `${x}` for `${x}[0]`.
    pub fn name(&self) -> String {
        match (self.identifier, self.base) {
            (Some(id), Some(base)) => format!("{id}{{{base}}}"),
            _ => String::new(),
        }
    }

    /// Byte offset where the name part (without items) ends.
    pub fn name_end(&self) -> usize {
        match self.base {
            Some(base) => self.start + base.len() + 3,
            None => self.end,
        }
    }

    pub fn before(&self) -> &'a str {
        &self.string[..self.start]
    }

    pub fn matched(&self) -> &'a str {
        &self.string[self.start..self.end]
    }

    pub fn after(&self) -> &'a str {
        &self.string[self.end..]
    }

    /// Byte offset of `base` within the searched string.
    pub fn base_start(&self) -> usize {
        self.start + 2
    }

    /// Normalized lookup key: identifier and items ignored.
    pub fn matcher(&self) -> SmolStr {
        normalize(self.base.unwrap_or(""))
    }

    pub fn is_assign(&self, allow_assign_mark: bool, allow_items: bool) -> bool {
        if allow_assign_mark && self.string.ends_with('=') {
            let trimmed = self.string[..self.string.len() - 1].trim_end();
            return search_variable(trimmed, ALL_IDENTIFIERS, true)
                .map(|m| m.is_assign(false, allow_items))
                .unwrap_or(false);
        }
        self.is_variable()
            && matches!(self.identifier, Some('$' | '@' | '&'))
            && (allow_items || self.items.is_empty())
            && self
                .base
                .is_some_and(|b| !search_variable(b, ALL_IDENTIFIERS, true).is_ok_and(|m| m.is_found()))
    }

    /// Inline Python evaluation `${{ expression }}`.
    pub fn is_inline_expression(&self) -> bool {
        self.identifier == Some('$')
            && self
                .base
                .is_some_and(|b| b.len() >= 2 && b.starts_with('{') && b.ends_with('}'))
    }
}

impl fmt::Display for VariableMatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.matched())
    }
}

fn not_escaped(bytes: &[u8], mut index: usize) -> bool {
    let mut escaped = false;
    while index > 0 && bytes[index - 1] == b'\\' {
        index -= 1;
        escaped = !escaped;
    }
    !escaped
}

fn find_variable_start(string: &str, identifiers: &str) -> Option<usize> {
    let bytes = string.as_bytes();
    string
        .match_indices('{')
        .filter(|(brace, _)| *brace > 0)
        .map(|(brace, _)| brace - 1)
        .find(|&index| {
            bytes[index].is_ascii() && identifiers.contains(bytes[index] as char) && not_escaped(bytes, index)
        })
}

/// Find the first variable in `string`.
///
/// With `ignore_errors`, an unclosed variable yields "no match" instead of an error.
pub fn search_variable<'a>(
    string: &'a str,
    identifiers: &str,
    ignore_errors: bool,
) -> Result<VariableMatch<'a>, VariableError> {
    let Some(var_start) = find_variable_start(string, identifiers) else {
        return Ok(VariableMatch::none(string));
    };
    let bytes = string.as_bytes();
    let mut result = VariableMatch {
        string,
        identifier: Some(bytes[var_start] as char),
        base: None,
        items: Vec::new(),
        start: var_start,
        end: 0,
    };

    let (mut left, mut right) = (b'{', b'}');
    let mut open_braces = 1;
    let mut escaped = false;
    let mut item_start = var_start;
    let mut index = var_start + 2;
    let mut closed = false;

    while index < bytes.len() {
        let ch = bytes[index];
        if ch == right && !escaped {
            open_braces -= 1;
            if open_braces == 0 {
                let next = bytes.get(index + 1).copied();
                if left == b'{' {
                    result.base = Some(&string[var_start + 2..index]);
                    if !matches!(result.identifier, Some('$' | '@' | '&')) || next != Some(b'[') {
                        result.end = index + 1;
                        closed = true;
                        break;
                    }
                    left = b'[';
                    right = b']';
                } else {
                    result.items.push(&string[item_start + 1..index]);
                    if next != Some(b'[') {
                        result.end = index + 1;
                        closed = true;
                        break;
                    }
                }
                // skip the '[' that starts the next item
                index += 1;
                item_start = index;
                open_braces = 1;
            }
        } else if ch == left && !escaped {
            open_braces += 1;
        } else {
            escaped = ch == b'\\' && !escaped;
        }
        index += 1;
    }

    if !closed {
        if ignore_errors {
            return Ok(VariableMatch::none(string));
        }
        let incomplete = &string[var_start..];
        return Err(if left == b'{' {
            VariableError(format!("Variable '{incomplete}' was not closed properly."))
        } else {
            VariableError(format!("Variable item '{incomplete}' was not closed properly."))
        });
    }
    Ok(result)
}

/// Every variable of `string`, left to right, with absolute offsets.
pub fn variable_matches<'a>(string: &'a str, identifiers: &str) -> Vec<VariableMatch<'a>> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < string.len() {
        let rest = &string[offset..];
        let Ok(found) = search_variable(rest, identifiers, true) else {
            break;
        };
        if !found.is_found() {
            break;
        }
        let next = offset + found.end;
        out.push(VariableMatch {
            string,
            identifier: found.identifier,
            base: found.base,
            items: found.items,
            start: offset + found.start,
            end: next,
        });
        offset = next;
    }
    out
}

pub fn contains_variable(string: &str) -> bool {
    search_variable(string, ALL_IDENTIFIERS, true).is_ok_and(|m| m.is_found())
}

pub fn is_variable(string: &str) -> bool {
    search_variable(string, ALL_IDENTIFIERS, true).is_ok_and(|m| m.is_variable())
}

pub fn is_scalar_variable(string: &str) -> bool {
    search_variable(string, "$", true)
        .is_ok_and(|m| m.is_variable() && m.items.is_empty())
}

pub fn is_list_variable(string: &str) -> bool {
    search_variable(string, "@", true).is_ok_and(|m| m.is_variable() && m.items.is_empty())
}

pub fn is_dict_variable(string: &str) -> bool {
    search_variable(string, "&", true).is_ok_and(|m| m.is_variable() && m.items.is_empty())
}

/// `${x}`, `${x}=` or `${x} =` usable on the left side of an assignment.
pub fn is_assign(string: &str, allow_assign_mark: bool, allow_items: bool) -> bool {
    search_variable(string, ALL_IDENTIFIERS, true)
        .is_ok_and(|m| m.is_assign(allow_assign_mark, allow_items))
}

/// Strip a trailing `=` (and the spaces before it) from an assignment target.
pub fn strip_assign_mark(string: &str) -> &str {
    match string.strip_suffix('=') {
        Some(rest) => rest.trim_end(),
        None => string,
    }
}

/// `${1}`, `${-2.5}`, `${0x1F}`, `${1_000}` and friends.
pub fn is_number_literal(base: &str) -> bool {
    let s = base.trim().replace('_', "");
    let s = s.strip_prefix(['-', '+']).unwrap_or(&s);
    if s.is_empty() {
        return false;
    }
    let lower = s.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    if let Some(oct) = lower.strip_prefix("0o") {
        return !oct.is_empty() && oct.chars().all(|c| ('0'..='7').contains(&c));
    }
    if let Some(bin) = lower.strip_prefix("0b") {
        return !bin.is_empty() && bin.chars().all(|c| c == '0' || c == '1');
    }
    lower.parse::<f64>().is_ok() && lower.chars().any(|c| c.is_ascii_digit())
}

/// Replace every variable in `string` using `lookup`, which receives the
/// identifier and the text between the braces. Returns the name of the
/// first variable `lookup` could not resolve.
pub fn replace_variables<F>(string: &str, mut lookup: F) -> Result<String, String>
where
    F: FnMut(char, &str) -> Option<String>,
{
    replace_with(string, &mut lookup)
}

type Lookup<'l> = dyn FnMut(char, &str) -> Option<String> + 'l;

fn replace_with(string: &str, lookup: &mut Lookup<'_>) -> Result<String, String> {
    let mut out = String::new();
    let mut rest = string;
    loop {
        let found = match search_variable(rest, ALL_IDENTIFIERS, true) {
            Ok(m) if m.is_found() => m,
            _ => break,
        };
        out.push_str(found.before());
        let identifier = found.identifier.unwrap_or('$');
        let base = found.base.unwrap_or("");

        // Nested variables are resolved first: ${name_${i}}
        let resolved_base = if contains_variable(base) {
            replace_with(base, lookup)?
        } else {
            base.to_string()
        };

        match lookup(identifier, &resolved_base) {
            Some(value) => out.push_str(&value),
            None => return Err(found.name()),
        }
        for item in &found.items {
            out.push('[');
            out.push_str(item);
            out.push(']');
        }
        rest = found.after();
    }
    out.push_str(rest);
    Ok(out)
}

/// Split `name=value` at the first unescaped `=` outside variables.
pub fn split_from_equals(string: &str) -> (&str, Option<&str>) {
    if !string.contains('=') {
        return (string, None);
    }
    let mut offset = 0;
    for found in variable_matches(string, ALL_IDENTIFIERS) {
        if let Some(index) = find_split_index(&string[offset..found.start]) {
            let at = offset + index;
            return (&string[..at], Some(&string[at + 1..]));
        }
        offset = found.end;
    }
    match find_split_index(&string[offset..]) {
        Some(index) => {
            let at = offset + index;
            (&string[..at], Some(&string[at + 1..]))
        }
        None => (string, None),
    }
}

fn find_split_index(string: &str) -> Option<usize> {
    let bytes = string.as_bytes();
    let mut from = 0;
    while let Some(pos) = string[from..].find('=') {
        let index = from + pos;
        if not_escaped(bytes, index) {
            return Some(index);
        }
        from = index + 1;
    }
    None
}
