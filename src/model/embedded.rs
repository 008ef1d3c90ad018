//! Keyword names with embedded arguments, such as `Number ${n:\d+}`.

use regex::Regex;

use super::variables::variable_matches;

const DEFAULT_PATTERN: &str = ".*?";
const VARIABLE_PATTERN: &str = r"\$\{[^}]+\}";

/// Compiled embedded-argument pattern of a keyword name.
#[derive(Clone, Debug)]
pub struct EmbeddedArguments {
    /// Argument names in order, without sigil and custom pattern.
    pub args: Vec<String>,
    pub has_custom_patterns: bool,
    regex: Regex,
}

impl PartialEq for EmbeddedArguments {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str()
    }
}

impl Eq for EmbeddedArguments {}

impl EmbeddedArguments {
    /// Parse `name`. `None` when the name has no `${...}` placeholders.
    pub fn from_name(name: &str) -> Option<Result<Self, String>> {
        let matches = variable_matches(name, "$");
        if matches.is_empty() {
            return None;
        }

        let mut args = Vec::new();
        let mut has_custom_patterns = false;
        let mut pattern = String::from("(?i)^");
        let mut offset = 0;
        for found in &matches {
            let base = found.base.unwrap_or("");
            let (arg, custom) = match base.split_once(':') {
                Some((arg, custom)) => (arg.trim(), Some(custom.trim())),
                None => (base, None),
            };
            args.push(arg.to_string());
            pattern.push_str(&regex::escape(&name[offset..found.start]));
            match custom {
                Some(custom) => {
                    has_custom_patterns = true;
                    match format_custom_pattern(custom) {
                        Ok(p) => pattern.push_str(&format!("({p}|{VARIABLE_PATTERN})")),
                        Err(e) => return Some(Err(e)),
                    }
                }
                None => pattern.push_str(&format!("({DEFAULT_PATTERN})")),
            }
            offset = found.end;
        }
        pattern.push_str(&regex::escape(&name[offset..]));
        pattern.push('$');

        Some(match Regex::new(&pattern) {
            Ok(regex) => Ok(Self {
                args,
                has_custom_patterns,
                regex,
            }),
            Err(e) => Err(format!(
                "Compiling embedded arguments regexp failed: {e}"
            )),
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Values captured for each argument, or `None` when `name` does not match.
    pub fn captures(&self, name: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(name)?;
        Some(
            (1..caps.len())
                .map(|i| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

/// Custom patterns must not define their own groups or extensions.
fn format_custom_pattern(pattern: &str) -> Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            // escaped characters, including `\(`, are copied verbatim
            out.push('\\');
            if let Some(next) = chars.get(i + 1) {
                out.push(*next);
            }
            i += 2;
            continue;
        }
        if c == '(' {
            if chars.get(i + 1) == Some(&'?') {
                return Err("Regexp extensions are not allowed in embedded arguments.".to_string());
            }
            out.push_str("(?:");
            i += 1;
            continue;
        }
        out.push(c);
        i += 1;
    }
    Ok(out)
}
