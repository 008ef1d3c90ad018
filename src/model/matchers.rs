//! Normalized names used for keyword and variable identity.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use smol_str::SmolStr;

use super::embedded::EmbeddedArguments;
use super::variables::{search_variable, ALL_IDENTIFIERS};

/// Lower-case `name` and drop whitespace and underscores.
pub fn normalize(name: &str) -> SmolStr {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Library and resource names ignore case and spaces but keep underscores.
pub fn normalize_namespace(name: &str) -> SmolStr {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn eq_namespace(a: &str, b: &str) -> bool {
    normalize_namespace(a) == normalize_namespace(b)
}

// ============================================================================
// KEYWORDS
// ============================================================================

/// Matches call names against a keyword name.
#[derive(Clone, Debug)]
pub struct KeywordMatcher {
    name: Arc<str>,
    normalized: SmolStr,
    embedded: Option<EmbeddedArguments>,
}

impl KeywordMatcher {
    pub fn new(name: &str) -> Self {
        Self::with_embedded(name, true)
    }

    /// A matcher that treats `${...}` in the name literally.
    pub fn literal(name: &str) -> Self {
        Self::with_embedded(name, false)
    }

    fn with_embedded(name: &str, can_have_embedded: bool) -> Self {
        let embedded = if can_have_embedded {
            EmbeddedArguments::from_name(name).and_then(Result::ok)
        } else {
            None
        };
        Self {
            name: Arc::from(name),
            normalized: normalize(name),
            embedded,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn normalized(&self) -> &SmolStr {
        &self.normalized
    }

    pub fn is_embedded(&self) -> bool {
        self.embedded.is_some()
    }

    pub fn embedded(&self) -> Option<&EmbeddedArguments> {
        self.embedded.as_ref()
    }

    /// Does a call written as `name` refer to this keyword?
    pub fn matches(&self, name: &str) -> bool {
        match &self.embedded {
            Some(embedded) => embedded.matches(name),
            None => normalize(name) == self.normalized,
        }
    }
}

impl PartialEq for KeywordMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized && self.is_embedded() == other.is_embedded()
    }
}

impl Eq for KeywordMatcher {}

impl Hash for KeywordMatcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
        self.is_embedded().hash(state);
    }
}

// ============================================================================
// VARIABLES
// ============================================================================

/// Identity of a variable name; `${x}`, `@{X}` and `&{_x_}` are equal.
#[derive(Clone, Debug)]
pub struct VariableMatcher {
    name: Arc<str>,
    normalized: SmolStr,
}

impl VariableMatcher {
    pub fn new(name: &str) -> Self {
        let normalized = match search_variable(name, ALL_IDENTIFIERS, true) {
            Ok(m) if m.is_variable() => m.matcher(),
            _ => normalize(name),
        };
        Self {
            name: Arc::from(name),
            normalized,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn normalized(&self) -> &SmolStr {
        &self.normalized
    }

    pub fn matches(&self, name: &str) -> bool {
        VariableMatcher::new(name).normalized == self.normalized
    }
}

impl PartialEq for VariableMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for VariableMatcher {}

impl Hash for VariableMatcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Open Browser", "open_browser")]
    #[case("OPEN BROWSER", "openbrowser")]
    #[case("Öffne Datei", "öffne datei")]
    fn test_keyword_names_match_ignoring_case_space_underscore(#[case] a: &str, #[case] b: &str) {
        let ma = KeywordMatcher::new(a);
        let mb = KeywordMatcher::new(b);
        assert!(ma.matches(b));
        assert!(mb.matches(a));
        assert_eq!(ma, mb);
    }

    #[test]
    fn test_namespace_keeps_underscores() {
        assert!(eq_namespace("My Lib", "mylib"));
        assert!(!eq_namespace("my_lib", "mylib"));
    }

    #[test]
    fn test_embedded_matcher_uses_pattern() {
        let matcher = KeywordMatcher::new("Open ${page} Page");
        assert!(matcher.is_embedded());
        assert!(matcher.matches("open login page"));
        assert!(!matcher.matches("open login"));
        assert!(!KeywordMatcher::literal("Open ${page} Page").is_embedded());
    }

    #[test]
    fn test_variable_matcher_ignores_sigil() {
        assert_eq!(VariableMatcher::new("${My Var}"), VariableMatcher::new("@{my_var}"));
        assert!(VariableMatcher::new("&{MYVAR}").matches("${my var}"));
        assert_ne!(VariableMatcher::new("${a}"), VariableMatcher::new("${b}"));
    }
}
