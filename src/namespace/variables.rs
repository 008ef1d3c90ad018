//! Variable definitions and scopes.

use std::fmt;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::base::constants::BUILTIN_VARIABLES;
use crate::base::{Location, Range};
use crate::library::{ArgumentInfo, ImportedVariable};
use crate::model::VariableMatcher;

/// Where a variable comes from, with the payload of that origin.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VariableKind {
    BuiltIn,
    /// `-v name:value` or a `--variablefile`.
    CommandLine,
    /// `*** Variables ***`, `Set Suite Variable`, `VAR scope=SUITE`.
    Suite,
    /// `Set Test Variable`, `VAR scope=TEST`.
    Test,
    Local,
    Argument { keyword: Arc<str> },
    EmbeddedArgument { keyword: Arc<str> },
    /// Defined by an imported resource or variable file.
    Imported { import: Arc<str> },
    Environment,
    /// Placeholder returned when a lookup fails.
    NotFound,
}

impl VariableKind {
    pub fn is_argument(&self) -> bool {
        matches!(self, VariableKind::Argument { .. } | VariableKind::EmbeddedArgument { .. })
    }
}

/// One definition of a variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VariableDefinition {
    pub kind: VariableKind,
    /// Full name, e.g. `${HOST}`.
    pub name: Arc<str>,
    /// Normalized base name; sigils and case do not matter.
    pub matcher: SmolStr,
    pub range: Range,
    pub source: Option<Arc<str>>,
    /// Literal value as written, when known.
    pub value: Option<Arc<str>>,
    /// Can the value be computed without running anything?
    pub resolvable: bool,
}

impl VariableDefinition {
    pub fn new(kind: VariableKind, name: &str, range: Range, source: Option<Arc<str>>) -> Self {
        Self {
            kind,
            name: Arc::from(name),
            matcher: VariableMatcher::new(name).normalized().clone(),
            range,
            source,
            value: None,
            resolvable: false,
        }
    }

    pub fn with_value(mut self, value: impl Into<Arc<str>>) -> Self {
        self.value = Some(value.into());
        self.resolvable = true;
        self
    }

    pub fn builtin(name: &str) -> Self {
        let mut definition = Self::new(VariableKind::BuiltIn, name, Range::zero(), None);
        definition.resolvable = true;
        definition
    }

    pub fn command_line(name: &str, value: &str) -> Self {
        Self::new(VariableKind::CommandLine, name, Range::zero(), None).with_value(value)
    }

    pub fn environment(name: &str) -> Self {
        let mut definition = Self::new(VariableKind::Environment, name, Range::zero(), None);
        definition.resolvable = true;
        definition
    }

    pub fn not_found(name: &str, range: Range, source: Option<Arc<str>>) -> Self {
        Self::new(VariableKind::NotFound, name, range, source)
    }

    /// A keyword argument as a variable of its body.
    pub fn argument(arg: &ArgumentInfo, keyword: &Arc<str>, source: Option<Arc<str>>) -> Self {
        Self::new(
            VariableKind::Argument {
                keyword: Arc::clone(keyword),
            },
            &arg.variable_name(),
            arg.range.unwrap_or_default(),
            source,
        )
    }

    /// A variable exported by a resource or variable file.
    pub fn imported(variable: &ImportedVariable, import: &Arc<str>) -> Self {
        let mut definition = Self::new(
            VariableKind::Imported {
                import: Arc::clone(import),
            },
            &variable.name,
            variable.range,
            variable.source.as_deref().map(Arc::from),
        );
        if let Some(value) = &variable.value {
            definition = definition.with_value(value.as_str());
        }
        definition
    }

    pub fn location(&self) -> Option<Location> {
        self.source
            .as_ref()
            .map(|source| Location::new(Arc::clone(source), self.range))
    }

    pub fn matches(&self, name: &str) -> bool {
        VariableMatcher::new(name).normalized() == &self.matcher
    }
}

impl fmt::Display for VariableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

static BUILTINS: LazyLock<Vec<Arc<VariableDefinition>>> = LazyLock::new(|| {
    BUILTIN_VARIABLES
        .iter()
        .map(|name| Arc::new(VariableDefinition::builtin(name)))
        .collect()
});

/// Variables the runtime always defines.
pub fn builtin_variables() -> &'static [Arc<VariableDefinition>] {
    &BUILTINS
}

// ============================================================================
// SCOPES
// ============================================================================

/// Definitions keyed by matcher, in definition order.
#[derive(Clone, Debug, Default)]
pub struct VariableScope {
    variables: IndexMap<SmolStr, Arc<VariableDefinition>>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the replaced definition.
    pub fn insert(&mut self, definition: Arc<VariableDefinition>) -> Option<Arc<VariableDefinition>> {
        self.variables.insert(definition.matcher.clone(), definition)
    }

    /// Insert unless a definition with the same matcher exists.
    pub fn insert_if_absent(&mut self, definition: Arc<VariableDefinition>) -> bool {
        match self.variables.entry(definition.matcher.clone()) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(definition);
                true
            }
        }
    }

    pub fn get(&self, matcher: &str) -> Option<&Arc<VariableDefinition>> {
        self.variables.get(matcher)
    }

    pub fn find(&self, name: &str) -> Option<&Arc<VariableDefinition>> {
        self.variables.get(VariableMatcher::new(name).normalized())
    }

    pub fn contains(&self, matcher: &str) -> bool {
        self.variables.contains_key(matcher)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<VariableDefinition>> {
        self.variables.values()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl FromIterator<Arc<VariableDefinition>> for VariableScope {
    fn from_iter<I: IntoIterator<Item = Arc<VariableDefinition>>>(iter: I) -> Self {
        let mut scope = Self::new();
        for definition in iter {
            scope.insert(definition);
        }
        scope
    }
}
