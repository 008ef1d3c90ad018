//! Domain constants: library tables, built-in variables, file extensions.

/// Name of the library every namespace imports implicitly.
pub const BUILTIN_LIBRARY_NAME: &str = "BuiltIn";

/// Libraries imported into every namespace without arguments.
pub const DEFAULT_LIBRARIES: &[&str] = &["BuiltIn", "Reserved", "Easter"];

/// `Reserved` disappeared in Robot Framework 7.
pub const RESERVED_LIBRARY_NAME: &str = "Reserved";

/// Libraries shipped with Robot Framework.
pub const STDLIBS: &[&str] = &[
    "BuiltIn",
    "Collections",
    "DateTime",
    "Dialogs",
    "Easter",
    "OperatingSystem",
    "Process",
    "Remote",
    "Reserved",
    "Screenshot",
    "String",
    "Telnet",
    "XML",
];

/// Is `name` a standard library that may lose a keyword conflict against a custom library?
pub fn is_standard_library(name: &str) -> bool {
    name != "Remote" && STDLIBS.contains(&name)
}

/// Variables always defined by the runtime.
pub const BUILTIN_VARIABLES: &[&str] = &[
    "${CURDIR}",
    "${EMPTY}",
    "@{EMPTY}",
    "&{EMPTY}",
    "${TEMPDIR}",
    "${EXECDIR}",
    "${/}",
    "${:}",
    "${\\n}",
    "${SPACE}",
    "${True}",
    "${False}",
    "${None}",
    "${null}",
    "${OPTIONS}",
    "${OUTPUT_DIR}",
    "${OUTPUT_FILE}",
    "${REPORT_FILE}",
    "${LOG_FILE}",
    "${DEBUG_FILE}",
    "${LOG_LEVEL}",
    "${PREV_TEST_NAME}",
    "${PREV_TEST_STATUS}",
    "${PREV_TEST_MESSAGE}",
    "${TEST_NAME}",
    "@{TEST_TAGS}",
    "${TEST_DOCUMENTATION}",
    "${TEST_STATUS}",
    "${TEST_MESSAGE}",
    "${SUITE_NAME}",
    "${SUITE_SOURCE}",
    "${SUITE_DOCUMENTATION}",
    "&{SUITE_METADATA}",
    "${SUITE_STATUS}",
    "${SUITE_MESSAGE}",
    "${KEYWORD_STATUS}",
    "${KEYWORD_MESSAGE}",
];

/// Keywords whose first argument is another keyword.
pub const RUN_KEYWORD_NAMES: &[&str] = &[
    "Run Keyword",
    "Run Keyword And Continue On Failure",
    "Run Keyword And Ignore Error",
    "Run Keyword And Return",
    "Run Keyword And Return Status",
    "Run Keyword If All Critical Tests Passed",
    "Run Keyword If All Tests Passed",
    "Run Keyword If Any Critical Tests Failed",
    "Run Keyword If Any Tests Failed",
    "Run Keyword If Test Failed",
    "Run Keyword If Test Passed",
    "Run Keyword If Timeout Occurred",
    "Run Keyword And Warn On Failure",
];

/// Keywords taking `n` leading arguments before the nested keyword.
pub const RUN_KEYWORD_WITH_CONDITION_NAMES: &[(&str, usize)] = &[
    ("Run Keyword And Expect Error", 1),
    ("Run Keyword And Return If", 1),
    ("Run Keyword Unless", 1),
    ("Repeat Keyword", 1),
    ("Wait Until Keyword Succeeds", 2),
];

pub const RUN_KEYWORD_IF_NAME: &str = "Run Keyword If";
pub const RUN_KEYWORDS_NAME: &str = "Run Keywords";
pub const SET_LIBRARY_SEARCH_ORDER_NAME: &str = "Set Library Search Order";

/// BuiltIn keywords whose first argument is a Python expression.
pub const BUILTIN_KEYWORDS_WITH_EXPRESSIONS: &[&str] = &[
    "Evaluate",
    "Should Be True",
    "Should Not Be True",
    "Skip If",
    "Continue For Loop If",
    "Exit For Loop If",
    "Return From Keyword If",
    "Run Keyword And Return If",
    "Pass Execution If",
];

/// BuiltIn keywords that create variables in a non-local scope, with that scope.
pub const SET_VARIABLE_KEYWORDS: &[(&str, VariableScopeName)] = &[
    ("Set Local Variable", VariableScopeName::Local),
    ("Set Test Variable", VariableScopeName::Test),
    ("Set Task Variable", VariableScopeName::Test),
    ("Set Suite Variable", VariableScopeName::Suite),
    ("Set Global Variable", VariableScopeName::Global),
];

/// Scope named by `VAR ... scope=` or a `Set * Variable` keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariableScopeName {
    Local,
    Test,
    Suite,
    Global,
}

impl VariableScopeName {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "LOCAL" => Some(Self::Local),
            "TEST" | "TASK" => Some(Self::Test),
            "SUITE" | "SUITES" => Some(Self::Suite),
            "GLOBAL" => Some(Self::Global),
            _ => None,
        }
    }
}

/// Extensions accepted for resource imports.
pub const RESOURCE_EXTENSIONS: &[&str] = &["resource", "robot", "txt", "tsv", "rst", "rest", "json"];

/// Extensions accepted for variable file imports.
pub const VARIABLES_EXTENSIONS: &[&str] = &["py", "yaml", "yml", "json"];

/// Name of the cache directory created below the workspace root.
pub const CACHE_DIR_NAME: &str = ".robotcode_cache";

/// Diagnostic `source` attached to everything the namespace reports.
pub const DIAGNOSTICS_SOURCE: &str = "robotcode.namespace";
