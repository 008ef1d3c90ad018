//! Variable definitions, scopes and variable diagnostics.

use rstest::rstest;

use rfcore::namespace::{Severity, VariableKind, codes};
use rfcore::{AnalysisConfig, Position};

use crate::helpers::diagnostic_helpers::{assert_no_diagnostics, render, with_code};
use crate::helpers::static_loader::StaticLoader;
use crate::helpers::workspace::TestWorkspace;

#[test]
fn test_command_line_variable_overrides_suite_variable() {
    let mut config = AnalysisConfig::default();
    config.variables.insert("TARGET".to_string(), "prod".to_string());
    let text = "\
*** Variables ***
${TARGET}    X

*** Test Cases ***
Case
    Log    ${TARGET}
";
    let ws = TestWorkspace::with_config(config, StaticLoader::standard(), &[("suite.robot", text)]);
    let namespace = ws.namespace("suite.robot");

    let diagnostics = namespace.get_diagnostics(&ws.cancel).unwrap();
    assert_eq!(diagnostics.len(), 1, "{}", render(&diagnostics));
    assert_eq!(diagnostics[0].code.as_deref(), Some(codes::OVERRIDDEN_BY_COMMAND_LINE));
    assert_eq!(diagnostics[0].severity, Severity::Hint);
    assert_eq!(diagnostics[0].range.start.line, 1);

    let definition = namespace
        .find_variable("${TARGET}", None, None, &ws.cancel)
        .unwrap()
        .expect("definition of ${TARGET}");
    assert_eq!(definition.kind, VariableKind::CommandLine);
    assert_eq!(definition.value.as_deref(), Some("prod"));
}

#[rstest]
#[case("    Log    %{RFCORE_TEST_SURELY_UNSET=fallback}\n", 0)]
#[case("    Log    %{FROM_CONFIG}\n", 0)]
#[case("    Log    %{RFCORE_TEST_SURELY_UNSET}\n", 1)]
fn test_environment_variables(#[case] body: &str, #[case] expected: usize) {
    let mut config = AnalysisConfig::default();
    config.env.insert("FROM_CONFIG".to_string(), "1".to_string());
    let text = format!("*** Test Cases ***\nCase\n{body}");
    let ws = TestWorkspace::with_config(config, StaticLoader::standard(), &[("suite.robot", &text)]);

    let diagnostics = ws.diagnostics("suite.robot");
    assert_eq!(diagnostics.len(), expected, "{}", render(&diagnostics));
    for diagnostic in &diagnostics {
        assert_eq!(diagnostic.code.as_deref(), Some(codes::ENVIRONMENT_VARIABLE_NOT_FOUND));
        assert_eq!(diagnostic.severity, Severity::Warning);
    }
}

#[test]
fn test_environment_variable_lookup() {
    let ws = TestWorkspace::new(&[("suite.robot", "*** Test Cases ***\nCase\n    No Operation\n")]);
    let definition = ws
        .namespace("suite.robot")
        .find_variable("%{PATH=x}", None, None, &ws.cancel)
        .unwrap()
        .expect("environment definition");
    assert_eq!(definition.kind, VariableKind::Environment);
}

#[rstest]
#[case("%{RFCORE_TEST_SURELY_UNSET}", false)]
#[case("%{RFCORE_TEST_SURELY_UNSET=fallback}", true)]
#[case("%{FROM_CONFIG}", true)]
fn test_environment_variable_definition_requires_a_value(#[case] name: &str, #[case] defined: bool) {
    let mut config = AnalysisConfig::default();
    config.env.insert("FROM_CONFIG".to_string(), "1".to_string());
    let ws = TestWorkspace::with_config(
        config,
        StaticLoader::standard(),
        &[("suite.robot", "*** Test Cases ***\nCase\n    No Operation\n")],
    );
    let definition = ws
        .namespace("suite.robot")
        .find_variable(name, None, None, &ws.cancel)
        .unwrap();
    assert_eq!(definition.is_some(), defined);
}

#[test]
fn test_template_rows_check_their_variables() {
    let text = "\
*** Test Cases ***
Greeting
    [Template]    Greet ${name}
    Ann ${undefined}

*** Keywords ***
Greet ${name}
    Log    ${name}
";
    let ws = TestWorkspace::new(&[("suite.robot", text)]);
    let diagnostics = ws.diagnostics("suite.robot");
    let missing = with_code(&diagnostics, codes::VARIABLE_NOT_FOUND);
    assert_eq!(missing.len(), 1, "{}", render(&diagnostics));
    assert_eq!(missing[0].range.start.line, 3);
    assert_eq!(missing[0].range.start.character, 8);
    assert!(with_code(&diagnostics, codes::KEYWORD_ERROR).is_empty());
}

#[test]
fn test_undefined_variable_is_an_error() {
    let ws = TestWorkspace::new(&[("suite.robot", "*** Test Cases ***\nCase\n    Log    ${undefined}\n")]);
    let diagnostics = ws.diagnostics("suite.robot");
    let missing = with_code(&diagnostics, codes::VARIABLE_NOT_FOUND);
    assert_eq!(missing.len(), 1, "{}", render(&diagnostics));
    assert_eq!(missing[0].severity, Severity::Error);
    assert_eq!(missing[0].range.start.character, 11);
}

#[rstest]
#[case("    Log    ${CURDIR}\n")]
#[case("    Log    ${EMPTY}\n")]
#[case("    Log    ${42}\n")]
#[case("    ${value}=    Evaluate    1 + 1\n    Log    ${value}\n")]
#[case("    Set Test Variable    ${dynamic}    1\n    Log    ${dynamic}\n")]
#[case("    VAR    ${declared}    1\n    Log    ${declared}\n")]
#[case("    FOR    ${i}    IN RANGE    3\n        Log    ${i}\n    END\n")]
fn test_defined_variables(#[case] body: &str) {
    let text = format!("*** Test Cases ***\nCase\n{body}");
    let ws = TestWorkspace::new(&[("suite.robot", &text)]);
    assert_no_diagnostics(&ws.diagnostics("suite.robot"));
}

#[test]
fn test_duplicate_suite_variable() {
    let text = "\
*** Variables ***
${A}    1
${A}    2

*** Test Cases ***
Case
    Log    ${A}
";
    let ws = TestWorkspace::new(&[("suite.robot", text)]);
    let diagnostics = ws.diagnostics("suite.robot");
    let duplicates = with_code(&diagnostics, codes::VARIABLE_ALREADY_DEFINED);
    assert_eq!(duplicates.len(), 1, "{}", render(&diagnostics));
    assert_eq!(duplicates[0].range.start.line, 2);
}

const LOCALS: &str = "\
*** Test Cases ***
Case
    Compute    1

*** Keywords ***
Compute
    [Arguments]    ${a}
    ${sum}=    Evaluate    ${a} + 1
    Log    ${sum}
";

#[test]
fn test_local_variables_are_visible_after_assignment() {
    let ws = TestWorkspace::new(&[("suite.robot", LOCALS)]);
    let namespace = ws.namespace("suite.robot");
    assert_no_diagnostics(&namespace.get_diagnostics(&ws.cancel).unwrap());

    let after = namespace
        .find_variable("${sum}", None, Some(Position::new(8, 4)), &ws.cancel)
        .unwrap()
        .expect("local after assignment");
    assert_eq!(after.kind, VariableKind::Local);

    let before = namespace
        .find_variable("${sum}", None, Some(Position::new(6, 4)), &ws.cancel)
        .unwrap();
    assert!(before.is_none());

    let argument = namespace
        .find_variable("${a}", None, Some(Position::new(8, 4)), &ws.cancel)
        .unwrap()
        .expect("argument");
    assert!(argument.kind.is_argument());
}

#[test]
fn test_variable_references_are_collected() {
    let ws = TestWorkspace::new(&[("suite.robot", LOCALS)]);
    let namespace = ws.namespace("suite.robot");

    let references = namespace.get_variable_references(&ws.cancel).unwrap();
    let sum = references
        .iter()
        .find(|(definition, _)| &*definition.name == "${sum}")
        .map(|(_, locations)| locations.len());
    assert_eq!(sum, Some(1));
}
