//! Keyword resolution through the namespace and the analyzer.

use rstest::rstest;

use rfcore::Error;
use rfcore::namespace::{Severity, codes};

use crate::helpers::diagnostic_helpers::{assert_no_diagnostics, codes as codes_of, render, with_code};
use crate::helpers::workspace::TestWorkspace;

fn suite(body: &str) -> String {
    format!("*** Test Cases ***\nCase\n{body}")
}

#[test]
fn test_keyword_not_found() {
    let ws = TestWorkspace::new(&[("suite.robot", &suite("    Lgo To    url\n"))]);
    let diagnostics = ws.diagnostics("suite.robot");

    assert_eq!(diagnostics.len(), 1, "{}", render(&diagnostics));
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(diagnostic.code.as_deref(), Some(codes::KEYWORD_NOT_FOUND));
    assert!(diagnostic.message.contains("Lgo To"));
    assert_eq!(diagnostic.range.start.line, 2);
    assert_eq!(diagnostic.range.start.character, 4);
    assert_eq!(diagnostic.range.end.character, 10);
}

#[test]
fn test_run_keyword_if_resolves_nested_keywords() {
    let text = "\
*** Variables ***
${x}    1

*** Test Cases ***
Case
    Run Keyword If    ${x}>0    Log    hi    ELSE    Log    bye
";
    let ws = TestWorkspace::new(&[("suite.robot", text)]);
    let namespace = ws.namespace("suite.robot");
    assert_no_diagnostics(&namespace.get_diagnostics(&ws.cancel).unwrap());

    let references = namespace.get_keyword_references(&ws.cancel).unwrap();
    let log = references
        .values()
        .find(|r| r.keyword.name == "Log")
        .expect("references of Log");
    assert_eq!(log.locations.len(), 2);
    assert!(log.locations.iter().all(|l| l.range.start.line == 5));
    assert_ne!(log.locations[0].range, log.locations[1].range);
}

#[rstest]
#[case("    Run Keywords    Log    a    AND    No Operation\n")]
#[case("    Run Keyword    Log    message\n")]
#[case("    Run Keywords    No Operation    No Operation\n")]
fn test_run_keyword_variants(#[case] body: &str) {
    let ws = TestWorkspace::new(&[("suite.robot", &suite(body))]);
    assert_no_diagnostics(&ws.diagnostics("suite.robot"));
}

#[test]
fn test_run_keyword_with_unknown_nested_keyword() {
    let ws = TestWorkspace::new(&[("suite.robot", &suite("    Run Keyword    Unknown Thing\n"))]);
    let diagnostics = ws.diagnostics("suite.robot");
    let missing = with_code(&diagnostics, codes::KEYWORD_NOT_FOUND);
    assert_eq!(missing.len(), 1, "{}", render(&diagnostics));
    assert_eq!(missing[0].range.start.character, 19);
}

const EMBEDDED: &str = "\
*** Variables ***
${x}    5

*** Test Cases ***
Numbers
    Number 5
    Number 7
    Number ${x}

*** Keywords ***
Number ${n}
    Log    ${n}

Number 5
    No Operation
";

#[test]
fn test_embedded_arguments_tie_break() {
    let ws = TestWorkspace::new(&[("suite.robot", EMBEDDED)]);
    let namespace = ws.namespace("suite.robot");

    let diagnostics = namespace.get_diagnostics(&ws.cancel).unwrap();
    assert!(with_code(&diagnostics, codes::MULTIPLE_KEYWORDS).is_empty(), "{}", render(&diagnostics));
    assert_no_diagnostics(&diagnostics);

    let resolve = |name: &str| {
        namespace
            .find_keyword(name, false, true, &ws.cancel)
            .unwrap()
            .map(|k| k.name.clone())
    };
    assert_eq!(resolve("Number 5").as_deref(), Some("Number 5"));
    assert_eq!(resolve("Number 7").as_deref(), Some("Number ${n}"));
    assert_eq!(resolve("Number ${x}").as_deref(), Some("Number ${n}"));
}

#[test]
fn test_bdd_prefix_is_stripped() {
    let text = "\
*** Test Cases ***
Scenario
    Given log in

*** Keywords ***
Log In
    No Operation
";
    let ws = TestWorkspace::new(&[("suite.robot", text)]);
    let namespace = ws.namespace("suite.robot");
    assert_no_diagnostics(&namespace.get_diagnostics(&ws.cancel).unwrap());

    let lookup = namespace.keyword_lookup("Given log in", true, &ws.cancel).unwrap();
    assert_eq!(lookup.keyword.map(|k| k.name.clone()).as_deref(), Some("Log In"));
    assert_eq!(lookup.bdd_prefix.as_deref(), Some("Given "));
}

#[test]
fn test_empty_keyword_name() {
    let ws = TestWorkspace::new(&[("suite.robot", &suite("    No Operation\n"))]);
    let namespace = ws.namespace("suite.robot");

    let lookup = namespace.keyword_lookup("", true, &ws.cancel).unwrap();
    assert!(lookup.keyword.is_none());
    assert_eq!(lookup.diagnostics.len(), 1);
    assert_eq!(lookup.diagnostics[0].code, codes::KEYWORD_NAME_EMPTY);

    assert!(matches!(
        namespace.find_keyword("  ", true, true, &ws.cancel),
        Err(Error::Keyword(_))
    ));
    assert!(namespace.find_keyword("  ", false, true, &ws.cancel).unwrap().is_none());
}

#[test]
fn test_conflicting_library_keywords_prefer_custom_library() {
    let text = "\
*** Settings ***
Library    Collections
Library    MyLib

*** Test Cases ***
Case
    Append To List    ${LIST}    x

*** Variables ***
${LIST}    value
";
    let ws = TestWorkspace::new(&[("suite.robot", text)]);
    let namespace = ws.namespace("suite.robot");

    let diagnostics = namespace.get_diagnostics(&ws.cancel).unwrap();
    let conflicts = with_code(&diagnostics, codes::CONFLICTING_LIBRARY_KEYWORDS);
    assert_eq!(conflicts.len(), 1, "{}", render(&diagnostics));
    assert_eq!(conflicts[0].severity, Severity::Warning);

    let keyword = namespace
        .find_keyword("Append To List", false, true, &ws.cancel)
        .unwrap()
        .expect("keyword");
    assert_eq!(keyword.library_name, "MyLib");
}

#[test]
fn test_set_library_search_order_resolves_ambiguity() {
    let text = "\
*** Settings ***
Library    Collections
Library    MyLib

*** Test Cases ***
Case
    Set Library Search Order    Collections
    Append To List    ${LIST}    x

*** Variables ***
${LIST}    value
";
    let ws = TestWorkspace::new(&[("suite.robot", text)]);
    let namespace = ws.namespace("suite.robot");
    assert_no_diagnostics(&namespace.get_diagnostics(&ws.cancel).unwrap());

    let references = namespace.get_keyword_references(&ws.cancel).unwrap();
    assert!(
        references
            .values()
            .any(|r| r.keyword.name == "Append To List" && r.keyword.library_name == "Collections")
    );
}

#[test]
fn test_explicit_library_name_is_a_namespace_reference() {
    let text = "\
*** Settings ***
Library    Collections

*** Test Cases ***
Case
    Collections.Get From List    ${LIST}    0

*** Variables ***
${LIST}    value
";
    let ws = TestWorkspace::new(&[("suite.robot", text)]);
    let namespace = ws.namespace("suite.robot");
    assert_no_diagnostics(&namespace.get_diagnostics(&ws.cancel).unwrap());

    let references = namespace.get_namespace_references(&ws.cancel).unwrap();
    let collections = references
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("Collections"))
        .map(|(_, locations)| locations.len());
    assert_eq!(collections, Some(1));
}

#[test]
fn test_deprecated_keyword_is_a_hint() {
    let ws = TestWorkspace::new(&[("suite.robot", &suite("    Fail Loudly    boom\n"))]);
    let diagnostics = ws.diagnostics("suite.robot");
    let deprecated = with_code(&diagnostics, codes::DEPRECATED_KEYWORD);
    assert_eq!(deprecated.len(), 1, "{}", render(&diagnostics));
    assert_eq!(deprecated[0].severity, Severity::Hint);
    assert!(deprecated[0].message.contains("Use Fail instead."));
}

#[rstest]
#[case("    Log\n")]
#[case("    No Operation    extra\n")]
#[case("    Get Nothing From Anywhere\n")]
fn test_bad_calls_are_errors(#[case] body: &str) {
    let ws = TestWorkspace::new(&[("suite.robot", &suite(body))]);
    let diagnostics = ws.diagnostics("suite.robot");
    assert_eq!(diagnostics.len(), 1, "{}", render(&diagnostics));
    assert_eq!(diagnostics[0].severity, Severity::Error);
    assert!(
        [codes::KEYWORD_ERROR, codes::KEYWORD_NOT_FOUND].contains(&diagnostics[0].code.as_deref().unwrap_or(""))
    );
}

#[test]
fn test_code_after_return_is_unreachable() {
    let text = "\
*** Test Cases ***
Case
    Early

*** Keywords ***
Early
    RETURN
    Log    never
";
    let ws = TestWorkspace::new(&[("suite.robot", text)]);
    let diagnostics = ws.diagnostics("suite.robot");
    assert_eq!(codes_of(&diagnostics), vec![codes::CODE_UNREACHABLE.to_string()], "{}", render(&diagnostics));
    assert_eq!(diagnostics[0].range.start.line, 7);
}

#[test]
fn test_get_keywords_prefers_own_keywords() {
    let text = "\
*** Test Cases ***
Case
    Log    shadowed

*** Keywords ***
Log
    [Arguments]    ${message}
    No Operation
";
    let ws = TestWorkspace::new(&[("suite.robot", text)]);
    let namespace = ws.namespace("suite.robot");

    let keywords = namespace.get_keywords(&ws.cancel).unwrap();
    let logs: Vec<_> = keywords.iter().filter(|k| k.name == "Log").collect();
    assert_eq!(logs.len(), 1);
    assert_ne!(logs[0].library_name, "BuiltIn");
}

const EXPANSION_VARIABLES: &str = "\
*** Variables ***
&{D}    first=1
@{L}    a    b

";

#[rstest]
#[case("    No Operation    &{D}\n")]
#[case("    Should Be Equal    &{D}\n")]
#[case("    Should Be Equal    first=1    &{D}\n")]
#[case("    No Operation    @{L}\n")]
#[case("    Log    @{L}    @{L}    @{L}    @{L}\n")]
fn test_expanded_arguments_skip_count_checks(#[case] body: &str) {
    let text = format!("{EXPANSION_VARIABLES}{}", suite(body));
    let ws = TestWorkspace::new(&[("suite.robot", &text)]);
    assert_no_diagnostics(&ws.diagnostics("suite.robot"));
}

const NON_ASCII: &str = "\
*** Variables ***
${ä}    1
&{grün}    ü=2

*** Test Cases ***
Straße
    Log    äpfel
    Log    ${ä}
    Log    ${grün}[ü]
    Prüfe Größe    ${ä}

*** Keywords ***
Prüfe Größe
    [Arguments]    ${wert}
    Log    ${wert}
";

#[test]
fn test_non_ascii_names_and_arguments() {
    let ws = TestWorkspace::new(&[("suite.robot", NON_ASCII)]);
    let namespace = ws.namespace("suite.robot");
    assert_no_diagnostics(&namespace.get_diagnostics(&ws.cancel).unwrap());

    let keyword = namespace
        .find_keyword("prüfe größe", false, true, &ws.cancel)
        .unwrap()
        .expect("keyword with non-ASCII name");
    assert_eq!(keyword.name, "Prüfe Größe");
}

#[test]
fn test_non_ascii_undefined_variable_range() {
    let ws = TestWorkspace::new(&[("suite.robot", &suite("    Log    ö ${ü}\n"))]);
    let diagnostics = ws.diagnostics("suite.robot");
    let missing = with_code(&diagnostics, codes::VARIABLE_NOT_FOUND);
    assert_eq!(missing.len(), 1, "{}", render(&diagnostics));
    assert_eq!(missing[0].range.start.character, 13);
    assert_eq!(missing[0].range.end.character, 17);
}
