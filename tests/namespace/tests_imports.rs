//! Import resolution: libraries, resources, variable files and cycles.

use rfcore::namespace::{Severity, codes};

use crate::helpers::diagnostic_helpers::{assert_no_diagnostics, render, with_code};
use crate::helpers::static_loader::StaticLoader;
use crate::helpers::workspace::TestWorkspace;

const DUPLICATE_LIBRARY: &str = "\
*** Settings ***
Library    Collections
Library    Collections

*** Test Cases ***
Append
    No Operation
";

#[test]
fn test_duplicate_library_import_collapses() {
    let ws = TestWorkspace::new(&[("suite.robot", DUPLICATE_LIBRARY)]);
    let namespace = ws.namespace("suite.robot");

    let libraries = namespace.get_libraries(&ws.cancel).unwrap();
    let collections: Vec<_> = libraries.iter().filter(|l| l.name() == "Collections").collect();
    assert_eq!(collections.len(), 1);

    let diagnostics = namespace.get_diagnostics(&ws.cancel).unwrap();
    let duplicates = with_code(&diagnostics, codes::LIBRARY_ALREADY_IMPORTED);
    assert_eq!(duplicates.len(), 1, "{}", render(&diagnostics));
    let duplicate = duplicates[0];
    assert_eq!(duplicate.severity, Severity::Info);
    assert_eq!(duplicate.range.start.line, 2);
    assert_eq!(duplicate.related.len(), 1);
    assert_eq!(duplicate.related[0].location.range.start.line, 1);
}

#[test]
fn test_reimport_with_other_arguments_replaces_library() {
    let text = "\
*** Settings ***
Library    Collections
Library    Collections    arg

*** Test Cases ***
Case
    Get From List    ${LIST}    0

*** Variables ***
${LIST}    value
";
    let ws = TestWorkspace::new(&[("suite.robot", text)]);
    let namespace = ws.namespace("suite.robot");

    let libraries = namespace.get_libraries(&ws.cancel).unwrap();
    let collections: Vec<_> = libraries.iter().filter(|l| l.name() == "Collections").collect();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].args, vec!["arg".to_string()]);
    let site = collections[0].import.as_ref().expect("import site");
    assert_eq!(site.name_range.start.line, 2);

    assert_no_diagnostics(&namespace.get_diagnostics(&ws.cancel).unwrap());
}

#[test]
fn test_library_is_loaded_once_per_manager() {
    let ws = TestWorkspace::new(&[
        ("a.robot", DUPLICATE_LIBRARY),
        ("b.robot", DUPLICATE_LIBRARY),
    ]);
    ws.namespace("a.robot").get_libraries(&ws.cancel).unwrap();
    let after_first = ws.loader.library_loads();
    ws.namespace("b.robot").get_libraries(&ws.cancel).unwrap();
    assert_eq!(ws.loader.library_loads(), after_first);
}

#[test]
fn test_library_without_keywords() {
    let ws = TestWorkspace::new(&[(
        "suite.robot",
        "*** Settings ***\nLibrary    EmptyLib\n\n*** Test Cases ***\nT\n    No Operation\n",
    )]);
    let diagnostics = ws.diagnostics("suite.robot");
    let empty = with_code(&diagnostics, codes::LIBRARY_CONTAINS_NO_KEYWORDS);
    assert_eq!(empty.len(), 1, "{}", render(&diagnostics));
    assert_eq!(empty[0].severity, Severity::Warning);
}

#[test]
fn test_library_load_failure_is_reported_on_import() {
    let ws = TestWorkspace::new(&[(
        "suite.robot",
        "*** Settings ***\nLibrary    NoSuchLib\n\n*** Test Cases ***\nT\n    No Operation\n",
    )]);
    let diagnostics = ws.diagnostics("suite.robot");
    let failed = with_code(&diagnostics, codes::IMPORT_CONTAINS_ERRORS);
    assert_eq!(failed.len(), 1, "{}", render(&diagnostics));
    assert_eq!(failed[0].severity, Severity::Error);
    assert!(failed[0].message.contains("No module named 'NoSuchLib'"));
    assert_eq!(failed[0].range.start.line, 1);
}

#[test]
fn test_missing_resource_is_unresolved() {
    let ws = TestWorkspace::new(&[(
        "suite.robot",
        "*** Settings ***\nResource    missing.resource\n\n*** Test Cases ***\nT\n    No Operation\n",
    )]);
    let diagnostics = ws.diagnostics("suite.robot");
    let unresolved = with_code(&diagnostics, codes::IMPORT_CONTAINS_ERRORS);
    assert_eq!(unresolved.len(), 1, "{}", render(&diagnostics));
    assert_eq!(unresolved[0].severity, Severity::Error);
    assert_eq!(unresolved[0].range.start.line, 1);
}

#[test]
fn test_resource_keywords_and_variables_are_visible() {
    let ws = TestWorkspace::new(&[
        (
            "suite.robot",
            "*** Settings ***\nResource    common.resource\n\n*** Test Cases ***\nT\n    Login User    ${USER}\n",
        ),
        (
            "common.resource",
            "*** Variables ***\n${USER}    bob\n\n*** Keywords ***\nLogin User\n    [Arguments]    ${name}\n    Log    ${name}\n",
        ),
    ]);
    let namespace = ws.namespace("suite.robot");
    assert_no_diagnostics(&namespace.get_diagnostics(&ws.cancel).unwrap());

    let resources = namespace.get_resources(&ws.cancel).unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].import_name, "common.resource");
    assert!(namespace.imports_resource(&ws.path("common.resource")));
}

#[test]
fn test_empty_resource() {
    let ws = TestWorkspace::new(&[
        (
            "suite.robot",
            "*** Settings ***\nResource    empty.resource\n\n*** Test Cases ***\nT\n    No Operation\n",
        ),
        ("empty.resource", "*** Keywords ***\n"),
    ]);
    let diagnostics = ws.diagnostics("suite.robot");
    let empty = with_code(&diagnostics, codes::RESOURCE_EMPTY);
    assert_eq!(empty.len(), 1, "{}", render(&diagnostics));
    assert_eq!(empty[0].severity, Severity::Warning);
}

#[test]
fn test_resource_importing_itself() {
    let ws = TestWorkspace::new(&[(
        "self.resource",
        "*** Settings ***\nResource    self.resource\n\n*** Keywords ***\nHelper\n    No Operation\n",
    )]);
    let diagnostics = ws.diagnostics("self.resource");
    assert_eq!(with_code(&diagnostics, codes::RECURSIVE_IMPORT).len(), 1, "{}", render(&diagnostics));
}

#[test]
fn test_circular_resource_imports_terminate() {
    let ws = TestWorkspace::new(&[
        (
            "suite.robot",
            "*** Settings ***\nResource    a.resource\n\n*** Test Cases ***\nT\n    From A\n    From B\n",
        ),
        (
            "a.resource",
            "*** Settings ***\nResource    b.resource\n\n*** Keywords ***\nFrom A\n    From B\n",
        ),
        (
            "b.resource",
            "*** Settings ***\nResource    a.resource\n\n*** Keywords ***\nFrom B\n    No Operation\n",
        ),
    ]);

    let diagnostics = ws.diagnostics("suite.robot");
    let circular = with_code(&diagnostics, codes::POSSIBLE_CIRCULAR_IMPORT);
    assert_eq!(circular.len(), 1, "{}", render(&diagnostics));
    assert_eq!(circular[0].range.start.line, 1);
    assert!(with_code(&diagnostics, codes::KEYWORD_NOT_FOUND).is_empty());

    // each resource of the cycle can be analyzed on its own
    ws.diagnostics("a.resource");
    ws.diagnostics("b.resource");
}

#[test]
fn test_duplicate_resource_import() {
    let ws = TestWorkspace::new(&[
        (
            "suite.robot",
            "*** Settings ***\nResource    common.resource\nResource    ./common.resource\n\n*** Test Cases ***\nT\n    Helper\n",
        ),
        ("common.resource", "*** Keywords ***\nHelper\n    No Operation\n"),
    ]);
    let diagnostics = ws.diagnostics("suite.robot");
    let duplicates = with_code(&diagnostics, codes::RESOURCE_ALREADY_IMPORTED);
    assert_eq!(duplicates.len(), 1, "{}", render(&diagnostics));
    assert_eq!(duplicates[0].range.start.line, 2);
}

#[test]
fn test_variables_file_import() {
    let loader = StaticLoader::standard().with_variables("vars.py", &[("${SERVER}", "localhost")]);
    let ws = TestWorkspace::with_config(
        Default::default(),
        loader,
        &[
            (
                "suite.robot",
                "*** Settings ***\nVariables    vars.py\n\n*** Test Cases ***\nT\n    Log    ${SERVER}\n",
            ),
            ("vars.py", "SERVER = 'localhost'\n"),
        ],
    );
    let namespace = ws.namespace("suite.robot");
    assert_no_diagnostics(&namespace.get_diagnostics(&ws.cancel).unwrap());
    assert_eq!(namespace.get_variables_imports(&ws.cancel).unwrap().len(), 1);
}

#[test]
fn test_import_name_with_variables() {
    let ws = TestWorkspace::new(&[
        (
            "suite.robot",
            "*** Settings ***\nResource    ${RES_DIR}/common.resource\n\n*** Variables ***\n${RES_DIR}    ${CURDIR}/res\n\n*** Test Cases ***\nT\n    Helper\n",
        ),
        ("res/common.resource", "*** Keywords ***\nHelper\n    No Operation\n"),
    ]);
    assert_no_diagnostics(&ws.diagnostics("suite.robot"));
}
