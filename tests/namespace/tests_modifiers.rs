//! Severity overrides from configuration and `# robotcode:` comments.

use rfcore::namespace::{Severity, codes};
use rfcore::{AnalysisConfig, DiagnosticModifiersConfig};

use crate::helpers::diagnostic_helpers::{render, with_code};
use crate::helpers::static_loader::StaticLoader;
use crate::helpers::workspace::TestWorkspace;

const SUITE: &str = "\
*** Test Cases ***
Case
    Lgo To    url
    Log    ${missing}    # robotcode: ignore[VariableNotFound]
    # robotcode: warn[KeywordNotFound]
    Unknown Keyword
";

#[test]
fn test_comment_directives() {
    let ws = TestWorkspace::new(&[("suite.robot", SUITE)]);
    let diagnostics = ws.diagnostics("suite.robot");

    assert!(with_code(&diagnostics, codes::VARIABLE_NOT_FOUND).is_empty(), "{}", render(&diagnostics));
    let missing = with_code(&diagnostics, codes::KEYWORD_NOT_FOUND);
    assert_eq!(missing.len(), 2, "{}", render(&diagnostics));
    assert_eq!((missing[0].range.start.line, missing[0].severity), (2, Severity::Error));
    assert_eq!((missing[1].range.start.line, missing[1].severity), (5, Severity::Warning));
}

#[test]
fn test_workspace_configuration() {
    let config = AnalysisConfig {
        diagnostic_modifiers: DiagnosticModifiersConfig {
            information: vec![codes::KEYWORD_NOT_FOUND.to_string()],
            ignore: vec![codes::VARIABLE_NOT_FOUND.to_string()],
            ..DiagnosticModifiersConfig::default()
        },
        ..AnalysisConfig::default()
    };
    let ws = TestWorkspace::with_config(config, StaticLoader::standard(), &[("suite.robot", SUITE)]);
    let diagnostics = ws.diagnostics("suite.robot");

    assert!(with_code(&diagnostics, codes::VARIABLE_NOT_FOUND).is_empty());
    let severities: Vec<Severity> = with_code(&diagnostics, codes::KEYWORD_NOT_FOUND)
        .iter()
        .map(|d| d.severity)
        .collect();
    assert_eq!(severities, vec![Severity::Info, Severity::Warning]);
}
