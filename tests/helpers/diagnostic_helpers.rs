//! Diagnostic assertion helpers.

use rfcore::namespace::Severity;
use rfcore::Diagnostic;

pub fn with_code<'a>(diagnostics: &'a [Diagnostic], code: &str) -> Vec<&'a Diagnostic> {
    diagnostics
        .iter()
        .filter(|d| d.code.as_deref() == Some(code))
        .collect()
}

pub fn codes(diagnostics: &[Diagnostic]) -> Vec<String> {
    diagnostics
        .iter()
        .map(|d| d.code.as_deref().unwrap_or("").to_string())
        .collect()
}

pub fn errors(diagnostics: &[Diagnostic]) -> Vec<&Diagnostic> {
    diagnostics.iter().filter(|d| d.severity == Severity::Error).collect()
}

/// Assert the list is empty, printing every diagnostic otherwise.
pub fn assert_no_diagnostics(diagnostics: &[Diagnostic]) {
    assert!(
        diagnostics.is_empty(),
        "Expected no diagnostics, got {}:\n{}",
        diagnostics.len(),
        render(diagnostics)
    );
}

pub fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| {
            format!(
                "  Line {}: [{}] {}",
                d.range.start.line + 1,
                d.code.as_deref().unwrap_or("-"),
                d.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
