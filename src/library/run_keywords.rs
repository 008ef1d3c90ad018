//! BuiltIn keywords that take other keywords as arguments.

use crate::base::constants::{
    RUN_KEYWORD_IF_NAME, RUN_KEYWORD_NAMES, RUN_KEYWORD_WITH_CONDITION_NAMES, RUN_KEYWORDS_NAME,
};
use crate::model::normalize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunKeywordKind {
    /// `Run Keyword    name    args...`
    RunKeyword,
    /// `n` leading arguments, then `name    args...`.
    WithCondition(usize),
    /// `Run Keyword If    cond    name    args...    ELSE IF    cond ...    ELSE    ...`
    RunKeywordIf,
    /// `Run Keywords    a    b` or `Run Keywords    a    x    AND    b    y`
    RunKeywords,
}

impl RunKeywordKind {
    pub fn classify(name: &str) -> Option<Self> {
        let normalized = normalize(name);
        if normalized == normalize(RUN_KEYWORD_IF_NAME) {
            return Some(Self::RunKeywordIf);
        }
        if normalized == normalize(RUN_KEYWORDS_NAME) {
            return Some(Self::RunKeywords);
        }
        if RUN_KEYWORD_NAMES.iter().any(|n| normalize(n) == normalized) {
            return Some(Self::RunKeyword);
        }
        RUN_KEYWORD_WITH_CONDITION_NAMES
            .iter()
            .find(|(n, _)| normalize(n) == normalized)
            .map(|(_, count)| Self::WithCondition(*count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Run Keyword", Some(RunKeywordKind::RunKeyword))]
    #[case("run_keyword_and_ignore_error", Some(RunKeywordKind::RunKeyword))]
    #[case("Wait Until Keyword Succeeds", Some(RunKeywordKind::WithCondition(2)))]
    #[case("Run Keyword If", Some(RunKeywordKind::RunKeywordIf))]
    #[case("Run Keywords", Some(RunKeywordKind::RunKeywords))]
    #[case("Log", None)]
    fn test_classify(#[case] name: &str, #[case] expected: Option<RunKeywordKind>) {
        assert_eq!(RunKeywordKind::classify(name), expected);
    }
}
