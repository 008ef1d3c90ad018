//! Namespace caching, invalidation along imports and bulk diagnosis.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use tokio_util::sync::CancellationToken;

use rfcore::imports::{FileChange, FileChangeKind};
use rfcore::library::{LibraryDoc, LibraryKind};
use rfcore::namespace::codes;
use rfcore::{AnalysisConfig, Error};

use crate::helpers::diagnostic_helpers::{assert_no_diagnostics, render, with_code};
use crate::helpers::static_loader::{StaticLoader, keyword};
use crate::helpers::workspace::TestWorkspace;

const SUITE: &str = "\
*** Settings ***
Resource    common.resource
Library    Collections

*** Test Cases ***
Case
    Helper Two
";

const COMMON_V1: &str = "*** Keywords ***\nHelper\n    No Operation\n";
const COMMON_V2: &str = "*** Keywords ***\nHelper\n    No Operation\n\nHelper Two\n    Helper\n";

fn workspace() -> TestWorkspace {
    TestWorkspace::new(&[("suite.robot", SUITE), ("common.resource", COMMON_V1)])
}

#[test]
fn test_namespace_is_reused_while_model_is_unchanged() {
    let ws = workspace();
    let first = ws.namespace("suite.robot");
    let second = ws.namespace("suite.robot");
    assert!(Arc::ptr_eq(&first, &second));

    let analysis = first.analyze(&ws.cancel).unwrap();
    assert!(first.is_analyzed());
    assert!(Arc::ptr_eq(&analysis, &second.analyze(&ws.cancel).unwrap()));
}

#[test]
fn test_initialization_is_repeatable() {
    let ws = workspace();
    let namespace = ws.namespace("suite.robot");
    let before = namespace.get_keywords(&ws.cancel).unwrap();
    let diagnostics_before = namespace.get_diagnostics(&ws.cancel).unwrap();

    namespace.invalidate();
    assert!(!namespace.is_initialized());
    assert!(!namespace.is_analyzed());

    let after = namespace.get_keywords(&ws.cancel).unwrap();
    let names = |keywords: &[Arc<rfcore::library::KeywordDoc>]| -> Vec<String> {
        keywords.iter().map(|k| k.longname()).collect()
    };
    assert_eq!(names(&before), names(&after));
    assert_eq!(diagnostics_before, namespace.get_diagnostics(&ws.cancel).unwrap());
}

#[test]
fn test_same_document_gives_same_diagnostics_across_workspaces() {
    let first = workspace();
    let second = workspace();
    let strip = |ws: &TestWorkspace| -> Vec<(String, u32, u32)> {
        ws.diagnostics("suite.robot")
            .iter()
            .map(|d| (d.code.as_deref().unwrap_or("").to_string(), d.range.start.line, d.range.start.character))
            .collect()
    };
    assert_eq!(strip(&first), strip(&second));
}

#[test]
fn test_editing_the_document_replaces_its_namespace() {
    let ws = workspace();
    let old = ws.namespace("suite.robot");
    old.get_diagnostics(&ws.cancel).unwrap();

    ws.edit("suite.robot", "*** Test Cases ***\nCase\n    No Operation\n");
    assert!(!old.is_initialized());

    let new = ws.namespace("suite.robot");
    assert!(!Arc::ptr_eq(&old, &new));
    assert_no_diagnostics(&new.get_diagnostics(&ws.cancel).unwrap());
}

#[test]
fn test_editing_an_imported_resource_invalidates_importers() {
    let ws = workspace();
    let invalidated = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invalidated);
    ws.cache.namespace_invalidated.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let suite = ws.namespace("suite.robot");
    let diagnostics = suite.get_diagnostics(&ws.cancel).unwrap();
    assert_eq!(with_code(&diagnostics, codes::KEYWORD_NOT_FOUND).len(), 1, "{}", render(&diagnostics));

    ws.edit("common.resource", COMMON_V2);
    assert!(!suite.is_initialized());
    assert!(invalidated.load(Ordering::SeqCst) >= 1);

    let same = ws.namespace("suite.robot");
    assert!(Arc::ptr_eq(&suite, &same));
    assert_no_diagnostics(&same.get_diagnostics(&ws.cancel).unwrap());
}

#[test]
fn test_initialized_event_is_forwarded() {
    let ws = workspace();
    let initialized = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&initialized);
    let suite_path = ws.path("suite.robot");
    ws.cache.namespace_initialized.subscribe(move |ns| {
        if ns.path() == suite_path {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let suite = ws.namespace("suite.robot");
    suite.get_keywords(&ws.cancel).unwrap();
    suite.get_keywords(&ws.cancel).unwrap();
    assert_eq!(initialized.load(Ordering::SeqCst), 1);
}

#[test]
fn test_watched_library_change_reloads_libraries() {
    let ws = workspace();
    let suite = ws.namespace("suite.robot");
    suite.get_diagnostics(&ws.cancel).unwrap();
    assert!(ws.watcher.watcher_count() >= 1);
    let loads = ws.loader.library_loads();

    ws.manager
        .did_change_watched_files(&[FileChange::new(ws.path("Collections.py"), FileChangeKind::Changed)]);
    assert!(!suite.is_initialized());

    suite.get_diagnostics(&ws.cancel).unwrap();
    assert!(ws.loader.library_loads() > loads);
}

#[test]
fn test_cancelled_analysis_is_not_cached() {
    let ws = workspace();
    let suite = ws.namespace("suite.robot");

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(matches!(suite.get_diagnostics(&cancelled), Err(Error::Cancelled)));
    assert!(!suite.is_analyzed());

    assert!(suite.get_diagnostics(&ws.cancel).is_ok());
    assert!(suite.is_analyzed());
}

#[test]
fn test_diagnose_all_covers_loaded_documents() {
    let ws = workspace();
    ws.namespace("suite.robot").get_diagnostics(&ws.cancel).unwrap();

    let results = ws.cache.diagnose_all(&ws.cancel).unwrap();
    let paths: Vec<_> = results.iter().map(|(path, _)| path.clone()).collect();
    assert!(paths.contains(&ws.path("suite.robot")));
    assert!(paths.contains(&ws.path("common.resource")));

    let suite = results
        .iter()
        .find(|(path, _)| *path == ws.path("suite.robot"))
        .map(|(_, diagnostics)| diagnostics.clone())
        .unwrap_or_default();
    assert_eq!(with_code(&suite, codes::KEYWORD_NOT_FOUND).len(), 1);
}

#[test]
fn test_resource_edit_during_initialization_discards_the_result() {
    let suite_text = "\
*** Settings ***
Resource    common.resource
Library    SlowLib

*** Test Cases ***
Case
    Helper Two
";
    let gate = Arc::new(Barrier::new(2));
    let loader = StaticLoader::standard()
        .with_library(LibraryDoc::new("SlowLib", LibraryKind::Library).with_keywords([keyword("Slow", &[])]))
        .with_gate("SlowLib", Arc::clone(&gate));
    let ws = TestWorkspace::with_config(
        AnalysisConfig::default(),
        loader,
        &[("suite.robot", suite_text), ("common.resource", COMMON_V1)],
    );
    let suite = ws.namespace("suite.robot");

    thread::scope(|scope| {
        let init = scope.spawn(|| suite.get_keywords(&ws.cancel).map(|keywords| keywords.len()));
        gate.wait();
        assert!(suite.is_initializing());
        ws.edit("common.resource", COMMON_V2);
        gate.wait();
        assert!(init.join().expect("initializing thread").is_ok());
    });

    assert!(!suite.is_initialized());
    assert_no_diagnostics(&suite.get_diagnostics(&ws.cancel).unwrap());
}
