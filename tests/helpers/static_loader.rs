//! A [`LibraryLoader`] answering from in-memory descriptors.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use rfcore::Result;
use rfcore::library::{
    ArgumentInfo, ArgumentKind, ArgumentSpec, ImportedVariable, KeywordDoc, LibraryDoc, LibraryError,
    LibraryKind, VariablesDoc,
};
use rfcore::loader::{Completion, CompletionRequest, ImportRequest, LibraryLoader};

#[derive(Default)]
pub struct StaticLoader {
    libraries: IndexMap<String, LibraryDoc>,
    /// Keyed by file name.
    variables: IndexMap<String, VariablesDoc>,
    library_loads: AtomicUsize,
    /// Libraries whose first load waits twice on a barrier.
    gates: Mutex<IndexMap<String, Arc<Barrier>>>,
}

impl StaticLoader {
    /// BuiltIn, Collections, an empty library and a custom library
    /// clashing with Collections.
    pub fn standard() -> Self {
        Self::default()
            .with_library(builtin())
            .with_library(collections())
            .with_library(LibraryDoc::new("Reserved", LibraryKind::Library))
            .with_library(LibraryDoc::new("Easter", LibraryKind::Library))
            .with_library(LibraryDoc::new("EmptyLib", LibraryKind::Library))
            .with_library(
                LibraryDoc::new("MyLib", LibraryKind::Library).with_keywords([
                    keyword("Append To List", &[positional("list_"), varargs("values")]),
                    keyword("Connect", &[positional("host")]),
                ]),
            )
    }

    pub fn with_library(mut self, doc: LibraryDoc) -> Self {
        self.libraries.insert(doc.name.clone(), doc);
        self
    }

    pub fn with_variables(mut self, file_name: &str, variables: &[(&str, &str)]) -> Self {
        let mut doc = VariablesDoc::new(file_name, None);
        doc.variables = variables
            .iter()
            .map(|(name, value)| ImportedVariable::new(*name, Some(value.to_string())))
            .collect();
        self.variables.insert(file_name.to_string(), doc);
        self
    }

    /// Hold the first load of `name`: it meets `gate` once on entry and
    /// once more before returning.
    pub fn with_gate(self, name: &str, gate: Arc<Barrier>) -> Self {
        self.gates.lock().insert(name.to_string(), gate);
        self
    }

    /// How often a library descriptor was requested from this loader.
    pub fn library_loads(&self) -> usize {
        self.library_loads.load(Ordering::SeqCst)
    }
}

impl LibraryLoader for StaticLoader {
    fn load_library(&self, request: &ImportRequest, _cancel: &CancellationToken) -> Result<LibraryDoc> {
        self.library_loads.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().shift_remove(&request.name);
        if let Some(gate) = gate {
            gate.wait();
            gate.wait();
        }
        Ok(match self.libraries.get(&request.name) {
            Some(doc) => doc.clone(),
            None => LibraryDoc::from_error(
                request.name.as_str(),
                LibraryKind::Library,
                None,
                LibraryError::new(format!("No module named '{}'", request.name)),
            ),
        })
    }

    fn load_variables(&self, request: &ImportRequest, _cancel: &CancellationToken) -> Result<VariablesDoc> {
        let file_name = Path::new(&request.name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(match self.variables.get(&file_name) {
            Some(doc) => doc.clone(),
            None => VariablesDoc::from_error(
                request.name.as_str(),
                None,
                LibraryError::new(format!("Variable file '{}' does not exist.", request.name)),
            ),
        })
    }

    fn complete_import(&self, _request: &CompletionRequest, _cancel: &CancellationToken) -> Result<Vec<Completion>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// DESCRIPTORS
// ============================================================================

pub fn positional(name: &str) -> ArgumentInfo {
    ArgumentInfo::positional(name)
}

pub fn optional(name: &str, default: &str) -> ArgumentInfo {
    ArgumentInfo::positional(name).with_default(default)
}

pub fn varargs(name: &str) -> ArgumentInfo {
    ArgumentInfo::new(name, ArgumentKind::VarPositional)
}

pub fn keyword(name: &str, args: &[ArgumentInfo]) -> KeywordDoc {
    KeywordDoc::new(name, "").with_args(ArgumentSpec::new(args.to_vec()))
}

fn builtin() -> LibraryDoc {
    LibraryDoc::new("BuiltIn", LibraryKind::Library).with_keywords([
        keyword("Log", &[positional("message"), optional("level", "INFO")]),
        keyword("No Operation", &[]),
        keyword("Should Be True", &[positional("condition"), optional("msg", "None")]),
        keyword("Should Be Equal", &[positional("first"), positional("second")]),
        keyword("Evaluate", &[positional("expression"), optional("modules", "None")]),
        keyword("Run Keyword", &[positional("name"), varargs("args")]),
        keyword("Run Keyword If", &[positional("condition"), positional("name"), varargs("args")]),
        keyword("Run Keywords", &[varargs("keywords")]),
        keyword("Set Suite Variable", &[positional("name"), varargs("values")]),
        keyword("Set Test Variable", &[positional("name"), varargs("values")]),
        keyword("Set Library Search Order", &[varargs("search_order")]),
        keyword("Fail Loudly", &[positional("message")])
            .with_doc("*DEPRECATED* Use Fail instead."),
    ])
}

fn collections() -> LibraryDoc {
    LibraryDoc::new("Collections", LibraryKind::Library).with_keywords([
        keyword("Append To List", &[positional("list_"), varargs("values")]),
        keyword("Get From List", &[positional("list_"), positional("index")]),
    ])
}
