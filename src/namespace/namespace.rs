//! # Namespace
//!
//! The resolved symbol environment of one document: what it imports, which
//! keywords and variables are visible, and the diagnostics of both steps.
//!
//! Initialization is lazy and runs once per generation.
//! [`Namespace::invalidate`] starts a new generation; a result computed for
//! an older generation is still returned to its caller but never cached.
//!
//! Imports of imported resources are flattened into the importing
//! namespace. The chain of resource paths being imported is threaded
//! through the recursion, so a back edge is reported instead of followed.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::base::constants::{BUILTIN_LIBRARY_NAME, DEFAULT_LIBRARIES, RESERVED_LIBRARY_NAME};
use crate::base::{Location, Position, Range, normalize_path};
use crate::config::AnalysisConfig;
use crate::documents::TextDocument;
use crate::error::{Error, Result};
use crate::events::EventEmitter;
use crate::imports::{ImportsManager, VariableValues};
use crate::library::{KeywordDoc, KeywordKey, LibraryDoc, LibraryKind, VariablesDoc, library_doc_from_model};
use crate::model::variables::strip_assign_mark;
use crate::model::{File, KeywordMatcher, Languages, Statement, TokenKind};

use super::analyzer::{AnalyzerResult, KeywordReferences, NamespaceAnalyzer};
use super::diagnostics::{Diagnostic, DiagnosticCollector, RelatedInfo, codes};
use super::entries::{Import, ImportSite, LibraryEntry, ResourceEntry, VariablesEntry};
use super::finder::{KeywordFinder, KeywordLookup, KeywordTables};
use super::modifier::DiagnosticsModifier;
use super::variables::{VariableDefinition, VariableKind, VariableScope, builtin_variables};

// ============================================================================
// STATE
// ============================================================================

/// Everything initialization produced for one generation.
#[derive(Debug)]
pub struct NamespaceState {
    /// Keyed by the name keywords are qualified with.
    libraries: IndexMap<String, Arc<LibraryEntry>>,
    /// Keyed by normalized resource path.
    resources: IndexMap<PathBuf, Arc<ResourceEntry>>,
    /// Keyed by variable file path (or module name) and arguments.
    variables_imports: IndexMap<String, Arc<VariablesEntry>>,
    diagnostics: Vec<Diagnostic>,
    command_line_variables: Vec<Arc<VariableDefinition>>,
    suite_variables: VariableScope,
    finder: KeywordFinder,
    keywords: OnceLock<Vec<Arc<KeywordDoc>>>,
}

impl NamespaceState {
    pub fn libraries(&self) -> &IndexMap<String, Arc<LibraryEntry>> {
        &self.libraries
    }

    pub fn resources(&self) -> &IndexMap<PathBuf, Arc<ResourceEntry>> {
        &self.resources
    }

    pub fn variables_imports(&self) -> &IndexMap<String, Arc<VariablesEntry>> {
        &self.variables_imports
    }

    /// Diagnostics of the import step.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn command_line_variables(&self) -> &[Arc<VariableDefinition>] {
        &self.command_line_variables
    }

    /// Command line, own, imported and built-in variables; the first definition of a name wins.
    pub fn suite_variables(&self) -> &VariableScope {
        &self.suite_variables
    }

    pub fn finder(&self) -> &KeywordFinder {
        &self.finder
    }

    /// Every visible keyword once: own keywords shadow resource keywords,
    /// which shadow library keywords.
    pub fn keywords(&self) -> &[Arc<KeywordDoc>] {
        self.keywords.get_or_init(|| {
            let tables = self.finder.tables();
            let docs = std::iter::once(&tables.self_doc)
                .chain(tables.resources.iter().map(|r| &r.library_doc))
                .chain(tables.libraries.iter().map(|l| &l.library_doc));

            let mut result: IndexMap<KeywordMatcher, Arc<KeywordDoc>> = IndexMap::new();
            for doc in docs {
                let mut own: IndexMap<&KeywordMatcher, &Arc<KeywordDoc>> = IndexMap::new();
                for keyword in &doc.keywords {
                    own.insert(keyword.matcher(), keyword);
                }
                for (matcher, keyword) in own {
                    result
                        .entry(matcher.clone())
                        .or_insert_with(|| Arc::clone(keyword));
                }
            }
            result.into_values().collect()
        })
    }

    /// Does this state hold one of `docs` as library or resource descriptor?
    pub fn uses_library_doc(&self, docs: &[Arc<LibraryDoc>]) -> bool {
        docs.iter().any(|doc| {
            self.libraries.values().any(|e| Arc::ptr_eq(&e.library_doc, doc))
                || self.resources.values().any(|e| Arc::ptr_eq(&e.library_doc, doc))
        })
    }

    pub fn uses_variables_doc(&self, docs: &[Arc<VariablesDoc>]) -> bool {
        docs.iter().any(|doc| {
            self.variables_imports
                .values()
                .any(|e| Arc::ptr_eq(&e.variables_doc, doc))
        })
    }

    pub fn imports_resource(&self, path: &Path) -> bool {
        self.resources.contains_key(&normalize_path(path))
    }
}

/// Analysis of one generation, with the final diagnostic list.
#[derive(Debug)]
pub struct Analysis {
    pub result: AnalyzerResult,
    /// Import and analysis diagnostics after severity modifiers.
    pub diagnostics: Vec<Diagnostic>,
}

// ============================================================================
// NAMESPACE
// ============================================================================

pub struct Namespace {
    me: Weak<Namespace>,
    imports_manager: Arc<ImportsManager>,
    document: Weak<TextDocument>,
    source: Arc<str>,
    path: PathBuf,
    model: Arc<File>,
    languages: Languages,
    library_doc: OnceLock<Arc<LibraryDoc>>,
    imports: OnceLock<Vec<Import>>,
    own_variables: OnceLock<Vec<Arc<VariableDefinition>>>,
    generation: AtomicU64,
    /// Set while this thread initializes the namespace.
    init_lock: ReentrantMutex<Cell<bool>>,
    /// Some thread is building the state; dependency checks treat it as affected.
    initializing: AtomicBool,
    state: RwLock<Option<Arc<NamespaceState>>>,
    analyze_lock: Mutex<()>,
    analysis: Mutex<Option<Arc<Analysis>>>,
    pub has_initialized: EventEmitter<Arc<Namespace>>,
    pub has_invalidated: EventEmitter<Arc<Namespace>>,
    pub has_analyzed: EventEmitter<Arc<Namespace>>,
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("source", &self.source)
            .field("generation", &self.generation())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Namespace {
    /// Namespace of the document's current model. Nothing is resolved yet.
    pub fn new(imports_manager: Arc<ImportsManager>, document: &Arc<TextDocument>) -> Arc<Self> {
        let languages = Languages::new(&imports_manager.config().languages);
        Arc::new_cyclic(|me| Self {
            me: Weak::clone(me),
            document: Arc::downgrade(document),
            source: Arc::clone(document.source()),
            path: document.path().to_path_buf(),
            model: document.model(),
            languages,
            imports_manager,
            library_doc: OnceLock::new(),
            imports: OnceLock::new(),
            own_variables: OnceLock::new(),
            generation: AtomicU64::new(0),
            init_lock: ReentrantMutex::new(Cell::new(false)),
            initializing: AtomicBool::new(false),
            state: RwLock::new(None),
            analyze_lock: Mutex::new(()),
            analysis: Mutex::new(None),
            has_initialized: EventEmitter::new(),
            has_invalidated: EventEmitter::new(),
            has_analyzed: EventEmitter::new(),
        })
    }

    pub fn source(&self) -> &Arc<str> {
        &self.source
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn model(&self) -> &Arc<File> {
        &self.model
    }

    /// The document, unless it was dropped from the documents manager.
    pub fn document(&self) -> Option<Arc<TextDocument>> {
        self.document.upgrade()
    }

    pub fn imports_manager(&self) -> &Arc<ImportsManager> {
        &self.imports_manager
    }

    /// Is `%{name}` set in the configured or the process environment?
    pub fn has_environment_variable(&self, name: &str) -> bool {
        self.config().env.contains_key(name) || std::env::var_os(name).is_some()
    }

    pub fn config(&self) -> &AnalysisConfig {
        self.imports_manager.config()
    }

    pub fn languages(&self) -> &Languages {
        &self.languages
    }

    fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    /// Keywords and variables the document defines itself.
    ///
    /// `.resource` files and files without tests describe a resource;
    /// everything else is a suite.
    pub fn library_doc(&self) -> Arc<LibraryDoc> {
        Arc::clone(self.library_doc.get_or_init(|| {
            let is_resource_file = self
                .path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("resource"));
            let kind = if is_resource_file || !self.model.has_tests() {
                LibraryKind::Resource
            } else {
                LibraryKind::Suite
            };
            let name = self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Arc::new(library_doc_from_model(&self.model, kind, &name))
        }))
    }

    /// Import settings in source order.
    pub fn imports(&self) -> &[Import] {
        self.imports.get_or_init(|| {
            self.model
                .imports()
                .filter_map(|s| Import::from_statement(s, &self.source))
                .collect()
        })
    }

    /// Valid `*** Variables ***` entries in source order, duplicates included.
    pub fn own_variables(&self) -> &[Arc<VariableDefinition>] {
        self.own_variables.get_or_init(|| {
            self.model
                .variables()
                .filter_map(|s| suite_variable(s, &self.source))
                .map(Arc::new)
                .collect()
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    pub fn is_analyzed(&self) -> bool {
        self.analysis.lock().is_some()
    }

    /// Current state, without initializing.
    pub fn state(&self) -> Option<Arc<NamespaceState>> {
        self.state.read().clone()
    }

    /// Is some thread resolving the imports right now?
    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::Acquire)
    }

    /// Does the current state depend on the resource at `path`?
    ///
    /// A namespace still initializing may already hold the old import, so it
    /// always counts as dependent.
    pub fn imports_resource(&self, path: &Path) -> bool {
        self.is_initializing() || self.state.read().as_ref().is_some_and(|s| s.imports_resource(path))
    }

    pub fn uses_library_doc(&self, docs: &[Arc<LibraryDoc>]) -> bool {
        self.is_initializing() || self.state.read().as_ref().is_some_and(|s| s.uses_library_doc(docs))
    }

    pub fn uses_variables_doc(&self, docs: &[Arc<VariablesDoc>]) -> bool {
        self.is_initializing() || self.state.read().as_ref().is_some_and(|s| s.uses_variables_doc(docs))
    }

    /// Drop initialization and analysis results; the next query recomputes them.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let had_state = self.state.write().take().is_some();
        self.analysis.lock().take();
        debug!("namespace '{}' invalidated", self.source);
        if had_state {
            if let Some(me) = self.me.upgrade() {
                self.has_invalidated.emit(&me);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------------

    /// Resolve all imports of the current generation, once.
    pub fn ensure_initialized(&self, cancel: &CancellationToken) -> Result<Arc<NamespaceState>> {
        if let Some(state) = &*self.state.read() {
            return Ok(Arc::clone(state));
        }

        let initializing = self.init_lock.lock();
        if initializing.get() {
            error!("namespace '{}' re-entered its own initialization", self.source);
            return Err(Error::invalid_state(format!(
                "recursive initialization of namespace '{}'",
                self.source
            )));
        }
        if let Some(state) = &*self.state.read() {
            return Ok(Arc::clone(state));
        }

        let generation = self.generation();
        initializing.set(true);
        self.initializing.store(true, Ordering::Release);
        let built = self.build_state(cancel);
        self.initializing.store(false, Ordering::Release);
        initializing.set(false);
        let state = Arc::new(built?);

        if self.generation() == generation {
            *self.state.write() = Some(Arc::clone(&state));
            debug!(
                "namespace '{}' initialized: {} libraries, {} resources, {} variable files",
                self.source,
                state.libraries.len(),
                state.resources.len(),
                state.variables_imports.len()
            );
            if let Some(me) = self.me.upgrade() {
                self.has_initialized.emit(&me);
            }
        } else {
            debug!("namespace '{}' was invalidated during initialization", self.source);
        }
        Ok(state)
    }

    fn build_state(&self, cancel: &CancellationToken) -> Result<NamespaceState> {
        let command_line = self.imports_manager.command_line_variables(cancel)?;

        let mut values = VariableValues::new();
        for variable in self.own_variables() {
            if let Some(value) = &variable.value {
                values.insert(&variable.name, value.to_string());
            }
        }

        let mut builder = StateBuilder::default();
        self.import_default_libraries(&mut builder, &values, cancel)?;

        let mut chain = vec![normalize_path(&self.path)];
        let imports = self.imports().to_vec();
        self.import_all(
            &mut builder,
            &imports,
            &ImportScope {
                base_dir: self.base_dir().to_path_buf(),
                top: None,
            },
            &mut values,
            &mut chain,
            &mut Vec::new(),
            cancel,
        )?;

        let mut suite_variables = VariableScope::new();
        let imported = builder
            .resources
            .values()
            .flat_map(|r| r.variables.iter())
            .chain(builder.variables_imports.values().flat_map(|v| v.variables.iter()));
        for definition in command_line
            .definitions
            .iter()
            .chain(self.own_variables())
            .chain(imported)
            .chain(builtin_variables())
        {
            suite_variables.insert_if_absent(Arc::clone(definition));
        }

        let tables = Arc::new(KeywordTables {
            self_doc: self.library_doc(),
            libraries: builder.libraries.values().cloned().collect(),
            resources: builder.resources.values().cloned().collect(),
        });
        let finder = KeywordFinder::new(
            tables,
            Arc::clone(&self.source),
            self.languages.clone(),
            self.config().robot_version,
            self.config().search_order.clone(),
        );

        Ok(NamespaceState {
            libraries: builder.libraries,
            resources: builder.resources,
            variables_imports: builder.variables_imports,
            diagnostics: builder.diagnostics.into_vec(),
            command_line_variables: command_line.definitions.clone(),
            suite_variables,
            finder,
            keywords: OnceLock::new(),
        })
    }

    fn import_default_libraries(
        &self,
        builder: &mut StateBuilder,
        values: &VariableValues,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let with_reserved = self.config().robot_version.has_reserved_library();
        for name in DEFAULT_LIBRARIES {
            if *name == RESERVED_LIBRARY_NAME && !with_reserved {
                continue;
            }
            let doc = match self.imports_manager.get_libdoc_for_library_import(
                name,
                &[],
                self.base_dir(),
                values,
                Some(&self.me),
                cancel,
            ) {
                Ok(doc) => doc,
                Err(Error::Import(e)) => {
                    builder.diagnostics.add(
                        Diagnostic::error(Range::zero(), e.to_string()).with_code(codes::IMPORT_CONTAINS_ERRORS),
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(first) = doc.errors.first() {
                builder.diagnostics.add(
                    Diagnostic::error(
                        Range::zero(),
                        format!("Importing default library '{name}' failed: {first}"),
                    )
                    .with_code(codes::IMPORT_CONTAINS_ERRORS),
                );
            }
            let entry = LibraryEntry {
                import_name: name.to_string(),
                args: Vec::new(),
                alias: None,
                library_doc: doc,
                import: None,
            };
            builder
                .libraries
                .entry(entry.name().to_string())
                .or_insert_with(|| Arc::new(entry));
        }
        Ok(())
    }

    /// Resolve `imports` in source order. `failures` collects what goes wrong
    /// below a top-level import; they are reported on that import.
    #[allow(clippy::too_many_arguments)]
    fn import_all(
        &self,
        builder: &mut StateBuilder,
        imports: &[Import],
        scope: &ImportScope<'_>,
        values: &mut VariableValues,
        chain: &mut Vec<PathBuf>,
        failures: &mut Vec<RelatedInfo>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for import in imports {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let site = import.site();
            let is_top = scope.top.is_none();
            let top_site = scope.top.unwrap_or(site);

            let Some(name) = import.name() else {
                let setting = match import {
                    Import::Library { .. } => "Library",
                    Import::Resource { .. } => "Resource",
                    Import::Variables { .. } => "Variables",
                };
                let message = format!("Setting '{setting}' requires a value.");
                if is_top {
                    builder
                        .diagnostics
                        .add(Diagnostic::error(site.range, message).with_code(codes::IMPORT_REQUIRES_VALUE));
                } else {
                    failures.push(RelatedInfo::new(site.location(), message));
                }
                continue;
            };

            let mut nested_failures = Vec::new();
            let outcome = match import {
                Import::Library { args, alias, .. } => {
                    self.import_library(builder, name, args, alias.as_deref(), site, scope, values, failures, cancel)
                }
                Import::Resource { .. } => {
                    let failures = if is_top { &mut nested_failures } else { &mut *failures };
                    self.import_resource(builder, name, site, top_site, scope, values, chain, failures, cancel)
                }
                Import::Variables { args, .. } => {
                    self.import_variables(builder, name, args, site, scope, values, failures, cancel)
                }
            };

            match outcome {
                Ok(()) => {}
                Err(Error::Import(e)) => {
                    if is_top {
                        builder.diagnostics.add(
                            Diagnostic::error(site.name_range, e.to_string()).with_code(codes::IMPORT_CONTAINS_ERRORS),
                        );
                    } else {
                        failures.push(RelatedInfo::new(site.location(), e.to_string()));
                    }
                }
                Err(e) => return Err(e),
            }

            if is_top && !nested_failures.is_empty() {
                let mut diagnostic = Diagnostic::warning(site.name_range, "Import definition contains errors.")
                    .with_code(codes::IMPORT_CONTAINS_ERRORS);
                for failure in nested_failures {
                    diagnostic = diagnostic.with_related(failure);
                }
                builder.diagnostics.add(diagnostic);
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn import_library(
        &self,
        builder: &mut StateBuilder,
        name: &str,
        args: &[String],
        alias: Option<&str>,
        site: &ImportSite,
        scope: &ImportScope<'_>,
        values: &VariableValues,
        failures: &mut Vec<RelatedInfo>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let doc = self.imports_manager.get_libdoc_for_library_import(
            name,
            args,
            &scope.base_dir,
            values,
            Some(&self.me),
            cancel,
        )?;
        let is_top = scope.top.is_none();
        let entry = LibraryEntry {
            import_name: name.to_string(),
            args: args.to_vec(),
            alias: alias.map(str::to_string),
            library_doc: Arc::clone(&doc),
            import: Some(site.clone()),
        };
        let key = entry.name().to_string();

        if let Some(existing) = builder.libraries.get(&key) {
            let same = Arc::ptr_eq(&existing.library_doc, &doc) && existing.args == entry.args;
            if !same && key != BUILTIN_LIBRARY_NAME {
                debug!("library '{key}' imported again in '{}', replacing the earlier import", self.source);
                return self.insert_library(builder, entry, &doc, site, failures, is_top);
            }
            if is_top && same {
                let mut diagnostic =
                    Diagnostic::info(site.name_range, format!("Library '{}' already imported.", entry.name()))
                        .with_code(codes::LIBRARY_ALREADY_IMPORTED);
                if let Some(location) = existing.import_location() {
                    diagnostic = diagnostic.with_related(RelatedInfo::new(location, "Already imported here."));
                }
                builder.diagnostics.add(diagnostic);
            } else if is_top && key == BUILTIN_LIBRARY_NAME {
                builder.diagnostics.add(
                    Diagnostic::warning(
                        site.name_range,
                        format!(
                            "Library '{}' is not imported, because it would override the '{BUILTIN_LIBRARY_NAME}' library.",
                            entry
                        ),
                    )
                    .with_code(codes::LIBRARY_OVERRIDES_BUILTIN),
                );
            }
            return Ok(());
        }
        self.insert_library(builder, entry, &doc, site, failures, is_top)
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_library(
        &self,
        builder: &mut StateBuilder,
        entry: LibraryEntry,
        doc: &LibraryDoc,
        site: &ImportSite,
        failures: &mut Vec<RelatedInfo>,
        is_top: bool,
    ) -> Result<()> {
        if doc.has_errors() {
            if is_top {
                builder.diagnostics.add(import_errors_diagnostic(site, &doc.errors));
            } else {
                failures.extend(doc.errors.iter().map(|e| RelatedInfo::new(site.location(), e.to_string())));
            }
        } else if is_top && doc.keywords.is_empty() && !doc.has_listener {
            builder.diagnostics.add(
                Diagnostic::warning(
                    site.name_range,
                    format!("Imported library '{}' contains no keywords.", entry.name()),
                )
                .with_code(codes::LIBRARY_CONTAINS_NO_KEYWORDS),
            );
        }

        builder.libraries.insert(entry.name().to_string(), Arc::new(entry));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn import_resource(
        &self,
        builder: &mut StateBuilder,
        name: &str,
        site: &ImportSite,
        top_site: &ImportSite,
        scope: &ImportScope<'_>,
        values: &mut VariableValues,
        chain: &mut Vec<PathBuf>,
        failures: &mut Vec<RelatedInfo>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let is_top = scope.top.is_none();
        let path = normalize_path(&self.imports_manager.find_resource_path(name, &scope.base_dir, values, cancel)?);

        if is_top && path == normalize_path(&self.path) {
            builder.diagnostics.add(
                Diagnostic::info(site.name_range, format!("Resource file '{name}' imports itself."))
                    .with_code(codes::RECURSIVE_IMPORT),
            );
            return Ok(());
        }
        if chain.contains(&path) {
            warn!("possible circular import of '{}' from '{}'", path.display(), self.source);
            builder.diagnostics.add(
                Diagnostic::info(
                    top_site.name_range,
                    format!(
                        "Possible circular import detected, resource file '{}' might cause a circular reference.",
                        path.display()
                    ),
                )
                .with_code(codes::POSSIBLE_CIRCULAR_IMPORT),
            );
            return Ok(());
        }
        if let Some(existing) = builder.resources.get(&path) {
            if is_top {
                let mut diagnostic =
                    Diagnostic::info(site.name_range, format!("Resource '{name}' already imported."))
                        .with_code(codes::RESOURCE_ALREADY_IMPORTED);
                if let Some(location) = existing.import_location() {
                    diagnostic = diagnostic.with_related(RelatedInfo::new(location, "Already imported here."));
                }
                builder.diagnostics.add(diagnostic);
            }
            return Ok(());
        }

        let (namespace, doc) = self.imports_manager.get_resource(&path, Some(&self.me), cancel)?;
        let import_name: Arc<str> = Arc::from(name);
        let entry = ResourceEntry {
            import_name: name.to_string(),
            library_doc: Arc::clone(&doc),
            import: Some(site.clone()),
            imports: namespace.imports().to_vec(),
            variables: doc
                .variables
                .iter()
                .map(|v| Arc::new(VariableDefinition::imported(v, &import_name)))
                .collect(),
        };

        if doc.has_errors() {
            if is_top {
                builder.diagnostics.add(import_errors_diagnostic(site, &doc.errors));
            } else {
                failures.extend(doc.errors.iter().map(|e| RelatedInfo::new(site.location(), e.to_string())));
            }
        } else if is_top && doc.is_empty() {
            builder.diagnostics.add(
                Diagnostic::warning(site.name_range, format!("Imported resource file '{name}' is empty."))
                    .with_code(codes::RESOURCE_EMPTY),
            );
        }

        for variable in &doc.variables {
            if let Some(value) = &variable.value {
                values.insert(&variable.name, value.clone());
            }
        }
        let nested = entry.imports.clone();
        builder.resources.insert(path.clone(), Arc::new(entry));

        let nested_scope = ImportScope {
            base_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            top: Some(top_site),
        };
        chain.push(path);
        let result = self.import_all(builder, &nested, &nested_scope, values, chain, failures, cancel);
        chain.pop();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn import_variables(
        &self,
        builder: &mut StateBuilder,
        name: &str,
        args: &[String],
        site: &ImportSite,
        scope: &ImportScope<'_>,
        values: &mut VariableValues,
        failures: &mut Vec<RelatedInfo>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let doc = self.imports_manager.get_variables_doc_for_variables_import(
            name,
            args,
            &scope.base_dir,
            values,
            Some(&self.me),
            cancel,
        )?;
        let is_top = scope.top.is_none();
        let key = format!(
            "{}|{}",
            doc.source.as_deref().unwrap_or(&doc.name),
            args.join("|")
        );

        if let Some(existing) = builder.variables_imports.get(&key) {
            if is_top {
                let mut diagnostic =
                    Diagnostic::info(site.name_range, format!("Variables '{name}' already imported."))
                        .with_code(codes::VARIABLES_ALREADY_IMPORTED);
                if let Some(location) = existing.import_location() {
                    diagnostic = diagnostic.with_related(RelatedInfo::new(location, "Already imported here."));
                }
                builder.diagnostics.add(diagnostic);
            }
            return Ok(());
        }

        if doc.has_errors() {
            if is_top {
                builder.diagnostics.add(import_errors_diagnostic(site, &doc.errors));
            } else {
                failures.extend(doc.errors.iter().map(|e| RelatedInfo::new(site.location(), e.to_string())));
            }
        }

        let import_name: Arc<str> = Arc::from(name);
        for variable in &doc.variables {
            if let Some(value) = &variable.value {
                values.insert(&variable.name, value.clone());
            }
        }
        let entry = VariablesEntry {
            import_name: name.to_string(),
            args: args.to_vec(),
            variables: doc
                .variables
                .iter()
                .map(|v| Arc::new(VariableDefinition::imported(v, &import_name)))
                .collect(),
            variables_doc: doc,
            import: Some(site.clone()),
        };
        builder.variables_imports.insert(key, Arc::new(entry));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------------

    /// Analyze the document once per generation.
    ///
    /// A cancelled run caches nothing.
    pub fn analyze(&self, cancel: &CancellationToken) -> Result<Arc<Analysis>> {
        if let Some(analysis) = &*self.analysis.lock() {
            return Ok(Arc::clone(analysis));
        }
        let _guard = self.analyze_lock.lock();
        if let Some(analysis) = &*self.analysis.lock() {
            return Ok(Arc::clone(analysis));
        }

        let generation = self.generation();
        let state = self.ensure_initialized(cancel)?;
        let result = NamespaceAnalyzer::new(self, &state, cancel).run()?;

        let mut diagnostics = state.diagnostics.clone();
        diagnostics.extend(result.diagnostics.iter().cloned());
        let modifier = DiagnosticsModifier::new(&self.model, &self.config().diagnostic_modifiers);
        let analysis = Arc::new(Analysis {
            diagnostics: modifier.apply(diagnostics),
            result,
        });

        if self.generation() == generation {
            *self.analysis.lock() = Some(Arc::clone(&analysis));
            debug!(
                "namespace '{}' analyzed: {} diagnostics",
                self.source,
                analysis.diagnostics.len()
            );
            if let Some(me) = self.me.upgrade() {
                self.has_analyzed.emit(&me);
            }
        } else {
            debug!("discarding analysis of invalidated namespace '{}'", self.source);
        }
        Ok(analysis)
    }

    pub fn get_diagnostics(&self, cancel: &CancellationToken) -> Result<Vec<Diagnostic>> {
        Ok(self.analyze(cancel)?.diagnostics.clone())
    }

    pub fn get_keyword_references(&self, cancel: &CancellationToken) -> Result<IndexMap<KeywordKey, KeywordReferences>> {
        Ok(self.analyze(cancel)?.result.keyword_references.clone())
    }

    pub fn get_variable_references(
        &self,
        cancel: &CancellationToken,
    ) -> Result<IndexMap<Arc<VariableDefinition>, Vec<Location>>> {
        Ok(self.analyze(cancel)?.result.variable_references.clone())
    }

    pub fn get_local_variable_assignments(
        &self,
        cancel: &CancellationToken,
    ) -> Result<IndexMap<Arc<VariableDefinition>, Vec<Location>>> {
        Ok(self.analyze(cancel)?.result.local_variable_assignments.clone())
    }

    /// Locations of the owner part of `Owner.Keyword` calls, by owner name.
    pub fn get_namespace_references(&self, cancel: &CancellationToken) -> Result<IndexMap<Arc<str>, Vec<Location>>> {
        Ok(self.analyze(cancel)?.result.namespace_references.clone())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn get_libraries(&self, cancel: &CancellationToken) -> Result<Vec<Arc<LibraryEntry>>> {
        Ok(self.ensure_initialized(cancel)?.libraries.values().cloned().collect())
    }

    pub fn get_resources(&self, cancel: &CancellationToken) -> Result<Vec<Arc<ResourceEntry>>> {
        Ok(self.ensure_initialized(cancel)?.resources.values().cloned().collect())
    }

    pub fn get_variables_imports(&self, cancel: &CancellationToken) -> Result<Vec<Arc<VariablesEntry>>> {
        Ok(self
            .ensure_initialized(cancel)?
            .variables_imports
            .values()
            .cloned()
            .collect())
    }

    pub fn get_keywords(&self, cancel: &CancellationToken) -> Result<Vec<Arc<KeywordDoc>>> {
        Ok(self.ensure_initialized(cancel)?.keywords().to_vec())
    }

    /// Resolve a call name with the configured search order.
    pub fn keyword_lookup(&self, name: &str, handle_bdd: bool, cancel: &CancellationToken) -> Result<KeywordLookup> {
        Ok(self.ensure_initialized(cancel)?.finder.find_keyword(name, handle_bdd))
    }

    /// The keyword a call named `name` refers to.
    ///
    /// With `raise_on_error`, a failed lookup is an [`Error::Keyword`]
    /// carrying the diagnostic message instead of `None`.
    pub fn find_keyword(
        &self,
        name: &str,
        raise_on_error: bool,
        handle_bdd: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<KeywordDoc>>> {
        let lookup = self.keyword_lookup(name, handle_bdd, cancel)?;
        match (&lookup.keyword, raise_on_error) {
            (None, true) => Err(Error::Keyword(
                lookup
                    .error_message()
                    .unwrap_or("Keyword not found.")
                    .to_string(),
            )),
            _ => Ok(lookup.keyword),
        }
    }

    /// The definition `name` refers to.
    ///
    /// `scope` is the name range of the test or keyword the caller is in;
    /// without it, the definition containing `position` is used. Inside a
    /// definition, arguments and locals assigned before `position` are
    /// visible; after them come the suite variables.
    pub fn find_variable(
        &self,
        name: &str,
        scope: Option<Range>,
        position: Option<Position>,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<VariableDefinition>>> {
        if let Some(env) = name.strip_prefix("%{").and_then(|n| n.strip_suffix('}')) {
            let (env_name, default) = match env.split_once('=') {
                Some((n, default)) => (n, Some(default)),
                None => (env, None),
            };
            let defined = default.is_some() || self.has_environment_variable(env_name);
            return Ok(defined.then(|| Arc::new(VariableDefinition::environment(&format!("%{{{env_name}}}")))));
        }

        if scope.is_some() || position.is_some() {
            let analysis = self.analyze(cancel)?;
            let block = analysis.result.scopes.iter().find(|s| match (scope, position) {
                (Some(range), _) => s.name_range == range,
                (None, Some(position)) => s.range.contains(position),
                (None, None) => false,
            });
            if let Some(block) = block {
                let local = block
                    .variables
                    .iter()
                    .rev()
                    .filter(|d| d.matches(name))
                    .find(|d| d.kind.is_argument() || position.is_none_or(|p| d.range.start <= p));
                if let Some(local) = local {
                    return Ok(Some(Arc::clone(local)));
                }
            }
        }

        Ok(self.ensure_initialized(cancel)?.suite_variables.find(name).cloned())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

#[derive(Default)]
struct StateBuilder {
    libraries: IndexMap<String, Arc<LibraryEntry>>,
    resources: IndexMap<PathBuf, Arc<ResourceEntry>>,
    variables_imports: IndexMap<String, Arc<VariablesEntry>>,
    diagnostics: DiagnosticCollector,
}

/// Where imports of one file are resolved from.
struct ImportScope<'a> {
    base_dir: PathBuf,
    /// The document's own import this nested file was reached through.
    top: Option<&'a ImportSite>,
}

fn import_errors_diagnostic(site: &ImportSite, errors: &[crate::library::LibraryError]) -> Diagnostic {
    let message = match errors {
        [single] => single.to_string(),
        _ => "Import definition contains errors.".to_string(),
    };
    let mut diagnostic = Diagnostic::error(site.name_range, message).with_code(codes::IMPORT_CONTAINS_ERRORS);
    for error in errors {
        if let Some(source) = &error.source {
            let line = error.line_no.unwrap_or(1).saturating_sub(1);
            diagnostic = diagnostic.with_related(RelatedInfo::new(
                Location::new(source.as_str(), Range::from_coords(line, 0, line, 0)),
                error.to_string(),
            ));
        }
    }
    diagnostic
}

/// The definition a `*** Variables ***` row declares.
pub(super) fn suite_variable(statement: &Statement, source: &Arc<str>) -> Option<VariableDefinition> {
    if !statement.errors.is_empty() {
        return None;
    }
    let token = statement.get_token(TokenKind::Variable)?;
    let name = strip_assign_mark(&token.value);
    let value = statement
        .get_tokens(TokenKind::Argument)
        .map(|t| t.value.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let range = token.slice(TokenKind::Variable, 0, name.len()).range();
    Some(VariableDefinition::new(VariableKind::Suite, name, range, Some(Arc::clone(source))).with_value(value))
}
