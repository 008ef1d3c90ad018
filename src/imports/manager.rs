//! The process-wide cache of imported libraries, resources and variable files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::NamespaceFactory;
use super::entry::{EntryKey, EntryState, ImportEntry, Watched};
use super::resolve::{
    VariableValues, find_file, find_resource, find_variables, is_library_path, replace_import_variables,
};
use super::watcher::{
    FileChange, FileChangeKind, FileWatcherManager, NoopFileWatcherManager, WatchCallback, WatchHandle,
};
use crate::base::constants::{RESOURCE_EXTENSIONS, VARIABLES_EXTENSIONS};
use crate::base::{normalize_path, resolve_against};
use crate::cache::{CacheSection, DataCache, FileDataCache, LibraryMetaData};
use crate::config::AnalysisConfig;
use crate::documents::{DocumentsManager, TextDocument};
use crate::error::{Error, ImportError, Result};
use crate::events::{EventEmitter, ListenerId};
use crate::library::{ImportedVariable, LibraryDoc, LibraryError, LibraryKind, VariablesDoc};
use crate::loader::{
    Completion, CompletionRequest, ImportKind, ImportRequest, LibraryLoader, ProcessLoader,
    complete_from_filesystem,
};
use crate::model::is_variable;
use crate::namespace::{Namespace, VariableDefinition, VariableKind};

type EntryTable<D> = Mutex<IndexMap<EntryKey, Arc<ImportEntry<D>>>>;

type ResourceValue = (Arc<Namespace>, Arc<LibraryDoc>);

/// Command line variables, computed once per manager.
#[derive(Debug, Default)]
pub struct CommandLineVariables {
    pub definitions: Vec<Arc<VariableDefinition>>,
    /// Values for replacing variables in import names.
    pub values: VariableValues,
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct ImportsManagerBuilder {
    config: AnalysisConfig,
    root_dir: PathBuf,
    documents: Arc<DocumentsManager>,
    loader: Option<Arc<dyn LibraryLoader>>,
    data_cache: Option<Arc<dyn DataCache>>,
    use_data_cache: bool,
    file_watcher: Option<Arc<dyn FileWatcherManager>>,
}

impl ImportsManagerBuilder {
    pub fn with_loader(mut self, loader: Arc<dyn LibraryLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_data_cache(mut self, data_cache: Arc<dyn DataCache>) -> Self {
        self.data_cache = Some(data_cache);
        self.use_data_cache = true;
        self
    }

    /// Never read or write descriptors on disk.
    pub fn without_data_cache(mut self) -> Self {
        self.data_cache = None;
        self.use_data_cache = false;
        self
    }

    pub fn with_file_watcher(mut self, file_watcher: Arc<dyn FileWatcherManager>) -> Self {
        self.file_watcher = Some(file_watcher);
        self
    }

    pub fn build(self) -> Arc<ImportsManager> {
        let root_dir = normalize_path(&self.root_dir);
        let python_path = self
            .config
            .python_path
            .iter()
            .map(|p| resolve_against(&root_dir, p))
            .collect();
        let data_cache = match (self.data_cache, self.use_data_cache) {
            (Some(cache), _) => Some(cache),
            (None, true) => {
                Some(Arc::new(FileDataCache::new(self.config.cache_root(&root_dir))) as Arc<dyn DataCache>)
            }
            (None, false) => None,
        };
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(ProcessLoader::from_config(&self.config)));
        let file_watcher = self
            .file_watcher
            .unwrap_or_else(|| Arc::new(NoopFileWatcherManager::default()));
        let ignored_cache_arguments = self.config.ignored_cache_argument_patterns();

        let manager = Arc::new_cyclic(|me| ImportsManager {
            me: Weak::clone(me),
            config: self.config,
            root_dir,
            python_path,
            documents: self.documents,
            loader,
            data_cache,
            file_watcher,
            ignored_cache_arguments,
            namespace_factory: RwLock::new(None),
            command_line_variables: Mutex::new(None),
            libraries: Mutex::new(IndexMap::new()),
            resources: Mutex::new(IndexMap::new()),
            variables: Mutex::new(IndexMap::new()),
            document_listener: Mutex::new(None),
            libraries_changed: EventEmitter::new(),
            resources_changed: EventEmitter::new(),
            variables_changed: EventEmitter::new(),
            imports_changed: EventEmitter::new(),
        });

        let weak = Arc::downgrade(&manager);
        let listener = manager.documents.document_changed.subscribe(move |document| {
            if let Some(manager) = weak.upgrade() {
                manager.resource_document_changed(document);
            }
        });
        *manager.document_listener.lock() = Some(listener);
        manager
    }
}

// ============================================================================
// MANAGER
// ============================================================================

/// Deduplicates imports across the workspace.
///
/// Three tables (libraries, resources, variable files) map a resolved
/// import to its descriptor. A table lock is held only to find or create
/// an entry; loading holds the entry's own lock. Entries are invalidated
/// by file changes below the paths they watch, and the `*_changed` events
/// carry the descriptors that were dropped so namespaces using them can
/// invalidate themselves.
pub struct ImportsManager {
    me: Weak<ImportsManager>,
    config: AnalysisConfig,
    root_dir: PathBuf,
    /// `config.python_path`, absolute.
    python_path: Vec<PathBuf>,
    documents: Arc<DocumentsManager>,
    loader: Arc<dyn LibraryLoader>,
    data_cache: Option<Arc<dyn DataCache>>,
    file_watcher: Arc<dyn FileWatcherManager>,
    ignored_cache_arguments: Vec<Regex>,
    namespace_factory: RwLock<Option<Weak<dyn NamespaceFactory>>>,
    command_line_variables: Mutex<Option<Arc<CommandLineVariables>>>,
    libraries: EntryTable<Arc<LibraryDoc>>,
    resources: EntryTable<ResourceValue>,
    variables: EntryTable<Arc<VariablesDoc>>,
    document_listener: Mutex<Option<ListenerId>>,

    pub libraries_changed: EventEmitter<Vec<Arc<LibraryDoc>>>,
    pub resources_changed: EventEmitter<Vec<Arc<LibraryDoc>>>,
    pub variables_changed: EventEmitter<Vec<Arc<VariablesDoc>>>,
    /// A file that may be imported was created or deleted.
    pub imports_changed: EventEmitter<()>,
}

impl std::fmt::Debug for ImportsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportsManager")
            .field("root_dir", &self.root_dir)
            .field("libraries", &self.libraries.lock().len())
            .field("resources", &self.resources.lock().len())
            .field("variables", &self.variables.lock().len())
            .finish()
    }
}

impl ImportsManager {
    pub fn builder(
        config: AnalysisConfig,
        root_dir: impl Into<PathBuf>,
        documents: Arc<DocumentsManager>,
    ) -> ImportsManagerBuilder {
        ImportsManagerBuilder {
            config,
            root_dir: root_dir.into(),
            documents,
            loader: None,
            data_cache: None,
            use_data_cache: true,
            file_watcher: None,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn python_path(&self) -> &[PathBuf] {
        &self.python_path
    }

    pub fn documents(&self) -> &Arc<DocumentsManager> {
        &self.documents
    }

    /// Register who builds namespaces for resource documents.
    pub fn set_namespace_factory(&self, factory: Weak<dyn NamespaceFactory>) {
        *self.namespace_factory.write() = Some(factory);
    }

    fn namespace_factory(&self) -> Result<Arc<dyn NamespaceFactory>> {
        self.namespace_factory
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| Error::invalid_state("no namespace factory registered"))
    }

    pub fn library_entry_count(&self) -> usize {
        self.libraries.lock().len()
    }

    pub fn resource_entry_count(&self) -> usize {
        self.resources.lock().len()
    }

    pub fn variables_entry_count(&self) -> usize {
        self.variables.lock().len()
    }

    // ------------------------------------------------------------------------
    // Command line variables
    // ------------------------------------------------------------------------

    /// `-v` variables and the content of `--variablefile`s, loaded on first use.
    pub fn command_line_variables(&self, cancel: &CancellationToken) -> Result<Arc<CommandLineVariables>> {
        let mut slot = self.command_line_variables.lock();
        if let Some(variables) = &*slot {
            return Ok(Arc::clone(variables));
        }
        let variables = Arc::new(self.load_command_line_variables(cancel)?);
        *slot = Some(Arc::clone(&variables));
        Ok(variables)
    }

    fn load_command_line_variables(&self, cancel: &CancellationToken) -> Result<CommandLineVariables> {
        let mut result = CommandLineVariables::default();
        for (name, value) in &self.config.variables {
            let name = if is_variable(name) {
                name.clone()
            } else {
                format!("${{{name}}}")
            };
            result
                .definitions
                .push(Arc::new(VariableDefinition::command_line(&name, value)));
            result.values.insert(&name, value.clone());
        }

        for spec in &self.config.variable_files {
            let (name, args) = split_variable_file_spec(spec);
            let file = match find_variables(&name, &self.root_dir, &self.python_path) {
                Ok(file) => file,
                Err(error) => {
                    warn!("command line variable file '{}': {}", spec, error);
                    continue;
                }
            };
            let doc = self.load_variables(&name, file.as_deref(), &args, &self.root_dir, &result.values, cancel)?;
            for error in &doc.errors {
                warn!("command line variable file '{}': {}", spec, error);
            }
            for variable in &doc.variables {
                let mut definition = VariableDefinition::new(
                    VariableKind::CommandLine,
                    &variable.name,
                    variable.range,
                    variable.source.as_deref().map(Arc::from),
                );
                if let Some(value) = &variable.value {
                    definition = definition.with_value(value.as_str());
                    result.values.insert(&variable.name, value.clone());
                }
                result.definitions.push(Arc::new(definition));
            }
        }
        debug!("{} command line variables", result.definitions.len());
        Ok(result)
    }

    /// Caller variables overlaid with command line values.
    fn import_values(&self, variables: &VariableValues, cancel: &CancellationToken) -> Result<VariableValues> {
        let mut values = variables.clone();
        values.extend(&self.command_line_variables(cancel)?.values);
        Ok(values)
    }

    fn replace(&self, name: &str, base_dir: &Path, values: &VariableValues) -> Result<String, ImportError> {
        if name.trim().is_empty() {
            return Err(ImportError::EmptyName);
        }
        replace_import_variables(name, base_dir, values, &self.config.env)
    }

    /// Arguments that cannot be resolved are passed on as written.
    fn replace_args(&self, args: &[String], base_dir: &Path, values: &VariableValues) -> Vec<String> {
        args.iter()
            .map(|arg| {
                replace_import_variables(arg, base_dir, values, &self.config.env)
                    .unwrap_or_else(|_| arg.clone())
            })
            .collect()
    }

    fn import_request(
        &self,
        name: &str,
        args: &[String],
        base_dir: &Path,
        values: &VariableValues,
    ) -> ImportRequest {
        let mut request = ImportRequest::new(name, base_dir).with_args(args.to_vec());
        request.working_dir = self.root_dir.clone();
        request.command_line_variables = self.config.variables.clone();
        request.variables = values.to_map();
        request
    }

    // ------------------------------------------------------------------------
    // Libraries
    // ------------------------------------------------------------------------

    /// The descriptor of `Library  name  args...` imported from `base_dir`.
    ///
    /// Load failures are reported inside the descriptor. Only an
    /// unresolvable name, cancellation and internal errors fail the call.
    pub fn get_libdoc_for_library_import(
        &self,
        name: &str,
        args: &[String],
        base_dir: &Path,
        variables: &VariableValues,
        importer: Option<&Weak<Namespace>>,
        cancel: &CancellationToken,
    ) -> Result<Arc<LibraryDoc>> {
        let values = self.import_values(variables, cancel)?;
        let resolved = self.replace(name, base_dir, &values)?;
        let args = self.replace_args(args, base_dir, &values);
        let by_path = is_library_path(&resolved);
        let file = if by_path {
            find_file(&resolved, base_dir, &self.python_path)
        } else {
            None
        };
        let key_name = match &file {
            Some(path) => path.to_string_lossy().into_owned(),
            None => resolved.clone(),
        };

        let entry = entry_for(&self.libraries, EntryKey::new(key_name, args.clone()));
        let mut state = entry.lock();
        if let Some(importer) = importer {
            state.add_importer(importer);
        }
        if let Some(doc) = &state.value {
            return Ok(Arc::clone(doc));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let doc = Arc::new(self.load_library(&resolved, file.as_deref(), by_path, &args, base_dir, &values, cancel)?);
        let watched = self.library_watched(&doc, file.as_deref(), base_dir);
        self.watch(&mut state, watched);
        state.value = Some(Arc::clone(&doc));
        Ok(doc)
    }

    #[allow(clippy::too_many_arguments)]
    fn load_library(
        &self,
        name: &str,
        file: Option<&Path>,
        by_path: bool,
        args: &[String],
        base_dir: &Path,
        values: &VariableValues,
        cancel: &CancellationToken,
    ) -> Result<LibraryDoc> {
        if by_path && file.is_none() {
            return Ok(LibraryDoc::from_error(
                name,
                LibraryKind::Library,
                None,
                LibraryError::new(format!(
                    "Importing library '{name}' failed: File or directory does not exist."
                )),
            ));
        }
        let import_name = match file {
            Some(path) => path.to_string_lossy().into_owned(),
            None => name.to_string(),
        };
        let cacheable = args.is_empty() || self.ignored_cache_arguments.iter().any(|p| p.is_match(name));
        let cache_base = cache_base(&import_name, file, by_path);

        if cacheable {
            if let Some(doc) =
                self.read_cached::<LibraryDoc>(CacheSection::Library, &cache_base, &import_name, by_path)
            {
                return Ok(doc);
            }
        }

        let request = self.import_request(&import_name, args, base_dir, values);
        let started = Instant::now();
        let doc = match self.loader.load_library(&request, cancel) {
            Ok(doc) => doc,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(error) => {
                warn!("loading library '{}' failed: {}", import_name, error);
                LibraryDoc::from_error(
                    name,
                    LibraryKind::Library,
                    file.map(|p| p.to_string_lossy().into_owned()),
                    LibraryError::new(format!("Importing library '{name}' failed: {error}")),
                )
            }
        };
        info!(
            "loaded library '{}' ({} keywords) in {:.2?}",
            import_name,
            doc.keywords.len(),
            started.elapsed()
        );

        if cacheable && !doc.has_errors() {
            let locations: Vec<PathBuf> = doc.module_search_paths.iter().map(PathBuf::from).collect();
            self.write_cached(
                CacheSection::Library,
                &cache_base,
                &import_name,
                doc.source.as_deref().map(Path::new),
                &locations,
                by_path,
                &doc,
            );
        }
        Ok(doc)
    }

    /// Origin and package directories when known, else every place the library could appear.
    fn library_watched(&self, doc: &LibraryDoc, file: Option<&Path>, base_dir: &Path) -> Watched {
        let origin = doc
            .source
            .as_deref()
            .map(PathBuf::from)
            .or_else(|| file.map(Path::to_path_buf));
        match origin {
            Some(origin) => Watched {
                origin: Some(normalize_path(&origin)),
                dirs: doc
                    .module_search_paths
                    .iter()
                    .map(|p| normalize_path(Path::new(p)))
                    .collect(),
            },
            None => Watched {
                origin: None,
                dirs: self.unresolved_watch_dirs(base_dir),
            },
        }
    }

    fn unresolved_watch_dirs(&self, base_dir: &Path) -> Vec<PathBuf> {
        let mut dirs = vec![normalize_path(base_dir)];
        for dir in &self.python_path {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
        dirs
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    /// Resolve the name of a resource import to an existing resource file.
    pub fn find_resource_path(
        &self,
        name: &str,
        base_dir: &Path,
        variables: &VariableValues,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let values = self.import_values(variables, cancel)?;
        let resolved = self.replace(name, base_dir, &values)?;
        Ok(find_resource(&resolved, base_dir, &self.python_path)?)
    }

    /// Namespace and descriptor of `Resource  name`.
    pub fn get_namespace_and_libdoc_for_resource_import(
        &self,
        name: &str,
        base_dir: &Path,
        variables: &VariableValues,
        importer: Option<&Weak<Namespace>>,
        cancel: &CancellationToken,
    ) -> Result<(Arc<Namespace>, Arc<LibraryDoc>)> {
        let path = self.find_resource_path(name, base_dir, variables, cancel)?;
        self.get_resource(&path, importer, cancel)
    }

    /// Namespace and descriptor of the resource file at `path`.
    pub fn get_resource(
        &self,
        path: &Path,
        importer: Option<&Weak<Namespace>>,
        cancel: &CancellationToken,
    ) -> Result<(Arc<Namespace>, Arc<LibraryDoc>)> {
        let path = normalize_path(path);
        let key = EntryKey::new(path.to_string_lossy(), Vec::new());
        let entry = entry_for(&self.resources, key);
        let mut state = entry.lock();
        if let Some(importer) = importer {
            state.add_importer(importer);
        }
        if let Some(value) = &state.value {
            return Ok(value.clone());
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let document = self
            .documents
            .get_or_open_from_disk(&path)
            .map_err(|_| ImportError::ResourceNotFound(path.to_string_lossy().into_owned()))?;
        let namespace = self.namespace_factory()?.namespace_for(&document)?;
        let doc = namespace.library_doc();
        if doc.kind != LibraryKind::Resource {
            return Err(ImportError::InvalidResource {
                path,
                reason: "Resource file with 'Test Cases' section is invalid.".to_string(),
            }
            .into());
        }
        debug!("resource '{}' loaded", document.source());

        self.watch(
            &mut state,
            Watched {
                origin: Some(path),
                dirs: Vec::new(),
            },
        );
        state.value = Some((Arc::clone(&namespace), Arc::clone(&doc)));
        Ok((namespace, doc))
    }

    fn resource_document_changed(&self, document: &Arc<TextDocument>) {
        let key = EntryKey::new(document.path().to_string_lossy(), Vec::new());
        let Some(entry) = self.resources.lock().get(&key).cloned() else {
            return;
        };
        if let Some((_, doc)) = entry.invalidate() {
            debug!("resource '{}' changed", document.source());
            self.resources_changed.emit(&vec![doc]);
        }
    }

    // ------------------------------------------------------------------------
    // Variable files
    // ------------------------------------------------------------------------

    /// The descriptor of `Variables  name  args...`.
    pub fn get_variables_doc_for_variables_import(
        &self,
        name: &str,
        args: &[String],
        base_dir: &Path,
        variables: &VariableValues,
        importer: Option<&Weak<Namespace>>,
        cancel: &CancellationToken,
    ) -> Result<Arc<VariablesDoc>> {
        let values = self.import_values(variables, cancel)?;
        let resolved = self.replace(name, base_dir, &values)?;
        let args = self.replace_args(args, base_dir, &values);
        let file = find_variables(&resolved, base_dir, &self.python_path)?;
        let key_name = match &file {
            Some(path) => path.to_string_lossy().into_owned(),
            None => resolved.clone(),
        };

        let entry = entry_for(&self.variables, EntryKey::new(key_name, args.clone()));
        let mut state = entry.lock();
        if let Some(importer) = importer {
            state.add_importer(importer);
        }
        if let Some(doc) = &state.value {
            return Ok(Arc::clone(doc));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let doc = Arc::new(self.load_variables(&resolved, file.as_deref(), &args, base_dir, &values, cancel)?);
        let origin = file.or_else(|| doc.source.as_deref().map(PathBuf::from));
        let watched = match origin {
            Some(origin) => Watched {
                origin: Some(normalize_path(&origin)),
                dirs: Vec::new(),
            },
            None => Watched {
                origin: None,
                dirs: self.unresolved_watch_dirs(base_dir),
            },
        };
        self.watch(&mut state, watched);
        state.value = Some(Arc::clone(&doc));
        Ok(doc)
    }

    fn load_variables(
        &self,
        name: &str,
        file: Option<&Path>,
        args: &[String],
        base_dir: &Path,
        values: &VariableValues,
        cancel: &CancellationToken,
    ) -> Result<VariablesDoc> {
        if let Some(path) = file {
            if args.is_empty() && has_extension(path, "json") {
                return Ok(json_variables(name, path));
            }
        }
        let import_name = match file {
            Some(path) => path.to_string_lossy().into_owned(),
            None => name.to_string(),
        };
        let by_path = file.is_some();
        let cacheable = args.is_empty();
        let cache_base = cache_base(&import_name, file, by_path);

        if cacheable {
            if let Some(doc) =
                self.read_cached::<VariablesDoc>(CacheSection::Variables, &cache_base, &import_name, by_path)
            {
                return Ok(doc);
            }
        }

        let request = self.import_request(&import_name, args, base_dir, values);
        let started = Instant::now();
        let doc = match self.loader.load_variables(&request, cancel) {
            Ok(doc) => doc,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(error) => {
                warn!("loading variables '{}' failed: {}", import_name, error);
                VariablesDoc::from_error(
                    name,
                    file.map(|p| p.to_string_lossy().into_owned()),
                    LibraryError::new(format!("Processing variable file '{name}' failed: {error}")),
                )
            }
        };
        info!(
            "loaded variables '{}' ({} variables) in {:.2?}",
            import_name,
            doc.variables.len(),
            started.elapsed()
        );

        if cacheable && !doc.has_errors() {
            self.write_cached(
                CacheSection::Variables,
                &cache_base,
                &import_name,
                doc.source.as_deref().map(Path::new),
                &[],
                by_path,
                &doc,
            );
        }
        Ok(doc)
    }

    // ------------------------------------------------------------------------
    // Disk cache
    // ------------------------------------------------------------------------

    fn read_cached<T: DeserializeOwned>(
        &self,
        section: CacheSection,
        base: &str,
        name: &str,
        by_path: bool,
    ) -> Option<T> {
        let cache = self.data_cache.as_ref()?;
        let meta_entry = format!("{base}.meta");
        if !cache.exists(section, &meta_entry) {
            debug!("cache miss {}/{}", section.dir_name(), base);
            return None;
        }
        let meta: LibraryMetaData = match cache.read(section, &meta_entry) {
            Ok(meta) => meta,
            Err(error) => {
                warn!("{}", error);
                return None;
            }
        };
        if meta.name != name || meta.by_path != by_path || !meta.is_valid() {
            debug!("cache entry {}/{} is stale", section.dir_name(), base);
            return None;
        }
        match cache.read::<T>(section, &format!("{base}.spec")) {
            Ok(doc) => {
                debug!("cache hit {}/{}", section.dir_name(), base);
                Some(doc)
            }
            Err(error) => {
                warn!("{}", error);
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_cached<T: Serialize>(
        &self,
        section: CacheSection,
        base: &str,
        name: &str,
        origin: Option<&Path>,
        locations: &[PathBuf],
        by_path: bool,
        doc: &T,
    ) {
        let Some(cache) = &self.data_cache else {
            return;
        };
        // without an origin the entry could never be validated
        if origin.is_none() {
            return;
        }
        let meta = LibraryMetaData::new(name, None, origin, locations, by_path);
        let written = cache
            .write(section, &format!("{base}.spec"), doc)
            .and_then(|()| cache.write(section, &format!("{base}.meta"), &meta));
        if let Err(error) = written {
            warn!("cannot write cache entry {}/{}: {}", section.dir_name(), base, error);
        }
    }

    // ------------------------------------------------------------------------
    // File changes
    // ------------------------------------------------------------------------

    fn watch<D>(&self, state: &mut EntryState<D>, watched: Watched) {
        if let Some(handle) = state.watch.take() {
            self.file_watcher.remove_file_watchers(handle);
        }
        let paths = watched.watch_paths();
        if !paths.is_empty() {
            let me = Weak::clone(&self.me);
            let callback: WatchCallback = Arc::new(move |changes: &[FileChange]| {
                if let Some(manager) = me.upgrade() {
                    manager.watched_files_changed(changes);
                }
            });
            state.watch = Some(self.file_watcher.add_file_watchers(&paths, callback));
        }
        state.watched = watched;
    }

    /// The client reported changed files.
    pub fn did_change_watched_files(&self, changes: &[FileChange]) {
        self.watched_files_changed(changes);
        if changes
            .iter()
            .any(|c| c.kind != FileChangeKind::Changed && is_importable_file(&c.path))
        {
            self.imports_changed.emit(&());
        }
    }

    fn watched_files_changed(&self, changes: &[FileChange]) {
        for change in changes {
            self.documents.file_changed_on_disk(&change.path);
        }
        let paths = || changes.iter().map(|c| c.path.as_path());

        let libraries = invalidate_affected(&self.libraries, paths);
        if !libraries.is_empty() {
            debug!("{} libraries changed", libraries.len());
            self.libraries_changed.emit(&libraries);
        }
        let resources: Vec<Arc<LibraryDoc>> = invalidate_affected(&self.resources, paths)
            .into_iter()
            .map(|(_, doc)| doc)
            .collect();
        if !resources.is_empty() {
            self.resources_changed.emit(&resources);
        }
        let variables = invalidate_affected(&self.variables, paths);
        if !variables.is_empty() {
            debug!("{} variable files changed", variables.len());
            self.variables_changed.emit(&variables);
        }
    }

    /// Drop entries no living namespace imports and stop watching their files.
    pub fn remove_unused_entries(&self) -> usize {
        let removed = self.prune(&self.libraries) + self.prune(&self.resources) + self.prune(&self.variables);
        if removed > 0 {
            debug!("removed {} unused import entries", removed);
        }
        removed
    }

    fn prune<D: Clone>(&self, table: &EntryTable<D>) -> usize {
        let mut handles = Vec::new();
        let removed = {
            let mut table = table.lock();
            let before = table.len();
            table.retain(|_, entry| {
                if entry.is_unused() {
                    handles.extend(entry.take_watch());
                    false
                } else {
                    true
                }
            });
            before - table.len()
        };
        for handle in handles {
            self.file_watcher.remove_file_watchers(handle);
        }
        removed
    }

    /// Forget every loaded entry; the next imports load again.
    pub fn clear_cache(&self) {
        for handle in self.take_all_watches() {
            self.file_watcher.remove_file_watchers(handle);
        }
        self.libraries.lock().clear();
        self.resources.lock().clear();
        self.variables.lock().clear();
        *self.command_line_variables.lock() = None;
        self.imports_changed.emit(&());
    }

    fn take_all_watches(&self) -> Vec<WatchHandle> {
        fn take<D: Clone>(table: &EntryTable<D>) -> Vec<WatchHandle> {
            let entries: Vec<_> = table.lock().values().cloned().collect();
            entries.iter().filter_map(|e| e.take_watch()).collect()
        }
        let mut handles = take(&self.libraries);
        handles.extend(take(&self.resources));
        handles.extend(take(&self.variables));
        handles
    }

    // ------------------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------------------

    pub fn complete_library_import(
        &self,
        prefix: &str,
        base_dir: &Path,
        variables: &VariableValues,
        cancel: &CancellationToken,
    ) -> Result<Vec<Completion>> {
        self.complete_import(ImportKind::Library, prefix, base_dir, variables, cancel)
    }

    pub fn complete_resource_import(
        &self,
        prefix: &str,
        base_dir: &Path,
        variables: &VariableValues,
        cancel: &CancellationToken,
    ) -> Result<Vec<Completion>> {
        self.complete_import(ImportKind::Resource, prefix, base_dir, variables, cancel)
    }

    pub fn complete_variables_import(
        &self,
        prefix: &str,
        base_dir: &Path,
        variables: &VariableValues,
        cancel: &CancellationToken,
    ) -> Result<Vec<Completion>> {
        self.complete_import(ImportKind::Variables, prefix, base_dir, variables, cancel)
    }

    /// Ask the loader first; fall back to scanning the file system.
    fn complete_import(
        &self,
        kind: ImportKind,
        prefix: &str,
        base_dir: &Path,
        variables: &VariableValues,
        cancel: &CancellationToken,
    ) -> Result<Vec<Completion>> {
        let values = self.import_values(variables, cancel)?;
        let prefix = replace_import_variables(prefix, base_dir, &values, &self.config.env)
            .unwrap_or_else(|_| prefix.to_string());
        let request = CompletionRequest {
            import_kind: kind,
            prefix: prefix.clone(),
            base_dir: base_dir.to_path_buf(),
            variables: values.to_map(),
        };
        match self.loader.complete_import(&request, cancel) {
            Ok(items) if !items.is_empty() => return Ok(items),
            Ok(_) => {}
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(error) => debug!("loader completion failed, scanning file system: {}", error),
        }
        Ok(complete_from_filesystem(kind, &prefix, base_dir, &self.python_path))
    }
}

impl Drop for ImportsManager {
    fn drop(&mut self) {
        if let Some(listener) = self.document_listener.lock().take() {
            self.documents.document_changed.unsubscribe(listener);
        }
        for handle in self.take_all_watches() {
            self.file_watcher.remove_file_watchers(handle);
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn entry_for<D: Clone>(table: &EntryTable<D>, key: EntryKey) -> Arc<ImportEntry<D>> {
    Arc::clone(
        table
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(ImportEntry::new())),
    )
}

fn invalidate_affected<'p, D: Clone, I>(table: &EntryTable<D>, paths: impl Fn() -> I) -> Vec<D>
where
    I: Iterator<Item = &'p Path>,
{
    let entries: Vec<_> = table.lock().values().cloned().collect();
    entries
        .iter()
        .filter_map(|entry| entry.invalidate_if_affected(paths()))
        .collect()
}

/// Base name of the cache files of an import.
fn cache_base(name: &str, file: Option<&Path>, by_path: bool) -> String {
    LibraryMetaData::new(name, None, file, &[], by_path).filepath_base()
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
}

fn is_importable_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| {
        let e = e.to_string_lossy().to_ascii_lowercase();
        RESOURCE_EXTENSIONS.contains(&e.as_str()) || VARIABLES_EXTENSIONS.contains(&e.as_str())
    })
}

/// `path[:arg...]`; a Windows drive letter stays with the path.
fn split_variable_file_spec(spec: &str) -> (String, Vec<String>) {
    let mut parts: Vec<String> = spec.split(':').map(str::to_string).collect();
    if parts.len() > 1
        && parts[0].len() == 1
        && parts[0].chars().all(|c| c.is_ascii_alphabetic())
        && parts[1].starts_with(['/', '\\'])
    {
        let drive = parts.remove(0);
        parts[0] = format!("{drive}:{}", parts[0]);
    }
    let mut parts = parts.into_iter();
    let path = parts.next().unwrap_or_default();
    (path, parts.collect())
}

/// A JSON variable file, read without the loader.
fn json_variables(name: &str, path: &Path) -> VariablesDoc {
    let source = path.to_string_lossy().into_owned();
    let failed = |reason: String| {
        VariablesDoc::from_error(
            name,
            Some(source.clone()),
            LibraryError::new(format!("Processing variable file '{source}' failed: {reason}"))
                .with_source(source.clone(), None),
        )
    };
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) => return failed(error.to_string()),
    };
    let object = match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(serde_json::Value::Object(object)) => object,
        Ok(_) => return failed("JSON variable file must be a mapping.".to_string()),
        Err(error) => return failed(error.to_string()),
    };
    let mut doc = VariablesDoc::new(name, Some(source.clone()));
    doc.variables = object
        .iter()
        .map(|(key, value)| {
            let (sigil, value) = match value {
                serde_json::Value::String(s) => ('$', s.clone()),
                serde_json::Value::Array(_) => ('@', value.to_string()),
                serde_json::Value::Object(_) => ('&', value.to_string()),
                other => ('$', other.to_string()),
            };
            ImportedVariable {
                name: format!("{sigil}{{{key}}}"),
                value: Some(value),
                source: Some(source.clone()),
                range: Default::default(),
            }
        })
        .collect();
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_variable_file_spec() {
        assert_eq!(
            split_variable_file_spec("vars.py:a:b"),
            ("vars.py".to_string(), vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            split_variable_file_spec("C:\\vars.yaml"),
            ("C:\\vars.yaml".to_string(), Vec::new())
        );
        assert_eq!(split_variable_file_spec("vars.json"), ("vars.json".to_string(), Vec::new()));
    }

    #[test]
    fn test_json_variables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.json");
        fs::write(&path, r#"{"HOST": "localhost", "PORTS": [1, 2], "COUNT": 3}"#).unwrap();

        let doc = json_variables("vars.json", &path);
        assert!(!doc.has_errors());
        let mut names: Vec<&str> = doc.variables.iter().map(|v| v.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["${COUNT}", "${HOST}", "@{PORTS}"]);
        let host = doc.variables.iter().find(|v| v.name == "${HOST}").unwrap();
        assert_eq!(host.value.as_deref(), Some("localhost"));
    }

    #[test]
    fn test_json_variables_must_be_a_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.json");
        fs::write(&path, "[1, 2]").unwrap();
        let doc = json_variables("vars.json", &path);
        assert!(doc.errors[0].message.ends_with("JSON variable file must be a mapping."));
    }

    #[test]
    fn test_importable_files() {
        assert!(is_importable_file(Path::new("/ws/common.resource")));
        assert!(is_importable_file(Path::new("/ws/vars.YAML")));
        assert!(!is_importable_file(Path::new("/ws/notes.md")));
    }
}
