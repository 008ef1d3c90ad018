//! Loader that runs every request in a fresh child process.
//!
//! Libraries execute arbitrary code when imported, so nothing is shared
//! between requests: each one spawns the configured command, writes the
//! request to stdin and waits for the response with a hard deadline.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{
    Completion, CompletionRequest, ImportRequest, LoadRequest, LoadResponse,
};
use super::LibraryLoader;
use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::library::{LibraryDoc, LibraryError, LibraryKind, VariablesDoc};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Debug)]
pub struct ProcessLoader {
    command: Vec<String>,
    load_timeout: Duration,
    complete_timeout: Duration,
    python_path: Vec<PathBuf>,
    env: IndexMap<String, String>,
}

impl ProcessLoader {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            load_timeout: Duration::from_secs(10),
            complete_timeout: Duration::from_secs(5),
            python_path: Vec::new(),
            env: IndexMap::new(),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            command: config.loader_command.clone(),
            load_timeout: Duration::from_secs(config.load_library_timeout_secs),
            complete_timeout: Duration::from_secs(config.complete_import_timeout_secs),
            python_path: config.python_path.clone(),
            env: config.env.clone(),
        }
    }

    pub fn with_timeouts(mut self, load: Duration, complete: Duration) -> Self {
        self.load_timeout = load;
        self.complete_timeout = complete;
        self
    }

    fn spawn(&self, working_dir: Option<&PathBuf>) -> Result<Child> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(Error::loader("loader command is empty"));
        };
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .envs(&self.env);
        if !self.python_path.is_empty() {
            let joined = std::env::join_paths(&self.python_path)
                .map_err(|e| Error::loader(format!("invalid python path: {e}")))?;
            command.env("PYTHONPATH", joined);
        }
        if let Some(dir) = working_dir.filter(|d| d.is_dir()) {
            command.current_dir(dir);
        }
        Ok(command.spawn()?)
    }

    /// Run one request in a new child and return its response.
    fn run(
        &self,
        label: &str,
        request: &LoadRequest,
        working_dir: Option<&PathBuf>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<LoadResponse> {
        let started = Instant::now();
        let mut child = self.spawn(working_dir)?;

        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&line)?;
        }

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_with_deadline(&mut child, started + timeout, cancel)? {
            Some(status) => status,
            None => {
                warn!("loading '{}' timed out after {:?}, child killed", label, timeout);
                return Err(Error::LoaderTimeout {
                    name: label.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            warn!("loader stderr ({}): {}", label, line);
        }
        if !status.success() {
            return Err(Error::loader(format!(
                "loader for '{label}' exited with {status}"
            )));
        }

        let mut lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
        let Some(last) = lines.pop() else {
            return Err(Error::loader(format!("loader for '{label}' returned nothing")));
        };
        for line in lines {
            debug!("loader output ({}): {}", label, line);
        }
        let response = serde_json::from_str(last)?;
        info!("loaded '{}' in {:?}", label, started.elapsed());
        Ok(response)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut out = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut out);
        }
        out
    })
}

/// Wait for the child; `None` when the deadline passed and it was killed.
fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if cancel.is_cancelled() {
            kill(child);
            return Err(Error::Cancelled);
        }
        if Instant::now() >= deadline {
            kill(child);
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn error_from_response(response: LoadResponse) -> LibraryError {
    match response {
        LoadResponse::Error { message, type_name } => LibraryError {
            message,
            type_name,
            ..LibraryError::default()
        },
        other => LibraryError::new(format!("unexpected loader response: {other:?}")),
    }
}

impl LibraryLoader for ProcessLoader {
    fn load_library(&self, request: &ImportRequest, cancel: &CancellationToken) -> Result<LibraryDoc> {
        let wrapped = LoadRequest::Library(request.clone());
        let result = self.run(
            &request.name,
            &wrapped,
            Some(&request.working_dir),
            self.load_timeout,
            cancel,
        );
        match result {
            Ok(LoadResponse::Library(doc)) => Ok(doc),
            Ok(other) => Ok(LibraryDoc::from_error(
                &request.name,
                LibraryKind::Library,
                None,
                error_from_response(other),
            )),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!("loading library '{}' failed: {}", request.name, e);
                Ok(LibraryDoc::from_error(
                    &request.name,
                    LibraryKind::Library,
                    None,
                    LibraryError::new(e.to_string()),
                ))
            }
        }
    }

    fn load_variables(&self, request: &ImportRequest, cancel: &CancellationToken) -> Result<VariablesDoc> {
        let wrapped = LoadRequest::Variables(request.clone());
        let result = self.run(
            &request.name,
            &wrapped,
            Some(&request.working_dir),
            self.load_timeout,
            cancel,
        );
        let source = Some(request.name.clone());
        match result {
            Ok(LoadResponse::Variables(doc)) => Ok(doc),
            Ok(other) => Ok(VariablesDoc::from_error(
                &request.name,
                source,
                error_from_response(other),
            )),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!("loading variables '{}' failed: {}", request.name, e);
                Ok(VariablesDoc::from_error(
                    &request.name,
                    source,
                    LibraryError::new(e.to_string()),
                ))
            }
        }
    }

    fn complete_import(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Completion>> {
        let wrapped = LoadRequest::Complete(request.clone());
        let label = format!("completions for '{}'", request.prefix);
        match self.run(
            &label,
            &wrapped,
            Some(&request.base_dir),
            self.complete_timeout,
            cancel,
        )? {
            LoadResponse::Completions { items } => Ok(items),
            other => Err(Error::loader(format!("unexpected completion response: {other:?}"))),
        }
    }
}
