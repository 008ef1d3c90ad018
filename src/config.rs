//! Configuration of the analysis core.
//!
//! Loading configuration (robot.toml, client settings) happens outside the
//! core; the embedding application hands over an [`AnalysisConfig`],
//! usually deserialized from the JSON the client sent.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Version of the Robot Framework runtime the documents target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RobotVersion {
    pub major: u32,
    pub minor: u32,
}

impl RobotVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// BDD prefixes are tried before the plain name from 7.0 on.
    pub fn bdd_prefix_first(&self) -> bool {
        *self >= RobotVersion::new(7, 0)
    }

    /// `Reserved` library was removed in 7.0.
    pub fn has_reserved_library(&self) -> bool {
        *self < RobotVersion::new(7, 0)
    }
}

impl Default for RobotVersion {
    fn default() -> Self {
        Self::new(7, 0)
    }
}

impl fmt::Display for RobotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for RobotVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| format!("invalid robot version '{s}'"))?;
        let minor = match parts.next() {
            Some(p) => p
                .parse()
                .map_err(|_| format!("invalid robot version '{s}'"))?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for RobotVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RobotVersion> for String {
    fn from(value: RobotVersion) -> Self {
        value.to_string()
    }
}

/// Workspace-level severity overrides by diagnostic code.
///
/// A code may be listed as `*` to target every code.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagnosticModifiersConfig {
    pub ignore: Vec<String>,
    pub error: Vec<String>,
    pub warning: Vec<String>,
    pub information: Vec<String>,
    pub hint: Vec<String>,
}

impl DiagnosticModifiersConfig {
    pub fn is_empty(&self) -> bool {
        self.ignore.is_empty()
            && self.error.is_empty()
            && self.warning.is_empty()
            && self.information.is_empty()
            && self.hint.is_empty()
    }
}

/// Everything the analysis core needs to know about the workspace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Directories searched for Python modules, resources and variable files.
    pub python_path: Vec<PathBuf>,
    /// Command line variables (`-v name:value`).
    pub variables: IndexMap<String, String>,
    /// Command line variable files (`--variablefile path[:arg...]`).
    pub variable_files: Vec<String>,
    /// Extra environment variables visible to `%{NAME}`.
    pub env: IndexMap<String, String>,
    /// Languages whose BDD prefixes are accepted.
    pub languages: Vec<String>,
    pub robot_version: RobotVersion,
    pub python_version: String,
    /// Cache root; defaults to `<workspace>/.robotcode_cache`.
    pub cache_dir: Option<PathBuf>,
    /// Regex patterns of library names whose arguments do not take part in cache keys.
    pub ignored_libraries_for_cache_arguments: Vec<String>,
    pub load_library_timeout_secs: u64,
    pub complete_import_timeout_secs: u64,
    /// Program and arguments of the introspection child process.
    pub loader_command: Vec<String>,
    /// Initial library search order.
    pub search_order: Vec<String>,
    pub diagnostic_modifiers: DiagnosticModifiersConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            python_path: Vec::new(),
            variables: IndexMap::new(),
            variable_files: Vec::new(),
            env: IndexMap::new(),
            languages: Vec::new(),
            robot_version: RobotVersion::default(),
            python_version: "3".to_string(),
            cache_dir: None,
            ignored_libraries_for_cache_arguments: Vec::new(),
            load_library_timeout_secs: 10,
            complete_import_timeout_secs: 5,
            loader_command: vec![
                "python".to_string(),
                "-m".to_string(),
                "robotcode.robot.loader".to_string(),
            ],
            search_order: Vec::new(),
            diagnostic_modifiers: DiagnosticModifiersConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parse one `name:value` command line variable.
    ///
    /// The value may itself contain colons; a missing value is empty.
    pub fn parse_cli_variable(spec: &str) -> (String, String) {
        match spec.split_once(':') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (spec.to_string(), String::new()),
        }
    }

    /// Add variables given in `-v name:value` form.
    pub fn with_cli_variables<'a>(mut self, specs: impl IntoIterator<Item = &'a str>) -> Self {
        for spec in specs {
            let (name, value) = Self::parse_cli_variable(spec);
            self.variables.insert(name, value);
        }
        self
    }

    /// Render the variable settings as command line arguments.
    pub fn command_line_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (name, value) in &self.variables {
            args.push("-v".to_string());
            args.push(format!("{name}:{value}"));
        }
        for file in &self.variable_files {
            args.push("--variablefile".to_string());
            args.push(file.clone());
        }
        args
    }

    /// Cache directory for this Python and Robot Framework version.
    pub fn cache_root(&self, workspace_root: &std::path::Path) -> PathBuf {
        let base = self
            .cache_dir
            .clone()
            .unwrap_or_else(|| workspace_root.join(crate::base::constants::CACHE_DIR_NAME));
        base.join(&self.python_version)
            .join(self.robot_version.to_string())
    }

    /// Compiled `ignored_libraries_for_cache_arguments` patterns; invalid ones are skipped.
    pub fn ignored_cache_argument_patterns(&self) -> Vec<regex::Regex> {
        self.ignored_libraries_for_cache_arguments
            .iter()
            .filter_map(|p| match regex::Regex::new(&format!("^(?:{p})$")) {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::warn!("ignoring invalid library pattern '{}': {}", p, e);
                    None
                }
            })
            .collect()
    }
}
