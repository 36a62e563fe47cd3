// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::types::{ActionKind, CacheStorageMode};

/// Variables are plain JSON objects; `serde_json`'s map keeps keys sorted,
/// which the version hashing relies on.
pub type Variables = serde_json::Map<String, Value>;

/// Top-level project configuration as read from `trellis.toml`.
///
/// ```toml
/// [project]
/// name = "shop"
/// default_environment = "local"
///
/// [variables]
/// registry = "localhost:5000"
///
/// [environments.local]
/// variables = { replicas = 1 }
///
/// [[action]]
/// kind = "Build"
/// name = "web"
/// type = "exec"
/// [action.spec]
/// command = ["npm", "run", "build"]
/// ```
///
/// This is the raw, unchecked form; use [`ProjectConfig`] (via
/// `TryFrom`) for anything beyond deserialization.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawProjectConfig {
    #[serde(default)]
    pub project: ProjectSection,

    /// Project-wide variables, the lowest-precedence variable scope.
    #[serde(default)]
    pub variables: Variables,

    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,

    /// Static provider outputs, exposed as `${providers.<name>.outputs.<key>}`.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// All `[[action]]` entries, including those pulled in through `includes`.
    #[serde(default, rename = "action")]
    pub actions: Vec<ActionConfig>,

    /// Directory containing the root config file. Filled by the loader.
    #[serde(skip)]
    pub root: PathBuf,
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    #[serde(default = "default_project_name")]
    pub name: String,

    /// Environment used when none is passed on the command line.
    #[serde(default)]
    pub default_environment: Option<String>,

    /// Maximum number of tasks executing at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub cache: CacheStorageMode,

    /// Write `.trellis-version` into each action's source directory after
    /// resolving it.
    #[serde(default)]
    pub write_version_files: bool,

    /// Extra TOML files (relative to the project root) holding `[[action]]`
    /// arrays. Actions declared there default their `source` to the
    /// directory of the including file.
    #[serde(default)]
    pub includes: Vec<String>,
}

pub const DEFAULT_ENVIRONMENT: &str = "default";

fn default_project_name() -> String {
    "project".to_string()
}

fn default_concurrency() -> usize {
    6
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            default_environment: None,
            concurrency: default_concurrency(),
            cache: CacheStorageMode::default(),
            write_version_files: false,
            includes: Vec::new(),
        }
    }
}

/// `[environments.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub variables: Variables,

    /// TOML varfiles, relative to the project root. Later files win.
    #[serde(default)]
    pub varfiles: Vec<String>,

    /// Merged contents of `varfiles`. Filled by the loader.
    #[serde(skip)]
    pub varfile_variables: Variables,
}

/// `[providers.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub outputs: Variables,
}

/// A single `[[action]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    pub kind: ActionKind,

    pub name: String,

    /// Handler type, looked up together with `kind` in the handler registry.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Source directory relative to the declaring file. Defaults to the
    /// declaring file's directory.
    #[serde(default)]
    pub source: Option<String>,

    /// Glob patterns selecting the files that make up the action's version.
    /// `None` means every file under `source`.
    #[serde(default)]
    pub include: Option<Vec<String>>,

    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub variables: Variables,

    /// Action varfiles, relative to the declaring file.
    #[serde(default)]
    pub varfiles: Vec<String>,

    #[serde(default)]
    pub dependencies: Vec<DependencyConfig>,

    /// Copy-from relationships between Build actions.
    #[serde(default)]
    pub copy_from: Vec<CopyFromConfig>,

    /// Handler-specific payload; may contain `${...}` expressions.
    #[serde(default = "empty_spec")]
    pub spec: Value,

    /// Directory of the file that declared this action. Filled by the loader.
    #[serde(skip)]
    pub config_dir: PathBuf,

    /// Merged contents of `varfiles`. Filled by the loader.
    #[serde(skip)]
    pub varfile_variables: Variables,
}

fn empty_spec() -> Value {
    Value::Object(Default::default())
}

impl ActionConfig {
    /// Absolute (or root-relative) base path of the action's source tree.
    pub fn base_path(&self) -> PathBuf {
        match &self.source {
            Some(source) => self.config_dir.join(source),
            None => self.config_dir.clone(),
        }
    }

    /// The file the action came from, for diagnostics.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

/// Either `"build.web"` or a detailed table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependencyConfig {
    Key(String),
    Detailed(DetailedDependency),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetailedDependency {
    pub action: String,

    #[serde(default = "default_true")]
    pub explicit: bool,

    #[serde(default)]
    pub needs_static_outputs: bool,

    #[serde(default)]
    pub needs_executed_outputs: bool,

    /// A missing or disabled target is tolerated instead of rejected.
    #[serde(default)]
    pub optional: bool,
}

fn default_true() -> bool {
    true
}

impl DependencyConfig {
    pub fn target(&self) -> &str {
        match self {
            DependencyConfig::Key(key) => key,
            DependencyConfig::Detailed(d) => &d.action,
        }
    }
}

/// `copy_from = [{ build = "base", source = "dist", target = "vendor" }]`
#[derive(Debug, Clone, Deserialize)]
pub struct CopyFromConfig {
    pub build: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
}

/// Validated project configuration.
///
/// Only syntactic checks have run at this point; duplicate keys, missing
/// dependency targets and cycles are the graph builder's concern.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    root: PathBuf,
    project: ProjectSection,
    variables: Variables,
    environments: BTreeMap<String, EnvironmentConfig>,
    providers: BTreeMap<String, ProviderConfig>,
    actions: Vec<ActionConfig>,
}

impl ProjectConfig {
    pub(crate) fn new_unchecked(raw: RawProjectConfig) -> Self {
        Self {
            root: raw.root,
            project: raw.project,
            variables: raw.variables,
            environments: raw.environments,
            providers: raw.providers,
            actions: raw.actions,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project(&self) -> &ProjectSection {
        &self.project
    }

    pub fn name(&self) -> &str {
        &self.project.name
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn providers(&self) -> &BTreeMap<String, ProviderConfig> {
        &self.providers
    }

    pub fn actions(&self) -> &[ActionConfig] {
        &self.actions
    }

    /// The environment to use when none is given explicitly.
    pub fn default_environment(&self) -> &str {
        self.project
            .default_environment
            .as_deref()
            .unwrap_or(DEFAULT_ENVIRONMENT)
    }

    /// Look up an environment. The implicit `default` environment always
    /// exists, even when it is not declared.
    pub fn environment(&self, name: &str) -> Option<EnvironmentConfig> {
        match self.environments.get(name) {
            Some(env) => Some(env.clone()),
            None if name == DEFAULT_ENVIRONMENT => Some(EnvironmentConfig::default()),
            None => None,
        }
    }

    pub fn environment_names(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(|s| s.as_str())
    }
}
