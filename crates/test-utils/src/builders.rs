#![allow(dead_code)]

use std::path::PathBuf;

use serde_json::{Value, json};
use trellis::config::{
    ActionConfig, CopyFromConfig, DependencyConfig, DetailedDependency, EnvironmentConfig,
    ProjectConfig, ProviderConfig, RawProjectConfig,
};
use trellis::types::{ActionKey, CacheStorageMode};

use crate::fake_handlers::FAKE_TYPE;

/// Builder for `ProjectConfig` to simplify test setup.
pub struct ProjectBuilder {
    config: RawProjectConfig,
}

impl ProjectBuilder {
    pub fn new() -> Self {
        let mut config = RawProjectConfig::default();
        config.project.name = "test-project".to_string();
        Self { config }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.config.project.name = name.to_string();
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.root = root.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.project.concurrency = n;
        self
    }

    pub fn cache(mut self, mode: CacheStorageMode) -> Self {
        self.config.project.cache = mode;
        self
    }

    pub fn default_environment(mut self, name: &str) -> Self {
        self.config.project.default_environment = Some(name.to_string());
        self
    }

    pub fn variable(mut self, key: &str, value: Value) -> Self {
        self.config.variables.insert(key.to_string(), value);
        self
    }

    pub fn environment(mut self, name: &str, variables: Value) -> Self {
        let variables = match variables {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        self.config.environments.insert(
            name.to_string(),
            EnvironmentConfig {
                variables,
                ..Default::default()
            },
        );
        self
    }

    pub fn provider(mut self, name: &str, outputs: Value) -> Self {
        let outputs = match outputs {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        self.config
            .providers
            .insert(name.to_string(), ProviderConfig { outputs });
        self
    }

    pub fn action(mut self, action: ActionConfig) -> Self {
        self.config.actions.push(action);
        self
    }

    pub fn raw(self) -> RawProjectConfig {
        self.config
    }

    pub fn build(self) -> ProjectConfig {
        ProjectConfig::try_from(self.config).expect("Failed to build valid project from builder")
    }
}

impl Default for ProjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ActionConfig`.
///
/// Actions default to the fake handler type and an empty `config_dir`, so
/// `source("web")` maps to the relative path `web` (matching paths added to
/// a `MockFileSystem`).
pub struct ActionBuilder {
    action: ActionConfig,
}

impl ActionBuilder {
    /// `key` is `<kind>.<name>`, e.g. `deploy.api`.
    pub fn new(key: &str) -> Self {
        let key: ActionKey = key.parse().expect("invalid action key in test");
        Self {
            action: ActionConfig {
                kind: key.kind,
                name: key.name,
                type_name: FAKE_TYPE.to_string(),
                source: None,
                include: None,
                exclude: Vec::new(),
                disabled: false,
                variables: Default::default(),
                varfiles: Vec::new(),
                dependencies: Vec::new(),
                copy_from: Vec::new(),
                spec: json!({}),
                config_dir: PathBuf::new(),
                varfile_variables: Default::default(),
            },
        }
    }

    pub fn type_name(mut self, type_name: &str) -> Self {
        self.action.type_name = type_name.to_string();
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.action.source = Some(source.to_string());
        self
    }

    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.action.config_dir = dir.into();
        self
    }

    pub fn include(mut self, pattern: &str) -> Self {
        self.action
            .include
            .get_or_insert_with(Vec::new)
            .push(pattern.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.action.exclude.push(pattern.to_string());
        self
    }

    pub fn spec(mut self, spec: Value) -> Self {
        self.action.spec = spec;
        self
    }

    pub fn variable(mut self, key: &str, value: Value) -> Self {
        self.action.variables.insert(key.to_string(), value);
        self
    }

    /// Explicit dependency on `<kind>.<name>`.
    pub fn depends_on(mut self, key: &str) -> Self {
        self.action
            .dependencies
            .push(DependencyConfig::Key(key.to_string()));
        self
    }

    /// Dependency whose executed outputs are needed while resolving.
    pub fn needs_executed(mut self, key: &str) -> Self {
        self.action
            .dependencies
            .push(DependencyConfig::Detailed(DetailedDependency {
                action: key.to_string(),
                explicit: true,
                needs_static_outputs: true,
                needs_executed_outputs: true,
                optional: false,
            }));
        self
    }

    pub fn optional_dependency(mut self, key: &str) -> Self {
        self.action
            .dependencies
            .push(DependencyConfig::Detailed(DetailedDependency {
                action: key.to_string(),
                explicit: true,
                needs_static_outputs: false,
                needs_executed_outputs: false,
                optional: true,
            }));
        self
    }

    pub fn copy_from(mut self, build: &str) -> Self {
        self.action.copy_from.push(CopyFromConfig {
            build: build.to_string(),
            source: String::new(),
            target: String::new(),
        });
        self
    }

    pub fn disabled(mut self) -> Self {
        self.action.disabled = true;
        self
    }

    pub fn build(self) -> ActionConfig {
        self.action
    }
}
