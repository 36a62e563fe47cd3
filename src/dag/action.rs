// src/dag/action.rs

//! Actions and their dependency edges, derived from [`ActionConfig`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::model::{ActionConfig, DependencyConfig, Variables};
use crate::errors::{Result, TrellisError};
use crate::types::{ActionKey, ActionKind};

/// How a dependency edge came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Declared in `dependencies = [...]`.
    Explicit,
    /// Discovered from a `${<kind>.<name>...}` template reference.
    Implicit,
    /// A `copy_from` relationship between Build actions.
    BuildCopy,
}

/// A typed dependency edge from an action to another action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDependency {
    pub key: ActionKey,
    pub kind: DependencyKind,
    pub explicit: bool,
    pub needs_static_outputs: bool,
    pub needs_executed_outputs: bool,
    pub optional: bool,
}

impl ActionDependency {
    pub fn explicit(key: ActionKey) -> Self {
        Self {
            key,
            kind: DependencyKind::Explicit,
            explicit: true,
            needs_static_outputs: false,
            needs_executed_outputs: false,
            optional: false,
        }
    }

    /// An edge discovered through a template reference.
    pub fn implicit(key: ActionKey, needs_executed_outputs: bool) -> Self {
        Self {
            key,
            kind: DependencyKind::Implicit,
            explicit: false,
            needs_static_outputs: true,
            needs_executed_outputs,
            optional: false,
        }
    }

    pub fn build_copy(key: ActionKey) -> Self {
        Self {
            key,
            kind: DependencyKind::BuildCopy,
            explicit: true,
            needs_static_outputs: true,
            needs_executed_outputs: false,
            optional: false,
        }
    }

    /// The dependent's resolve task needs this dependency resolved.
    pub fn requires_resolve(&self) -> bool {
        self.explicit || self.needs_static_outputs || self.needs_executed_outputs
    }

    /// The dependency must have executed before the dependent can resolve.
    pub fn requires_execution_for_resolve(&self) -> bool {
        self.needs_executed_outputs
    }

    /// The dependent's process task needs this dependency executed.
    pub fn requires_execution(&self) -> bool {
        self.explicit || self.needs_executed_outputs
    }

    /// Fold another edge to the same target into this one.
    pub fn merge(&mut self, other: &ActionDependency) {
        self.explicit |= other.explicit;
        self.needs_static_outputs |= other.needs_static_outputs;
        self.needs_executed_outputs |= other.needs_executed_outputs;
        self.optional &= other.optional;
        if self.kind == DependencyKind::Implicit && other.kind != DependencyKind::Implicit {
            self.kind = other.kind;
        }
    }
}

impl ActionDependency {
    fn from_config(key: ActionKey, cfg: &DependencyConfig) -> Self {
        match cfg {
            DependencyConfig::Key(_) => ActionDependency::explicit(key),
            DependencyConfig::Detailed(d) => ActionDependency {
                key,
                kind: DependencyKind::Explicit,
                explicit: d.explicit,
                needs_static_outputs: d.needs_static_outputs,
                needs_executed_outputs: d.needs_executed_outputs,
                optional: d.optional,
            },
        }
    }
}

/// A declared unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub key: ActionKey,
    pub type_name: String,
    pub base_path: PathBuf,
    pub include: Option<Vec<String>>,
    pub exclude: Vec<String>,
    /// Unresolved handler payload.
    pub spec: Value,
    /// Action-local variables (action `variables`, then action varfiles).
    pub variables: Variables,
    pub dependencies: Vec<ActionDependency>,
    pub disabled: bool,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        self.key.kind
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Look up the edge to `key`, if one is declared.
    pub fn dependency(&self, key: &ActionKey) -> Option<&ActionDependency> {
        self.dependencies.iter().find(|d| &d.key == key)
    }

    pub fn from_config(cfg: &ActionConfig) -> Result<Self> {
        let key = ActionKey::new(cfg.kind, cfg.name.clone());

        let mut deps: BTreeMap<ActionKey, ActionDependency> = BTreeMap::new();
        for dep_cfg in cfg.dependencies.iter() {
            let target: ActionKey = dep_cfg.target().parse().map_err(|e: String| {
                TrellisError::Configuration(format!("action '{}': {}", key, e))
            })?;
            insert_dependency(&mut deps, ActionDependency::from_config(target, dep_cfg));
        }
        for copy in cfg.copy_from.iter() {
            let target = ActionKey::new(ActionKind::Build, copy.build.clone());
            insert_dependency(&mut deps, ActionDependency::build_copy(target));
        }

        let mut variables = cfg.variables.clone();
        for (k, v) in cfg.varfile_variables.iter() {
            variables.insert(k.clone(), v.clone());
        }

        Ok(Self {
            key,
            type_name: cfg.type_name.clone(),
            base_path: cfg.base_path(),
            include: cfg.include.clone(),
            exclude: cfg.exclude.clone(),
            spec: cfg.spec.clone(),
            variables,
            dependencies: deps.into_values().collect(),
            disabled: cfg.disabled,
        })
    }
}

fn insert_dependency(deps: &mut BTreeMap<ActionKey, ActionDependency>, dep: ActionDependency) {
    match deps.get_mut(&dep.key) {
        Some(existing) => existing.merge(&dep),
        None => {
            deps.insert(dep.key.clone(), dep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{CopyFromConfig, DetailedDependency};

    fn config(kind: ActionKind, name: &str) -> ActionConfig {
        ActionConfig {
            kind,
            name: name.to_string(),
            type_name: "exec".to_string(),
            source: None,
            include: None,
            exclude: Vec::new(),
            disabled: false,
            variables: Variables::new(),
            varfiles: Vec::new(),
            dependencies: Vec::new(),
            copy_from: Vec::new(),
            spec: serde_json::json!({}),
            config_dir: PathBuf::from("."),
            varfile_variables: Variables::new(),
        }
    }

    #[test]
    fn duplicate_edges_to_the_same_target_are_merged() {
        let mut cfg = config(ActionKind::Build, "app");
        cfg.dependencies.push(DependencyConfig::Key("build.base".to_string()));
        cfg.copy_from.push(CopyFromConfig {
            build: "base".to_string(),
            source: "dist".to_string(),
            target: "vendor".to_string(),
        });

        let action = Action::from_config(&cfg).unwrap();
        assert_eq!(action.dependencies.len(), 1);
        let dep = &action.dependencies[0];
        assert_eq!(dep.kind, DependencyKind::Explicit);
        assert!(dep.explicit && dep.needs_static_outputs);
    }

    #[test]
    fn detailed_dependency_keeps_flags() {
        let mut cfg = config(ActionKind::Run, "migrate");
        cfg.dependencies.push(DependencyConfig::Detailed(DetailedDependency {
            action: "deploy.db".to_string(),
            explicit: true,
            needs_static_outputs: false,
            needs_executed_outputs: true,
            optional: false,
        }));

        let action = Action::from_config(&cfg).unwrap();
        let dep = &action.dependencies[0];
        assert_eq!(dep.key.to_string(), "deploy.db");
        assert!(dep.requires_execution_for_resolve());
        assert!(dep.requires_execution());
    }

    #[test]
    fn action_varfiles_override_inline_variables() {
        let mut cfg = config(ActionKind::Deploy, "api");
        cfg.variables.insert("tag".into(), serde_json::json!("inline"));
        cfg.varfile_variables
            .insert("tag".into(), serde_json::json!("varfile"));

        let action = Action::from_config(&cfg).unwrap();
        assert_eq!(action.variables["tag"], serde_json::json!("varfile"));
    }
}
