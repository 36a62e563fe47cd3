// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::config::model::ActionConfig;
use crate::dag::action::{Action, ActionDependency};
use crate::dag::cycle::find_cycle;
use crate::errors::{Result, TrellisError};
use crate::types::{ActionKey, ActionKind};

/// Validated dependency graph over the declared actions.
///
/// Every declared action is kept for lookup, but only enabled actions are
/// nodes of the graph. Edge direction is dependency -> dependent, so a
/// topological order lists dependencies first.
#[derive(Debug, Clone)]
pub struct ActionGraph {
    actions: BTreeMap<ActionKey, Action>,
    graph: DiGraph<ActionKey, ActionDependency>,
    nodes: HashMap<ActionKey, NodeIndex>,
}

impl ActionGraph {
    /// Build the graph from raw action configs.
    ///
    /// Fails with a `Configuration` error on duplicate keys, missing
    /// dependency targets and dependencies on disabled actions (optional
    /// dependencies are dropped instead), and with `CircularDependency` when
    /// the declared edges form a cycle.
    pub fn build(configs: &[ActionConfig]) -> Result<Self> {
        let mut actions: BTreeMap<ActionKey, Action> = BTreeMap::new();

        for cfg in configs {
            let action = Action::from_config(cfg)?;
            if actions.contains_key(&action.key) {
                return Err(TrellisError::Configuration(format!(
                    "duplicate action key '{}'",
                    action.key
                )));
            }
            actions.insert(action.key.clone(), action);
        }

        let keys: Vec<ActionKey> = actions.keys().cloned().collect();
        for key in keys.iter() {
            let Some(action) = actions.get(key) else {
                continue;
            };
            if action.disabled {
                continue;
            }

            let mut kept = Vec::with_capacity(action.dependencies.len());
            for dep in action.dependencies.iter() {
                match actions.get(&dep.key) {
                    None if dep.optional => {
                        debug!(action = %key, dependency = %dep.key, "dropping optional dependency on missing action");
                    }
                    None => {
                        return Err(TrellisError::Configuration(format!(
                            "action '{}' depends on '{}', which does not exist",
                            key, dep.key
                        )));
                    }
                    Some(target) if target.disabled && dep.optional => {
                        debug!(action = %key, dependency = %dep.key, "dropping optional dependency on disabled action");
                    }
                    Some(target) if target.disabled => {
                        return Err(TrellisError::Configuration(format!(
                            "action '{}' depends on '{}', which is disabled",
                            key, dep.key
                        )));
                    }
                    Some(_) => kept.push(dep.clone()),
                }
            }

            if let Some(action) = actions.get_mut(key) {
                action.dependencies = kept;
            }
        }

        let enabled: Vec<ActionKey> = actions
            .values()
            .filter(|a| !a.disabled)
            .map(|a| a.key.clone())
            .collect();

        if let Some(cycle) = find_cycle(enabled.iter().cloned(), |key| {
            actions
                .get(key)
                .map(|a| a.dependencies.iter().map(|d| d.key.clone()).collect::<Vec<_>>())
                .unwrap_or_default()
        }) {
            return Err(TrellisError::CircularDependency {
                cycle: cycle.iter().map(|k| k.to_string()).collect(),
            });
        }

        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for key in enabled.iter() {
            nodes.insert(key.clone(), graph.add_node(key.clone()));
        }
        for key in enabled.iter() {
            let Some(action) = actions.get(key) else {
                continue;
            };
            for dep in action.dependencies.iter() {
                if let (Some(&from), Some(&to)) = (nodes.get(&dep.key), nodes.get(key)) {
                    graph.add_edge(from, to, dep.clone());
                }
            }
        }

        debug!(
            actions = actions.len(),
            enabled = nodes.len(),
            edges = graph.edge_count(),
            "built action graph"
        );

        Ok(Self {
            actions,
            graph,
            nodes,
        })
    }

    /// Look up an action, enabled or not.
    pub fn get(&self, key: &ActionKey) -> Option<&Action> {
        self.actions.get(key)
    }

    pub fn contains(&self, key: &ActionKey) -> bool {
        self.actions.contains_key(key)
    }

    pub fn is_enabled(&self, key: &ActionKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// All declared actions, including disabled ones, sorted by key.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    /// Enabled actions of one kind, sorted by name.
    pub fn actions_of_kind(&self, kind: ActionKind) -> impl Iterator<Item = &Action> + '_ {
        self.actions
            .values()
            .filter(move |a| a.kind() == kind && !a.disabled)
    }

    /// Declared (validated) dependency edges of an action.
    pub fn dependencies_of(&self, key: &ActionKey) -> &[ActionDependency] {
        self.actions
            .get(key)
            .map(|a| a.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Keys of enabled actions that declare a dependency on `key`.
    pub fn dependents_of(&self, key: &ActionKey) -> Vec<ActionKey> {
        let Some(&idx) = self.nodes.get(key) else {
            return Vec::new();
        };
        let mut out: Vec<ActionKey> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Enabled actions with dependencies before dependents.
    pub fn topological_order(&self) -> Result<Vec<ActionKey>> {
        match toposort(&self.graph, None) {
            Ok(order) => Ok(order.into_iter().map(|n| self.graph[n].clone()).collect()),
            Err(cycle) => Err(TrellisError::CircularDependency {
                cycle: vec![self.graph[cycle.node_id()].to_string()],
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{DependencyConfig, DetailedDependency, Variables};
    use std::path::PathBuf;

    fn action(key: &str, deps: &[&str]) -> ActionConfig {
        let key: ActionKey = key.parse().unwrap();
        ActionConfig {
            kind: key.kind,
            name: key.name,
            type_name: "exec".to_string(),
            source: None,
            include: None,
            exclude: Vec::new(),
            disabled: false,
            variables: Variables::new(),
            varfiles: Vec::new(),
            dependencies: deps
                .iter()
                .map(|d| DependencyConfig::Key(d.to_string()))
                .collect(),
            copy_from: Vec::new(),
            spec: serde_json::json!({}),
            config_dir: PathBuf::from("."),
            varfile_variables: Variables::new(),
        }
    }

    fn optional(target: &str) -> DependencyConfig {
        DependencyConfig::Detailed(DetailedDependency {
            action: target.to_string(),
            explicit: true,
            needs_static_outputs: false,
            needs_executed_outputs: false,
            optional: true,
        })
    }

    #[test]
    fn orders_dependencies_first() {
        let graph = ActionGraph::build(&[
            action("run.migrate", &["deploy.web"]),
            action("deploy.web", &["build.web"]),
            action("build.web", &[]),
        ])
        .unwrap();

        let order: Vec<String> = graph
            .topological_order()
            .unwrap()
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(order, vec!["build.web", "deploy.web", "run.migrate"]);
        assert_eq!(
            graph.dependents_of(&"build.web".parse().unwrap()),
            vec!["deploy.web".parse::<ActionKey>().unwrap()]
        );
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = ActionGraph::build(&[action("build.web", &[]), action("build.web", &[])])
            .unwrap_err();
        assert!(matches!(err, TrellisError::Configuration(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn rejects_missing_dependency() {
        let err = ActionGraph::build(&[action("deploy.web", &["build.nope"])]).unwrap_err();
        assert!(matches!(err, TrellisError::Configuration(ref m) if m.contains("build.nope")));
    }

    #[test]
    fn cycle_error_names_every_action() {
        let err = ActionGraph::build(&[
            action("build.a", &["build.b"]),
            action("build.b", &["build.c"]),
            action("build.c", &["build.a"]),
        ])
        .unwrap_err();
        match err {
            TrellisError::CircularDependency { cycle } => {
                assert_eq!(cycle, vec!["build.a", "build.b", "build.c", "build.a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn disabled_actions_stay_visible_but_leave_the_graph() {
        let mut base = action("build.base", &[]);
        base.disabled = true;
        let mut web = action("build.web", &[]);
        web.dependencies.push(optional("build.base"));
        web.dependencies.push(optional("build.ghost"));

        let graph = ActionGraph::build(&[base, web]).unwrap();
        let base_key: ActionKey = "build.base".parse().unwrap();
        let web_key: ActionKey = "build.web".parse().unwrap();

        assert!(graph.contains(&base_key));
        assert!(!graph.is_enabled(&base_key));
        assert!(graph.dependencies_of(&web_key).is_empty());
        assert_eq!(graph.actions_of_kind(ActionKind::Build).count(), 1);
    }

    #[test]
    fn required_dependency_on_disabled_action_is_rejected() {
        let mut base = action("build.base", &[]);
        base.disabled = true;
        let err = ActionGraph::build(&[base, action("build.web", &["build.base"])]).unwrap_err();
        assert!(matches!(err, TrellisError::Configuration(ref m) if m.contains("disabled")));
    }
}
