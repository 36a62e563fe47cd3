// src/engine/task_graph.rs

//! Pure per-run task graph.
//!
//! This is the synchronous, deterministic half of the processor: it knows
//! which tasks exist, what they wait for, and which may run next. It has
//! no channels, no Tokio types and performs no IO, so every scheduling
//! rule (readiness, failure cascade, dependency expansion, cycle checks)
//! is unit tested here directly.
//!
//! Implicit edges discovered while resolving are merged into this run's
//! edge overlay only; the [`ActionGraph`] itself stays read-only.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info};

use crate::dag::{ActionDependency, ActionGraph, find_cycle};
use crate::errors::{Result, TrellisError};
use crate::tasks::{Task, TaskKey, TaskResult, TaskType};
use crate::types::ActionKey;

/// Per-run state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting on dependencies.
    Pending,
    /// Handed to the async shell.
    Running,
    /// A result was recorded (success or failure).
    Done,
    /// Skipped because a dependency failed.
    Aborted,
}

#[derive(Debug, Clone)]
struct Node {
    task: Task,
    state: NodeState,
    deps: BTreeSet<TaskKey>,
    /// The resolve task already asked for more dependencies once.
    expanded: bool,
}

/// What changed after feeding one event into the graph.
#[derive(Debug, Clone, Default)]
pub struct GraphStep {
    /// Tasks whose dependencies are now complete; already marked running.
    pub newly_ready: Vec<Task>,
    /// Tasks skipped because something they wait for failed.
    pub newly_aborted: Vec<TaskKey>,
    /// No task is pending or running any more.
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct TaskGraph {
    edges: HashMap<ActionKey, Vec<ActionDependency>>,
    enabled: BTreeSet<ActionKey>,
    nodes: BTreeMap<TaskKey, Node>,
    results: BTreeMap<TaskKey, TaskResult>,
}

impl TaskGraph {
    pub fn new(graph: &ActionGraph) -> Self {
        let mut edges = HashMap::new();
        let mut enabled = BTreeSet::new();
        for action in graph.actions().filter(|a| !a.disabled) {
            edges.insert(action.key.clone(), graph.dependencies_of(&action.key).to_vec());
            enabled.insert(action.key.clone());
        }
        Self {
            edges,
            enabled,
            nodes: BTreeMap::new(),
            results: BTreeMap::new(),
        }
    }

    /// Add a requested task and everything it transitively needs.
    pub fn add(&mut self, task: Task) -> Result<()> {
        if !self.enabled.contains(task.action()) {
            return Err(TrellisError::ActionNotFound(task.action().to_string()));
        }

        if let Some(node) = self.nodes.get_mut(&task.key) {
            if task.force && node.state == NodeState::Pending {
                node.task.force = true;
            }
            return Ok(());
        }

        let root = task.key.clone();
        self.insert_node(task);
        self.insert_closure(vec![root]);
        self.settle_blocked();
        Ok(())
    }

    /// Dependency edges of an action for this run, discovered ones included.
    pub fn edges_of(&self, action: &ActionKey) -> &[ActionDependency] {
        self.edges.get(action).map(|e| e.as_slice()).unwrap_or(&[])
    }

    pub fn is_expanded(&self, key: &TaskKey) -> bool {
        self.nodes.get(key).is_some_and(|n| n.expanded)
    }

    pub fn state_of(&self, key: &TaskKey) -> Option<NodeState> {
        self.nodes.get(key).map(|n| n.state)
    }

    /// Direct dependencies of a task.
    pub fn dependencies_of(&self, key: &TaskKey) -> Vec<TaskKey> {
        self.nodes
            .get(key)
            .map(|n| n.deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Results of a task's direct dependencies.
    pub fn dependency_results(&self, key: &TaskKey) -> HashMap<TaskKey, TaskResult> {
        let Some(node) = self.nodes.get(key) else {
            return HashMap::new();
        };
        node.deps
            .iter()
            .filter_map(|d| self.results.get(d).map(|r| (d.clone(), r.clone())))
            .collect()
    }

    /// Pending tasks whose dependencies all succeeded, marked running.
    pub fn collect_ready(&mut self) -> Vec<Task> {
        let candidates: Vec<TaskKey> = self
            .nodes
            .iter()
            .filter(|(_, node)| {
                node.state == NodeState::Pending
                    && node.deps.iter().all(|d| {
                        self.state_of(d) == Some(NodeState::Done)
                            && self.results.get(d).is_some_and(|r| r.is_success())
                    })
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut ready = Vec::with_capacity(candidates.len());
        for key in candidates {
            if let Some(node) = self.nodes.get_mut(&key) {
                debug!(task = %key, "dependencies satisfied; marking Running");
                node.state = NodeState::Running;
                ready.push(node.task.clone());
            }
        }
        ready
    }

    /// Record a finished task and cascade a failure to everything waiting
    /// on it.
    pub fn complete(&mut self, key: &TaskKey, result: TaskResult) -> GraphStep {
        if let Some(node) = self.nodes.get_mut(key) {
            node.state = NodeState::Done;
        }
        let failed = !result.is_success();
        self.results.insert(key.clone(), result);

        let newly_aborted = if failed { self.settle_blocked() } else { Vec::new() };
        self.step(newly_aborted)
    }

    /// Merge dependencies discovered while resolving `key` into the run and
    /// requeue the resolve task behind them.
    ///
    /// Fails with `CircularDependency` when the new edges close a loop; the
    /// reported cycle names actions, not tasks.
    pub fn expand(&mut self, key: &TaskKey, discovered: Vec<ActionDependency>) -> Result<GraphStep> {
        let Some(task) = self.nodes.get(key).map(|n| n.task.clone()) else {
            return Err(TrellisError::Other(anyhow::anyhow!(
                "cannot expand unknown task {key}"
            )));
        };

        let edges = self.edges.entry(task.action().clone()).or_default();
        for dep in discovered {
            match edges.iter_mut().find(|e| e.key == dep.key) {
                Some(existing) => existing.merge(&dep),
                None => edges.push(dep),
            }
        }
        edges.sort_by(|a, b| a.key.cmp(&b.key));

        let deps: BTreeSet<TaskKey> = task.dependencies(self.edges_of(task.action())).into_iter().collect();
        let added: Vec<TaskKey> = deps
            .iter()
            .filter(|d| !self.nodes.contains_key(*d))
            .cloned()
            .collect();
        if let Some(node) = self.nodes.get_mut(key) {
            node.deps = deps;
            node.expanded = true;
            node.state = NodeState::Pending;
        }
        for dep in added.iter() {
            self.insert_node(Task::new(dep.task_type, dep.action.clone()));
        }
        self.insert_closure(added);

        if let Some(cycle) = self.find_cycle() {
            return Err(TrellisError::CircularDependency { cycle });
        }

        info!(
            task = %key,
            dependencies = self.edges_of(task.action()).len(),
            "expanded dependencies discovered during resolution"
        );
        let newly_aborted = self.settle_blocked();
        Ok(self.step(newly_aborted))
    }

    pub fn is_finished(&self) -> bool {
        !self
            .nodes
            .values()
            .any(|n| matches!(n.state, NodeState::Pending | NodeState::Running))
    }

    pub fn running(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.state == NodeState::Running)
            .count()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskKey> {
        self.nodes.keys()
    }

    pub fn result(&self, key: &TaskKey) -> Option<&TaskResult> {
        self.results.get(key)
    }

    pub fn into_results(self) -> BTreeMap<TaskKey, TaskResult> {
        self.results
    }

    /// All known tasks, dependencies first.
    pub fn execution_order(&self) -> Result<Vec<TaskKey>> {
        let mut graph: DiGraph<TaskKey, ()> = DiGraph::new();
        let mut index: HashMap<&TaskKey, NodeIndex> = HashMap::new();
        for key in self.nodes.keys() {
            index.insert(key, graph.add_node(key.clone()));
        }
        for (key, node) in self.nodes.iter() {
            for dep in node.deps.iter() {
                if let (Some(&from), Some(&to)) = (index.get(dep), index.get(key)) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(|n| graph[n].clone()).collect()),
            Err(_) => Err(TrellisError::CircularDependency {
                cycle: self.find_cycle().unwrap_or_default(),
            }),
        }
    }

    fn insert_node(&mut self, task: Task) {
        let deps = task.dependencies(self.edges_of(task.action())).into_iter().collect();
        self.nodes.insert(
            task.key.clone(),
            Node {
                task,
                state: NodeState::Pending,
                deps,
                expanded: false,
            },
        );
    }

    /// Make sure every dependency reachable from `frontier` has a node.
    fn insert_closure(&mut self, mut frontier: Vec<TaskKey>) {
        while let Some(key) = frontier.pop() {
            let deps: Vec<TaskKey> = self
                .nodes
                .get(&key)
                .map(|n| n.deps.iter().cloned().collect())
                .unwrap_or_default();
            for dep in deps {
                if self.nodes.contains_key(&dep) {
                    continue;
                }
                self.insert_node(Task::new(dep.task_type, dep.action.clone()));
                frontier.push(dep);
            }
        }
    }

    /// Abort pending tasks that wait on a failed or aborted task, until
    /// nothing changes.
    fn settle_blocked(&mut self) -> Vec<TaskKey> {
        let mut aborted = Vec::new();
        loop {
            let blocked: Vec<(TaskKey, TaskKey)> = self
                .nodes
                .iter()
                .filter(|(_, n)| n.state == NodeState::Pending)
                .filter_map(|(key, n)| {
                    n.deps
                        .iter()
                        .find(|d| self.results.get(*d).is_some_and(|r| !r.is_success()))
                        .map(|d| (key.clone(), d.clone()))
                })
                .collect();
            if blocked.is_empty() {
                return aborted;
            }
            for (key, blocker) in blocked {
                debug!(task = %key, blocked_by = %blocker, "aborting task after upstream failure");
                if let Some(node) = self.nodes.get_mut(&key) {
                    node.state = NodeState::Aborted;
                }
                self.results
                    .insert(key.clone(), TaskResult::aborted(key.clone(), &blocker));
                aborted.push(key);
            }
        }
    }

    fn step(&mut self, newly_aborted: Vec<TaskKey>) -> GraphStep {
        let newly_ready = self.collect_ready();
        GraphStep {
            newly_ready,
            newly_aborted,
            finished: self.is_finished(),
        }
    }

    fn find_cycle(&self) -> Option<Vec<String>> {
        let cycle = find_cycle(self.nodes.keys().cloned(), |key: &TaskKey| {
            self.nodes
                .get(key)
                .map(|n| n.deps.iter().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        })?;

        let mut actions: Vec<String> = Vec::with_capacity(cycle.len());
        for key in cycle.iter().rev() {
            let action = key.action.to_string();
            if actions.last() != Some(&action) {
                actions.push(action);
            }
        }
        Some(actions)
    }
}

/// The task actually requested for an action, honoring a status-only run.
pub fn requested_task(action: ActionKey, task_type: TaskType, status_only: bool, force: bool) -> Task {
    let task_type = match task_type {
        TaskType::Process if status_only => TaskType::Status,
        other => other,
    };
    Task::new(task_type, action).with_force(force)
}
