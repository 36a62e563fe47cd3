// src/tasks/task.rs

use std::collections::BTreeSet;

use crate::dag::ActionDependency;
use crate::tasks::key::{TaskKey, TaskType};
use crate::types::ActionKey;

/// A scheduled unit of work derived from an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub key: TaskKey,
    /// Skip the result cache for this task.
    pub force: bool,
}

impl Task {
    pub fn new(task_type: TaskType, action: ActionKey) -> Self {
        Self {
            key: TaskKey::new(task_type, action),
            force: false,
        }
    }

    pub fn resolve(action: ActionKey) -> Self {
        Self::new(TaskType::Resolve, action)
    }

    pub fn status(action: ActionKey) -> Self {
        Self::new(TaskType::Status, action)
    }

    pub fn process(action: ActionKey) -> Self {
        Self::new(TaskType::Process, action)
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn action(&self) -> &ActionKey {
        &self.key.action
    }

    pub fn task_type(&self) -> TaskType {
        self.key.task_type
    }

    /// Tasks needed just to know whether this task's action has to be
    /// (re-)executed: the action's own resolve task.
    pub fn resolve_status_dependencies(&self) -> Vec<TaskKey> {
        match self.task_type() {
            TaskType::Resolve => Vec::new(),
            TaskType::Status | TaskType::Process => vec![TaskKey::resolve(self.action())],
        }
    }

    /// Tasks contributed by the action's dependency edges.
    ///
    /// For the resolve task: a dependency's resolve task when the edge is
    /// explicit or needs outputs, plus its process task when executed
    /// outputs are needed. For the process task: the dependency's process
    /// task when the edge is explicit or needs executed outputs. Edges with
    /// no flag set contribute nothing.
    pub fn resolve_process_dependencies(&self, edges: &[ActionDependency]) -> Vec<TaskKey> {
        let mut out = Vec::new();
        match self.task_type() {
            TaskType::Resolve => {
                for edge in edges {
                    if edge.requires_resolve() {
                        out.push(TaskKey::resolve(&edge.key));
                    }
                    if edge.requires_execution_for_resolve() {
                        out.push(TaskKey::process(&edge.key));
                    }
                }
            }
            TaskType::Process => {
                for edge in edges {
                    if edge.requires_execution() {
                        out.push(TaskKey::process(&edge.key));
                    }
                }
            }
            TaskType::Status => {}
        }
        out
    }

    /// Union of both dependency sets, deduplicated and sorted.
    pub fn dependencies(&self, edges: &[ActionDependency]) -> Vec<TaskKey> {
        let set: BTreeSet<TaskKey> = self
            .resolve_status_dependencies()
            .into_iter()
            .chain(self.resolve_process_dependencies(edges))
            .collect();
        set.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionKind;

    fn key(s: &str) -> ActionKey {
        s.parse().unwrap()
    }

    fn keys(v: Vec<TaskKey>) -> Vec<String> {
        v.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn process_task_waits_for_own_resolve_and_executed_dependencies() {
        let edges = vec![
            ActionDependency::explicit(key("build.web")),
            ActionDependency::implicit(key("deploy.db"), true),
            ActionDependency::implicit(key("build.base"), false),
        ];
        let task = Task::process(ActionKey::new(ActionKind::Deploy, "web"));
        assert_eq!(
            keys(task.dependencies(&edges)),
            vec!["resolve.deploy.web", "process.build.web", "process.deploy.db"]
        );
    }

    #[test]
    fn resolve_task_needs_resolved_and_executed_dependencies() {
        let edges = vec![
            ActionDependency::explicit(key("build.web")),
            ActionDependency::implicit(key("deploy.db"), true),
        ];
        let task = Task::resolve(key("run.migrate"));
        assert_eq!(
            keys(task.dependencies(&edges)),
            vec!["resolve.build.web", "resolve.deploy.db", "process.deploy.db"]
        );
    }

    #[test]
    fn flagless_edges_contribute_nothing() {
        let mut edge = ActionDependency::explicit(key("build.web"));
        edge.explicit = false;
        let task = Task::resolve(key("deploy.web"));
        assert!(task.dependencies(&[edge.clone()]).is_empty());
        assert_eq!(
            keys(Task::process(key("deploy.web")).dependencies(&[edge])),
            vec!["resolve.deploy.web"]
        );
    }

    #[test]
    fn status_task_only_needs_its_resolve_task() {
        let edges = vec![ActionDependency::explicit(key("build.web"))];
        let task = Task::status(key("deploy.web"));
        assert_eq!(keys(task.dependencies(&edges)), vec!["resolve.deploy.web"]);
    }
}
