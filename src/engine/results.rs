// src/engine/results.rs

use std::collections::BTreeMap;
use std::fmt;

use crate::tasks::{TaskKey, TaskResult, TaskType};
use crate::types::ActionKey;

/// Results of one `process` call: every task that ran or was skipped,
/// dependencies included.
#[derive(Debug, Clone, Default)]
pub struct ProcessResults {
    requested: Vec<TaskKey>,
    results: BTreeMap<TaskKey, TaskResult>,
}

/// Counts over a [`ProcessResults`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub aborted: usize,
}

impl fmt::Display for ProcessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tasks: {} succeeded, {} failed, {} skipped",
            self.total, self.succeeded, self.failed, self.aborted
        )
    }
}

impl ProcessResults {
    pub fn new(requested: Vec<TaskKey>, results: BTreeMap<TaskKey, TaskResult>) -> Self {
        Self { requested, results }
    }

    pub fn get(&self, key: &TaskKey) -> Option<&TaskResult> {
        self.results.get(key)
    }

    pub fn get_action(&self, task_type: TaskType, action: &ActionKey) -> Option<&TaskResult> {
        self.results.get(&TaskKey::new(task_type, action.clone()))
    }

    /// The tasks the caller asked for, in request order.
    pub fn requested(&self) -> &[TaskKey] {
        &self.requested
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> Vec<&TaskResult> {
        self.iter().filter(|r| r.is_success()).collect()
    }

    pub fn failed(&self) -> Vec<&TaskResult> {
        self.iter().filter(|r| r.is_failed()).collect()
    }

    pub fn aborted(&self) -> Vec<&TaskResult> {
        self.iter().filter(|r| r.aborted).collect()
    }

    pub fn has_failures(&self) -> bool {
        self.iter().any(|r| !r.is_success())
    }

    pub fn summary(&self) -> ProcessSummary {
        ProcessSummary {
            total: self.results.len(),
            succeeded: self.succeeded().len(),
            failed: self.failed().len(),
            aborted: self.aborted().len(),
        }
    }
}
