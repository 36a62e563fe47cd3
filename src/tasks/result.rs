// src/tasks/result.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::exec::{HandlerOutput, ResolvedAction};
use crate::tasks::key::{TaskKey, TaskType};
use crate::types::{ActionKey, ResultState};

/// Outcome of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub key: TaskKey,
    pub state: ResultState,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default)]
    pub detail: Value,
    /// Version of the action this result was produced for.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// The task never ran because a dependency failed.
    #[serde(default)]
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Set on successful resolve results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<ResolvedAction>,
}

impl TaskResult {
    fn base(key: TaskKey, state: ResultState, started_at: DateTime<Utc>) -> Self {
        Self {
            key,
            state,
            outputs: Map::new(),
            detail: Value::Null,
            version: None,
            error: None,
            aborted: false,
            started_at,
            completed_at: Utc::now(),
            resolved: None,
        }
    }

    /// A successful resolution, carrying the resolved action and its static
    /// outputs.
    pub fn resolved(
        key: TaskKey,
        action: ResolvedAction,
        detail: Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut result = Self::base(key, ResultState::Ready, started_at);
        result.outputs = action.static_outputs.clone();
        result.version = Some(action.version.clone());
        result.detail = detail;
        result.resolved = Some(action);
        result
    }

    /// Result of a status check or execution.
    pub fn from_output(
        key: TaskKey,
        version: &str,
        output: HandlerOutput,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut result = Self::base(key, output.state, started_at);
        result.outputs = output.outputs;
        result.detail = output.detail;
        result.version = Some(version.to_string());
        result
    }

    pub fn failed(
        key: TaskKey,
        version: Option<String>,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut result = Self::base(key, ResultState::Failed, started_at);
        result.version = version;
        result.error = Some(error.into());
        result
    }

    /// Placeholder for a task skipped because `blocked_by` failed.
    pub fn aborted(key: TaskKey, blocked_by: &TaskKey) -> Self {
        let now = Utc::now();
        let mut result = Self::base(key, ResultState::Unknown, now);
        result.aborted = true;
        result.error = Some(format!("dependency {blocked_by} failed"));
        result
    }

    pub fn action(&self) -> &ActionKey {
        &self.key.action
    }

    pub fn task_type(&self) -> TaskType {
        self.key.task_type
    }

    pub fn is_failed(&self) -> bool {
        self.state.is_failed()
    }

    /// Neither failed nor skipped.
    pub fn is_success(&self) -> bool {
        !self.is_failed() && !self.aborted
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_results_are_unknown_but_not_failed() {
        let key: TaskKey = "process.deploy.web".parse().unwrap();
        let blocker: TaskKey = "process.build.web".parse().unwrap();
        let result = TaskResult::aborted(key, &blocker);

        assert_eq!(result.state, ResultState::Unknown);
        assert!(result.aborted);
        assert!(!result.is_failed());
        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("dependency process.build.web failed"));
    }

    #[test]
    fn serializes_task_key_as_string() {
        let key: TaskKey = "status.deploy.api".parse().unwrap();
        let result = TaskResult::failed(key, Some("v-abc".into()), "boom", Utc::now());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["key"], "status.deploy.api");
        assert_eq!(json["state"], serde_json::to_value(ResultState::Failed).unwrap());

        let back: TaskResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
