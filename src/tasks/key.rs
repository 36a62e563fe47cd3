// src/tasks/key.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::ActionKey;

/// What a task does with its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskType {
    /// Resolve templates, compute the version, validate the spec.
    Resolve,
    /// Ask the handler whether the action is up to date.
    Status,
    /// Build, deploy, run or test through the handler.
    Process,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Resolve => "resolve",
            TaskType::Status => "status",
            TaskType::Process => "process",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resolve" => Ok(TaskType::Resolve),
            "status" => Ok(TaskType::Status),
            "process" => Ok(TaskType::Process),
            other => Err(format!(
                "invalid task type: {other} (expected resolve, status or process)"
            )),
        }
    }
}

/// Identity of a task: `<type>.<kind>.<name>`, e.g. `process.run.migrate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub task_type: TaskType,
    pub action: ActionKey,
}

impl TaskKey {
    pub fn new(task_type: TaskType, action: ActionKey) -> Self {
        Self { task_type, action }
    }

    pub fn resolve(action: &ActionKey) -> Self {
        Self::new(TaskType::Resolve, action.clone())
    }

    pub fn status(action: &ActionKey) -> Self {
        Self::new(TaskType::Status, action.clone())
    }

    pub fn process(action: &ActionKey) -> Self {
        Self::new(TaskType::Process, action.clone())
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.task_type, self.action)
    }
}

impl FromStr for TaskKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (task_type, action) = s
            .split_once('.')
            .ok_or_else(|| format!("invalid task key '{s}' (expected <type>.<kind>.<name>)"))?;
        Ok(TaskKey::new(task_type.parse()?, action.parse()?))
    }
}

impl Serialize for TaskKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let key: TaskKey = "process.run.migrate".parse().unwrap();
        assert_eq!(key.task_type, TaskType::Process);
        assert_eq!(key.action.to_string(), "run.migrate");
        assert_eq!(key.to_string(), "process.run.migrate");
    }

    #[test]
    fn rejects_unknown_task_types() {
        assert!("publish.build.web".parse::<TaskKey>().is_err());
        assert!("resolve".parse::<TaskKey>().is_err());
    }
}
