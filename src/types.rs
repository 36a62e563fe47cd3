use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The four kinds of declared actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    Build,
    Deploy,
    Run,
    Test,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Build,
        ActionKind::Deploy,
        ActionKind::Run,
        ActionKind::Test,
    ];

    /// Lowercase name used in keys and template expressions (`deploy.api`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Build => "build",
            ActionKind::Deploy => "deploy",
            ActionKind::Run => "run",
            ActionKind::Test => "test",
        }
    }

    /// Whether outputs of this kind only exist after the action has executed.
    ///
    /// Build outputs are computed by the handler at resolve time, everything
    /// else produces its outputs at runtime (ports, URLs, logs).
    pub fn has_runtime_outputs(&self) -> bool {
        !matches!(self, ActionKind::Build)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "build" => Ok(ActionKind::Build),
            "deploy" => Ok(ActionKind::Deploy),
            "run" => Ok(ActionKind::Run),
            "test" => Ok(ActionKind::Test),
            other => Err(format!(
                "invalid action kind: {other} (expected Build, Deploy, Run or Test)"
            )),
        }
    }
}

impl Serialize for ActionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of an action: `kind.name`, unique within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionKey {
    pub kind: ActionKind,
    pub name: String,
}

impl ActionKey {
    pub fn new(kind: ActionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for ActionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| format!("invalid action reference '{s}' (expected <kind>.<name>)"))?;
        if name.is_empty() || name.contains('.') {
            return Err(format!(
                "invalid action reference '{s}' (expected <kind>.<name>)"
            ));
        }
        Ok(ActionKey::new(kind.parse()?, name))
    }
}

impl Serialize for ActionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ActionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Terminal state of a task result.
///
/// Tasks blocked by a failed dependency end up as `Unknown` with
/// `aborted = true` on the result; there is deliberately no separate
/// "skipped" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultState {
    Ready,
    NotReady,
    Unknown,
    Outdated,
    Failed,
}

impl ResultState {
    pub fn is_failed(&self) -> bool {
        matches!(self, ResultState::Failed)
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultState::Ready => "ready",
            ResultState::NotReady => "not-ready",
            ResultState::Unknown => "unknown",
            ResultState::Outdated => "outdated",
            ResultState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Where task results are kept between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheStorageMode {
    /// Keep results in memory only (lost when the process exits).
    #[default]
    Memory,
    /// Persist results to `.trellis/results.json` under the project root.
    File,
}

impl FromStr for CacheStorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(CacheStorageMode::Memory),
            "file" => Ok(CacheStorageMode::File),
            other => Err(format!(
                "invalid cache mode: {other} (expected \"memory\" or \"file\")"
            )),
        }
    }
}
