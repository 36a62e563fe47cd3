// src/exec/handler.rs

//! The contract between the engine and action type handlers.
//!
//! The engine only ever talks to handlers through [`ActionTypeHandler`];
//! implementations are looked up by `(kind, type)` in the
//! [`HandlerRegistry`](super::registry::HandlerRegistry). Tests register
//! fakes that count invocations instead of running anything.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::exec::schema::ActionSchema;
use crate::types::{ActionKey, ActionKind, ResultState};

/// Boxed future returned by handler operations.
pub type HandlerFuture<'a> =
    Pin<Box<dyn Future<Output = anyhow::Result<HandlerOutput>> + Send + 'a>>;

/// A fully resolved action, as handed to a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAction {
    pub key: ActionKey,
    pub type_name: String,
    pub base_path: PathBuf,
    /// Spec with templates substituted and schema defaults applied.
    pub spec: Value,
    pub version: String,
    /// Outputs known without executing the action.
    pub static_outputs: Map<String, Value>,
}

impl ResolvedAction {
    pub fn kind(&self) -> ActionKind {
        self.key.kind
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }
}

/// What a status check or execution reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutput {
    pub state: ResultState,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default)]
    pub detail: Value,
}

impl HandlerOutput {
    pub fn new(state: ResultState) -> Self {
        Self {
            state,
            outputs: Map::new(),
            detail: Value::Null,
        }
    }

    pub fn ready(outputs: Map<String, Value>) -> Self {
        Self {
            state: ResultState::Ready,
            outputs,
            detail: Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Type-specific implementation of an action's effect.
pub trait ActionTypeHandler: Send + Sync {
    fn kind(&self) -> ActionKind;

    fn type_name(&self) -> &str;

    /// Schema of the resolved `spec`.
    fn schema(&self) -> ActionSchema {
        ActionSchema::open()
    }

    /// Schema of the outputs this handler produces.
    fn output_schema(&self) -> ActionSchema {
        ActionSchema::open()
    }

    /// Outputs derivable from the resolved spec alone, available to
    /// dependents that only need the action resolved.
    fn static_outputs(&self, _action: &ResolvedAction) -> anyhow::Result<Map<String, Value>> {
        Ok(Map::new())
    }

    /// Report whether the action is up to date without changing anything.
    fn get_status<'a>(&'a self, _action: &'a ResolvedAction) -> HandlerFuture<'a> {
        let output: anyhow::Result<HandlerOutput> = Ok(HandlerOutput::new(ResultState::Unknown));
        Box::pin(std::future::ready(output))
    }

    /// Build, deploy, run or test the action.
    fn execute<'a>(&'a self, action: &'a ResolvedAction) -> HandlerFuture<'a>;
}
