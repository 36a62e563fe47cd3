// src/template/context.rs

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::config::model::{ProviderConfig, Variables};
use crate::template::parse::{Scope, action_path};
use crate::types::ActionKey;

/// Values visible to `${...}` expressions during one resolution pass.
///
/// Every scope is stored as a JSON subtree under its first path segment,
/// so `${deploy.api.outputs.url}` is a plain walk through
/// `deploy -> api -> outputs -> url`.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    root: Map<String, Value>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merged variables, reachable as `var.*` and `variables.*`.
    pub fn with_variables(mut self, variables: &Variables) -> Self {
        let value = Value::Object(variables.clone());
        self.root.insert("var".to_string(), value.clone());
        self.root.insert("variables".to_string(), value);
        self
    }

    pub fn with_environment(mut self, name: &str) -> Self {
        self.root
            .insert("environment".to_string(), json!({ "name": name }));
        self
    }

    pub fn with_project(mut self, name: &str) -> Self {
        self.root.insert("project".to_string(), json!({ "name": name }));
        self
    }

    pub fn with_providers(mut self, providers: &BTreeMap<String, ProviderConfig>) -> Self {
        let mut map = Map::new();
        for (name, provider) in providers {
            map.insert(
                name.clone(),
                json!({ "outputs": Value::Object(provider.outputs.clone()) }),
            );
        }
        self.root.insert("providers".to_string(), Value::Object(map));
        self
    }

    /// The action being resolved.
    pub fn with_this(mut self, key: &ActionKey, type_name: &str) -> Self {
        self.root.insert(
            "this".to_string(),
            json!({ "name": key.name, "kind": key.kind.as_str(), "type": type_name }),
        );
        self
    }

    /// Host facts: `local.env.*`, `local.platform`, `local.arch`.
    pub fn with_local(mut self) -> Self {
        let env: Map<String, Value> = std::env::vars()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        self.root.insert(
            "local".to_string(),
            json!({
                "env": Value::Object(env),
                "platform": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            }),
        );
        self
    }

    /// Expose another action's resolved data under `<kind>.<name>`.
    pub fn insert_action(&mut self, key: &ActionKey, version: Option<&str>, outputs: &Map<String, Value>) {
        let entry = json!({
            "name": key.name,
            "kind": key.kind.as_str(),
            "version": version,
            "outputs": Value::Object(outputs.clone()),
        });
        let kind = self
            .root
            .entry(key.kind.as_str().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = kind {
            map.insert(key.name.clone(), entry);
        }
    }

    /// Outputs of already completed steps, reachable as
    /// `steps.<name>.outputs.*`.
    pub fn with_steps(mut self, steps: &[(String, Map<String, Value>)]) -> Self {
        let mut map = Map::new();
        for (name, outputs) in steps {
            map.insert(name.clone(), json!({ "outputs": Value::Object(outputs.clone()) }));
        }
        self.root.insert("steps".to_string(), Value::Object(map));
        self
    }

    /// Walk `path` through the context. The error lists the keys that were
    /// available at the level where the walk stopped.
    pub fn lookup(&self, path: &[String]) -> Result<&Value, String> {
        let path = match Scope::of(path) {
            Scope::Action => action_path(path),
            _ => path,
        };
        let full = path.join(".");

        let Some((first, rest)) = path.split_first() else {
            return Err("empty expression".to_string());
        };
        let mut current = self.root.get(first).ok_or_else(|| {
            format!(
                "could not resolve '{full}': scope '{first}' is not available (available: {})",
                join_keys(self.root.keys())
            )
        })?;

        for segment in rest {
            current = match current {
                Value::Object(map) => map.get(segment).ok_or_else(|| {
                    format!(
                        "could not resolve '{full}': key '{segment}' not found (available: {})",
                        join_keys(map.keys())
                    )
                })?,
                Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i))
                    .ok_or_else(|| {
                        format!(
                            "could not resolve '{full}': index '{segment}' out of range (length {})",
                            items.len()
                        )
                    })?,
                other => {
                    return Err(format!(
                        "could not resolve '{full}': '{segment}' is looked up on a {} value",
                        type_name(other)
                    ));
                }
            };
        }

        Ok(current)
    }
}

fn join_keys<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    let keys: Vec<&str> = keys.map(|k| k.as_str()).collect();
    if keys.is_empty() {
        "none".to_string()
    } else {
        keys.join(", ")
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
