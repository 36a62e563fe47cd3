// src/tasks/resolve.rs

//! Resolution of a single action: template substitution, implicit
//! dependency discovery, versioning and schema validation.
//!
//! Resolution is synchronous and side-effect free apart from the optional
//! version file; the engine runs it on the blocking pool.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::model::{EnvironmentConfig, ProjectConfig, Variables};
use crate::dag::{Action, ActionDependency, ActionGraph};
use crate::errors::{Result, TrellisError};
use crate::exec::{ActionTypeHandler, ResolvedAction};
use crate::tasks::key::TaskKey;
use crate::tasks::result::TaskResult;
use crate::template::{
    ActionReference, Pass, TemplateContext, check_step_references, resolve_template,
    scan_action_references,
};
use crate::version::{VersionResolver, write_version_file};

/// What resolving an action produced.
#[derive(Debug)]
pub enum ResolveOutcome {
    Resolved(TaskResult),
    /// Template references to actions that are not yet dependencies. The
    /// caller adds the edges and runs resolution again.
    NeedsDependencies(Vec<ActionDependency>),
}

/// Everything one resolution needs, borrowed from the engine.
pub struct ResolveRequest<'a> {
    pub action: &'a Action,
    pub graph: &'a ActionGraph,
    pub project: &'a ProjectConfig,
    pub environment: &'a str,
    pub env_config: &'a EnvironmentConfig,
    pub handler: &'a dyn ActionTypeHandler,
    pub versions: &'a VersionResolver,
    /// Effective edges of the action: declared plus discovered so far.
    pub dependencies: &'a [ActionDependency],
    /// Completed resolve/process results of the dependencies.
    pub dependency_results: &'a HashMap<TaskKey, TaskResult>,
    pub write_version_file: bool,
}

/// Variables in precedence order: project, environment, environment
/// varfiles, action (which already include the action's varfiles).
pub fn merge_variables(
    project: &ProjectConfig,
    env: &EnvironmentConfig,
    action: &Action,
) -> Variables {
    let mut merged = project.variables().clone();
    for layer in [&env.variables, &env.varfile_variables, &action.variables] {
        for (k, v) in layer {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

pub fn resolve_action(req: &ResolveRequest<'_>) -> Result<ResolveOutcome> {
    let started_at = Utc::now();
    let action = req.action;
    let task_key = TaskKey::resolve(&action.key);
    let context = task_key.to_string();

    let variables = merge_variables(req.project, req.env_config, action);
    let base = TemplateContext::new()
        .with_variables(&variables)
        .with_environment(req.environment)
        .with_project(req.project.name())
        .with_providers(req.project.providers())
        .with_this(&action.key, &action.type_name)
        .with_local();

    let partial = resolve_template(&action.spec, &base, Pass::Partial, &context)?;

    let references = scan_action_references(&partial)
        .map_err(|message| TrellisError::template(&context, message))?;
    let missing = missing_dependencies(req, &context, &references)?;
    if !missing.is_empty() {
        debug!(
            task = %task_key,
            discovered = missing.len(),
            "resolution needs additional dependencies"
        );
        return Ok(ResolveOutcome::NeedsDependencies(missing));
    }

    let mut ctx = base;
    let mut dependency_versions = BTreeMap::new();
    for dep in req.dependencies {
        let Some(resolved) = req.dependency_results.get(&TaskKey::resolve(&dep.key)) else {
            continue;
        };
        let mut outputs = resolved.outputs.clone();
        if let Some(processed) = req.dependency_results.get(&TaskKey::process(&dep.key)) {
            for (k, v) in &processed.outputs {
                outputs.insert(k.clone(), v.clone());
            }
        }
        ctx.insert_action(&dep.key, resolved.version.as_deref(), &outputs);
        if let Some(version) = &resolved.version {
            dependency_versions.insert(dep.key.to_string(), version.clone());
        }
    }

    let full = resolve_template(&partial, &ctx, Pass::Full, &context)?;
    check_step_references(&full).map_err(|message| TrellisError::template(&context, message))?;

    let version = req
        .versions
        .resolve_version(action, &full, &dependency_versions)?;

    let spec = req.handler.schema().validate(&full, &context, "spec")?;

    let mut resolved = ResolvedAction {
        key: action.key.clone(),
        type_name: action.type_name.clone(),
        base_path: action.base_path.clone(),
        spec,
        version: version.version.clone(),
        static_outputs: Default::default(),
    };
    let static_outputs = req
        .handler
        .static_outputs(&resolved)
        .map_err(|e| TrellisError::Handler {
            key: context.clone(),
            message: format!("{e:#}"),
        })?;
    let static_outputs = req
        .handler
        .output_schema()
        .validate(&Value::Object(static_outputs), &context, "outputs")?;
    if let Value::Object(map) = static_outputs {
        resolved.static_outputs = map;
    }

    if req.write_version_file {
        write_version_file(req.versions.fs(), &action.base_path, &version)?;
    }

    let detail = json!({
        "source_hash": version.source_hash,
        "config_hash": version.config_hash,
        "dependency_versions": version.dependency_versions,
    });
    Ok(ResolveOutcome::Resolved(TaskResult::resolved(
        task_key, resolved, detail, started_at,
    )))
}

/// Turn references into edges the action does not have yet (or has with
/// weaker requirements).
fn missing_dependencies(
    req: &ResolveRequest<'_>,
    context: &str,
    references: &[ActionReference],
) -> Result<Vec<ActionDependency>> {
    let mut missing = Vec::new();
    for reference in references {
        if reference.key == req.action.key {
            return Err(TrellisError::template(
                context,
                format!("'{}' references the action itself", reference.raw),
            ));
        }
        if !req.graph.contains(&reference.key) {
            if reference.optional {
                continue;
            }
            return Err(TrellisError::template(
                context,
                format!(
                    "'{}' references action '{}', which does not exist",
                    reference.raw, reference.key
                ),
            ));
        }
        if !req.graph.is_enabled(&reference.key) {
            if reference.optional {
                continue;
            }
            return Err(TrellisError::template(
                context,
                format!(
                    "'{}' references action '{}', which is disabled",
                    reference.raw, reference.key
                ),
            ));
        }

        let needs_executed = reference.needs_executed_outputs();
        let satisfied = req
            .dependencies
            .iter()
            .find(|d| d.key == reference.key)
            .is_some_and(|d| {
                d.requires_resolve() && (!needs_executed || d.requires_execution_for_resolve())
            });
        if !satisfied {
            missing.push(ActionDependency::implicit(reference.key.clone(), needs_executed));
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{ActionConfig, RawProjectConfig};
    use crate::exec::{ExecHandler, HandlerOutput};
    use crate::fs::mock::MockFileSystem;
    use crate::types::ActionKey;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn action(key: &str, spec: Value) -> ActionConfig {
        let key: ActionKey = key.parse().unwrap();
        ActionConfig {
            kind: key.kind,
            source: Some(key.name.clone()),
            name: key.name,
            type_name: "exec".to_string(),
            include: None,
            exclude: Vec::new(),
            disabled: false,
            variables: Variables::new(),
            varfiles: Vec::new(),
            dependencies: Vec::new(),
            copy_from: Vec::new(),
            spec,
            config_dir: PathBuf::new(),
            varfile_variables: Variables::new(),
        }
    }

    fn project(actions: Vec<ActionConfig>) -> ProjectConfig {
        let mut raw = RawProjectConfig {
            actions,
            ..Default::default()
        };
        raw.project.name = "shop".to_string();
        raw.variables.insert("registry".into(), json!("localhost:5000"));
        ProjectConfig::new_unchecked(raw)
    }

    fn resolve(
        project: &ProjectConfig,
        key: &str,
        dependencies: &[ActionDependency],
        results: &HashMap<TaskKey, TaskResult>,
    ) -> Result<ResolveOutcome> {
        let fs = MockFileSystem::new();
        fs.add_file("web/index.js", "console.log('hi')");
        let versions = VersionResolver::new(Arc::new(fs));
        let graph = ActionGraph::build(project.actions())?;
        let key: ActionKey = key.parse().unwrap();
        let action = graph.get(&key).unwrap();
        let handler = ExecHandler::new(key.kind);
        let env = EnvironmentConfig::default();
        resolve_action(&ResolveRequest {
            action,
            graph: &graph,
            project,
            environment: "default",
            env_config: &env,
            handler: &handler,
            versions: &versions,
            dependencies,
            dependency_results: results,
            write_version_file: false,
        })
    }

    fn resolved(outcome: ResolveOutcome) -> TaskResult {
        match outcome {
            ResolveOutcome::Resolved(result) => result,
            other => panic!("expected a resolved action, got {other:?}"),
        }
    }

    #[test]
    fn resolves_variables_and_static_outputs() {
        let project = project(vec![action(
            "build.web",
            json!({ "command": ["docker", "build", "-t", "${var.registry}/web"] }),
        )]);

        let result = resolved(resolve(&project, "build.web", &[], &HashMap::new()).unwrap());
        let resolved = result.resolved.as_ref().unwrap();

        assert_eq!(resolved.spec["command"][3], "localhost:5000/web");
        assert_eq!(resolved.spec["shell"], false);
        assert!(resolved.version.starts_with("v-"));
        assert_eq!(result.version.as_deref(), Some(resolved.version.as_str()));
        assert_eq!(result.outputs["path"], "web");
    }

    #[test]
    fn discovers_missing_dependencies_from_references() {
        let project = project(vec![
            action("build.web", json!({})),
            action("deploy.db", json!({})),
            action(
                "run.migrate",
                json!({ "command": ["migrate", "${deploy.db.outputs.url}", "${build.web.version}"] }),
            ),
        ]);

        let outcome = resolve(&project, "run.migrate", &[], &HashMap::new()).unwrap();
        let ResolveOutcome::NeedsDependencies(mut deps) = outcome else {
            panic!("expected dependency discovery");
        };
        deps.sort_by(|a, b| a.key.cmp(&b.key));

        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].key.to_string(), "build.web");
        assert!(!deps[0].needs_executed_outputs);
        assert_eq!(deps[1].key.to_string(), "deploy.db");
        assert!(deps[1].needs_executed_outputs);
    }

    #[test]
    fn substitutes_dependency_outputs_once_edges_exist() {
        let project = project(vec![
            action("deploy.db", json!({})),
            action("run.migrate", json!({ "command": ["migrate", "${deploy.db.outputs.url}"] })),
        ]);
        let db: ActionKey = "deploy.db".parse().unwrap();
        let deps = vec![ActionDependency::implicit(db.clone(), true)];

        let mut results = HashMap::new();
        results.insert(
            TaskKey::resolve(&db),
            TaskResult::from_output(
                TaskKey::resolve(&db),
                "v-000000000001",
                HandlerOutput::ready(Default::default()),
                Utc::now(),
            ),
        );
        let mut outputs = serde_json::Map::new();
        outputs.insert("url".into(), json!("postgres://db:5432"));
        results.insert(
            TaskKey::process(&db),
            TaskResult::from_output(
                TaskKey::process(&db),
                "v-000000000001",
                HandlerOutput::ready(outputs),
                Utc::now(),
            ),
        );

        let result = resolved(resolve(&project, "run.migrate", &deps, &results).unwrap());
        let resolved = result.resolved.unwrap();

        assert_eq!(resolved.spec["command"][1], "postgres://db:5432");
        assert_eq!(result.detail["dependency_versions"]["deploy.db"], "v-000000000001");
    }

    #[test]
    fn unknown_reference_is_a_template_error() {
        let project = project(vec![action(
            "deploy.web",
            json!({ "command": ["echo", "${build.nope.outputs.image}"] }),
        )]);

        let err = resolve(&project, "deploy.web", &[], &HashMap::new()).unwrap_err();
        assert!(matches!(err, TrellisError::Template { .. }), "{err}");
        assert!(err.to_string().contains("build.nope"));
    }

    #[test]
    fn optional_reference_to_missing_action_resolves_to_null() {
        let project = project(vec![action(
            "deploy.web",
            json!({ "command": ["echo"], "env": { "IMAGE": "${build.nope.outputs.image}?" } }),
        )]);

        let result = resolved(resolve(&project, "deploy.web", &[], &HashMap::new()).unwrap());
        assert_eq!(result.resolved.unwrap().spec["env"]["IMAGE"], Value::Null);
    }

    #[test]
    fn self_reference_is_rejected() {
        let project = project(vec![action("build.web", json!({ "command": ["${build.web.version}"] }))]);
        let err = resolve(&project, "build.web", &[], &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("itself"));
    }
}
