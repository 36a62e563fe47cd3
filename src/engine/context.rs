// src/engine/context.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::config::{EnvironmentConfig, ProjectConfig, load_and_validate};
use crate::dag::ActionGraph;
use crate::engine::in_flight::InFlight;
use crate::engine::processor::Processor;
use crate::engine::results::ProcessResults;
use crate::engine::runner::TaskWork;
use crate::engine::task_graph::{TaskGraph, requested_task};
use crate::engine::ProcessOptions;
use crate::errors::{Result, TrellisError};
use crate::exec::HandlerRegistry;
use crate::fs::{FileSystem, RealFileSystem};
use crate::tasks::{ResolveOutcome, ResolveRequest, Task, TaskKey, TaskResult, resolve_action};
use crate::types::{ActionKey, CacheStorageMode};
use crate::version::VersionResolver;

/// Overrides applied on top of the project configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Environment to resolve against; defaults to the project's default.
    pub environment: Option<String>,
    pub concurrency: Option<usize>,
    pub cache: Option<CacheStorageMode>,
    pub write_version_files: Option<bool>,
}

/// Everything tasks share during a run, passed explicitly instead of living
/// in globals.
pub struct EngineContext {
    project: ProjectConfig,
    graph: ActionGraph,
    registry: HandlerRegistry,
    versions: VersionResolver,
    cache: ResultCache,
    in_flight: InFlight<(TaskKey, String), TaskResult>,
    permits: Arc<Semaphore>,
    environment: String,
    env_config: EnvironmentConfig,
    concurrency: usize,
    write_version_files: bool,
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("project", &self.project.name())
            .field("environment", &self.environment)
            .field("actions", &self.graph.len())
            .field("concurrency", &self.concurrency)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    pub fn graph(&self) -> &ActionGraph {
        &self.graph
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn versions(&self) -> &VersionResolver {
        &self.versions
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn in_flight(&self) -> &InFlight<(TaskKey, String), TaskResult> {
        &self.in_flight
    }

    pub fn permits(&self) -> &Arc<Semaphore> {
        &self.permits
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn write_version_files(&self) -> bool {
        self.write_version_files
    }

    /// Run the resolve task described by `work`.
    pub fn resolve(&self, work: &TaskWork) -> Result<ResolveOutcome> {
        let key = work.task.action();
        let action = self
            .graph
            .get(key)
            .ok_or_else(|| TrellisError::ActionNotFound(key.to_string()))?;
        let handler = self.registry.get(action.kind(), &action.type_name)?;

        resolve_action(&ResolveRequest {
            action,
            graph: &self.graph,
            project: &self.project,
            environment: &self.environment,
            env_config: &self.env_config,
            handler: handler.as_ref(),
            versions: &self.versions,
            dependencies: &work.edges,
            dependency_results: &work.dependency_results,
            write_version_file: work.write_version_file,
        })
    }
}

/// Handle to a configured engine. Cheap to clone; clones share the result
/// cache and the in-flight registry.
#[derive(Debug, Clone)]
pub struct Engine {
    ctx: Arc<EngineContext>,
}

impl Engine {
    /// Build the action graph and check that every enabled action has a
    /// handler. Structural problems surface here, before any task runs.
    pub fn new(
        project: ProjectConfig,
        registry: HandlerRegistry,
        fs: Arc<dyn FileSystem>,
        options: EngineOptions,
    ) -> Result<Self> {
        let environment = options
            .environment
            .clone()
            .unwrap_or_else(|| project.default_environment().to_string());
        let env_config = project.environment(&environment).ok_or_else(|| {
            let known: Vec<&str> = project.environment_names().collect();
            TrellisError::Configuration(format!(
                "unknown environment '{environment}' (available: {})",
                if known.is_empty() { "none".to_string() } else { known.join(", ") }
            ))
        })?;

        let graph = ActionGraph::build(project.actions())?;
        for action in graph.actions().filter(|a| !a.disabled) {
            registry
                .get(action.kind(), &action.type_name)
                .map_err(|e| TrellisError::Configuration(format!("action '{}': {e}", action.key)))?;
        }

        let concurrency = options
            .concurrency
            .unwrap_or(project.project().concurrency)
            .max(1);
        let cache_mode = options.cache.unwrap_or(project.project().cache);
        let write_version_files = options
            .write_version_files
            .unwrap_or(project.project().write_version_files);
        let cache = ResultCache::for_mode(cache_mode, project.root(), fs.clone());
        if cache_mode == CacheStorageMode::File {
            if let Err(e) = cache.retain_actions(|key| graph.contains(key)) {
                warn!(error = %e, "could not drop results of removed actions");
            }
        }

        info!(
            project = %project.name(),
            environment = %environment,
            actions = graph.len(),
            edges = graph.edge_count(),
            concurrency,
            cache = ?cache_mode,
            "engine ready"
        );

        Ok(Self {
            ctx: Arc::new(EngineContext {
                versions: VersionResolver::new(fs),
                project,
                graph,
                registry,
                cache,
                in_flight: InFlight::new(),
                permits: Arc::new(Semaphore::new(concurrency)),
                environment,
                env_config,
                concurrency,
                write_version_files,
            }),
        })
    }

    /// Load `trellis.toml` from disk and use the built-in handlers.
    pub fn load(config_path: impl AsRef<Path>, options: EngineOptions) -> Result<Self> {
        let project = load_and_validate(config_path)?;
        Self::new(
            project,
            HandlerRegistry::with_builtins(),
            Arc::new(RealFileSystem),
            options,
        )
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn graph(&self) -> &ActionGraph {
        self.ctx.graph()
    }

    /// Run `tasks` and everything they depend on.
    pub async fn process(&self, tasks: Vec<Task>, options: ProcessOptions) -> Result<ProcessResults> {
        Processor::new(self.ctx.clone(), options).run(tasks).await
    }

    /// Tasks that would run for `tasks`, dependencies first. Dependencies
    /// only discovered while resolving templates are not included.
    pub fn plan(&self, tasks: Vec<Task>, options: &ProcessOptions) -> Result<Vec<TaskKey>> {
        let mut graph = TaskGraph::new(self.ctx.graph());
        for task in tasks {
            let force = task.force;
            graph.add(requested_task(task.key.action, task.key.task_type, options.status_only, force))?;
        }
        graph.execution_order()
    }

    /// Resolve every enabled action and report its version.
    pub async fn resolve_versions(&self) -> Result<BTreeMap<ActionKey, String>> {
        self.versions_with(ProcessOptions::default()).await
    }

    /// Resolve every enabled action and write its `.trellis-version` file.
    pub async fn freeze_versions(&self) -> Result<BTreeMap<ActionKey, String>> {
        self.versions_with(ProcessOptions {
            write_version_files: true,
            throw_on_error: true,
            ..ProcessOptions::default()
        })
        .await
    }

    async fn versions_with(&self, options: ProcessOptions) -> Result<BTreeMap<ActionKey, String>> {
        let tasks: Vec<Task> = self
            .graph()
            .actions()
            .filter(|a| !a.disabled)
            .map(|a| Task::resolve(a.key.clone()))
            .collect();
        let results = self.process(tasks, options).await?;

        Ok(results
            .iter()
            .filter(|r| r.task_type() == crate::tasks::TaskType::Resolve && r.is_success())
            .filter_map(|r| r.version.clone().map(|v| (r.action().clone(), v)))
            .collect())
    }
}
