// src/engine/runner.rs

//! Execution of a single task, spawned by the processor.
//!
//! Every runner ends by sending exactly one [`TaskEvent`] back. Result
//! cache writes happen here rather than in the processor, so a task left
//! running after its processor gave up still records its outcome.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dag::ActionDependency;
use crate::engine::TaskEvent;
use crate::engine::context::EngineContext;
use crate::engine::instrument::{instrumented, spawn_blocking_in_span};
use crate::errors::{Result, TrellisError};
use crate::exec::ResolvedAction;
use crate::tasks::{ResolveOutcome, Task, TaskKey, TaskResult, TaskType};

/// A ready task plus the snapshot of graph state it needs.
#[derive(Debug, Clone)]
pub struct TaskWork {
    pub task: Task,
    /// Effective edges of the task's action for this run.
    pub edges: Vec<ActionDependency>,
    pub dependency_results: HashMap<TaskKey, TaskResult>,
    /// The resolve task already expanded its dependencies once.
    pub expanded: bool,
    pub no_cache: bool,
    pub write_version_file: bool,
}

pub async fn run_task(ctx: Arc<EngineContext>, work: TaskWork, tx: mpsc::Sender<TaskEvent>) {
    let key = work.task.key.clone();
    let type_name = ctx
        .graph()
        .get(work.task.action())
        .map(|a| a.type_name.clone())
        .unwrap_or_default();

    let event = match ctx.permits().clone().acquire_owned().await {
        Ok(_permit) => instrumented(&key, &type_name, execute(ctx.clone(), work)).await,
        Err(_) => TaskEvent::Completed {
            key: key.clone(),
            result: TaskResult::failed(key.clone(), None, "task permits closed", Utc::now()),
        },
    };

    if tx.send(event).await.is_err() {
        debug!(task = %key, "processor no longer listening; dropping task event");
    }
}

async fn execute(ctx: Arc<EngineContext>, work: TaskWork) -> TaskEvent {
    let key = work.task.key.clone();
    match key.task_type {
        TaskType::Resolve => resolve(ctx, work).await,
        TaskType::Status => TaskEvent::Completed {
            key,
            result: status(&ctx, &work).await,
        },
        TaskType::Process => TaskEvent::Completed {
            key,
            result: process(&ctx, &work).await,
        },
    }
}

async fn resolve(ctx: Arc<EngineContext>, work: TaskWork) -> TaskEvent {
    let key = work.task.key.clone();
    let started_at = Utc::now();
    let expanded = work.expanded;

    let joined = spawn_blocking_in_span(move || ctx.resolve(&work)).await;
    let outcome = joined.unwrap_or_else(|e| Err(TrellisError::Other(anyhow!("resolve task panicked: {e}"))));

    match outcome {
        Ok(ResolveOutcome::Resolved(result)) => TaskEvent::Completed { key, result },
        Ok(ResolveOutcome::NeedsDependencies(dependencies)) if expanded => {
            let names: Vec<String> = dependencies.iter().map(|d| d.key.to_string()).collect();
            let err = TrellisError::template(
                key.to_string(),
                format!(
                    "references to {} were still unresolved after expanding dependencies",
                    names.join(", ")
                ),
            );
            TaskEvent::Completed {
                result: TaskResult::failed(key.clone(), None, err.to_string(), started_at),
                key,
            }
        }
        Ok(ResolveOutcome::NeedsDependencies(dependencies)) => {
            TaskEvent::NeedsDependencies { key, dependencies }
        }
        Err(err) => TaskEvent::Completed {
            result: TaskResult::failed(key.clone(), None, err.to_string(), started_at),
            key,
        },
    }
}

async fn status(ctx: &Arc<EngineContext>, work: &TaskWork) -> TaskResult {
    let key = work.task.key.clone();
    let started_at = Utc::now();
    let resolved = match resolved_action(work) {
        Ok(resolved) => resolved,
        Err(err) => return TaskResult::failed(key, None, err.to_string(), started_at),
    };
    let version = resolved.version.clone();
    let handler = match ctx.registry().get(resolved.kind(), &resolved.type_name) {
        Ok(handler) => handler,
        Err(err) => return TaskResult::failed(key, Some(version), err.to_string(), started_at),
    };

    let run_key = key.clone();
    let (result, _) = ctx
        .in_flight()
        .run((key, version.clone()), || async move {
            match handler.get_status(&resolved).await {
                Ok(output) => TaskResult::from_output(run_key, &version, output, started_at),
                Err(e) => {
                    let err = TrellisError::Handler {
                        key: run_key.to_string(),
                        message: format!("{e:#}"),
                    };
                    TaskResult::failed(run_key, Some(version), err.to_string(), started_at)
                }
            }
        })
        .await;
    result
}

async fn process(ctx: &Arc<EngineContext>, work: &TaskWork) -> TaskResult {
    let key = work.task.key.clone();
    let started_at = Utc::now();
    let resolved = match resolved_action(work) {
        Ok(resolved) => resolved,
        Err(err) => return TaskResult::failed(key, None, err.to_string(), started_at),
    };
    let version = resolved.version.clone();
    let use_cache = !(work.task.force || work.no_cache);

    if use_cache {
        match ctx.cache().get(&key, &version) {
            Ok(Some(hit)) => {
                debug!(task = %key, version = %version, "result cache hit");
                return hit;
            }
            Ok(None) => {}
            Err(e) => warn!(task = %key, error = %e, "result cache lookup failed"),
        }
    }

    let handler = match ctx.registry().get(resolved.kind(), &resolved.type_name) {
        Ok(handler) => handler,
        Err(err) => return TaskResult::failed(key, Some(version), err.to_string(), started_at),
    };

    let run_ctx = ctx.clone();
    let run_key = key.clone();
    let (result, _) = ctx
        .in_flight()
        .run((key, version.clone()), || async move {
            // A producer that finished between our lookup above and this
            // point has already stored its result.
            if use_cache {
                if let Ok(Some(hit)) = run_ctx.cache().get(&run_key, &version) {
                    debug!(task = %run_key, version = %version, "result cache hit");
                    return hit;
                }
            }

            let result = match handler.execute(&resolved).await {
                Ok(output) => TaskResult::from_output(run_key.clone(), &version, output, started_at),
                Err(e) => {
                    let err = TrellisError::Handler {
                        key: run_key.to_string(),
                        message: format!("{e:#}"),
                    };
                    TaskResult::failed(run_key.clone(), Some(version), err.to_string(), started_at)
                }
            };
            if let Err(e) = run_ctx.cache().set(&result) {
                warn!(task = %run_key, error = %e, "failed to store task result");
            }
            result
        })
        .await;
    result
}

/// The resolved action carried by the task's own resolve result.
fn resolved_action(work: &TaskWork) -> Result<ResolvedAction> {
    work.dependency_results
        .get(&TaskKey::resolve(work.task.action()))
        .and_then(|r| r.resolved.clone())
        .ok_or_else(|| {
            TrellisError::Other(anyhow!(
                "{} ran without a resolved {}",
                work.task.key,
                work.task.action()
            ))
        })
}
