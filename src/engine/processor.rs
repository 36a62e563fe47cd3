// src/engine/processor.rs

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::context::EngineContext;
use crate::engine::results::ProcessResults;
use crate::engine::runner::{TaskWork, run_task};
use crate::engine::task_graph::{TaskGraph, requested_task};
use crate::engine::{ProcessOptions, TaskEvent};
use crate::errors::{Result, TrellisError};
use crate::tasks::{Task, TaskKey};

const EVENT_BUFFER: usize = 64;

/// Drives a [`TaskGraph`] to completion.
///
/// This is the async shell around the pure graph: it spawns ready tasks,
/// reads their [`TaskEvent`]s from a channel and feeds them back into the
/// graph until nothing is pending or running.
pub struct Processor {
    ctx: Arc<EngineContext>,
    options: ProcessOptions,
    graph: TaskGraph,
    event_tx: mpsc::Sender<TaskEvent>,
    event_rx: mpsc::Receiver<TaskEvent>,
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("options", &self.options)
            .field("tasks", &self.graph.len())
            .finish_non_exhaustive()
    }
}

impl Processor {
    pub fn new(ctx: Arc<EngineContext>, options: ProcessOptions) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let graph = TaskGraph::new(ctx.graph());
        Self {
            ctx,
            options,
            graph,
            event_tx,
            event_rx,
        }
    }

    /// Main event loop.
    ///
    /// With `throw_on_error`, the first failed task ends the loop with
    /// `TaskFailed`; tasks already spawned keep running detached and still
    /// record their results in the cache.
    pub async fn run(mut self, tasks: Vec<Task>) -> Result<ProcessResults> {
        let mut requested: Vec<TaskKey> = Vec::with_capacity(tasks.len());
        for task in tasks {
            let force = task.force;
            let task = requested_task(
                task.key.action,
                task.key.task_type,
                self.options.status_only,
                force || self.options.force,
            );
            requested.push(task.key.clone());
            self.graph.add(task)?;
        }

        info!(
            requested = requested.len(),
            tasks = self.graph.len(),
            concurrency = self.ctx.concurrency(),
            "processing tasks"
        );

        let ready = self.graph.collect_ready();
        self.dispatch(ready);

        while !self.graph.is_finished() {
            if self.graph.running() == 0 {
                return Err(TrellisError::Other(anyhow!(
                    "task graph stalled with pending tasks and nothing running"
                )));
            }

            let Some(event) = self.event_rx.recv().await else {
                return Err(TrellisError::Other(anyhow!("task event channel closed")));
            };

            let step = match event {
                TaskEvent::Completed { key, result } => {
                    if self.options.throw_on_error && result.is_failed() {
                        return Err(TrellisError::TaskFailed {
                            key: key.to_string(),
                            message: result
                                .error
                                .clone()
                                .unwrap_or_else(|| "unknown error".to_string()),
                        });
                    }
                    self.graph.complete(&key, result)
                }
                TaskEvent::NeedsDependencies { key, dependencies } => {
                    debug!(task = %key, discovered = dependencies.len(), "expanding task graph");
                    self.graph.expand(&key, dependencies)?
                }
            };

            for aborted in step.newly_aborted.iter() {
                warn!(task = %aborted, "skipped after upstream failure");
            }
            self.dispatch(step.newly_ready);
        }

        let results = ProcessResults::new(requested, self.graph.into_results());
        info!(summary = %results.summary(), "processing finished");
        Ok(results)
    }

    fn dispatch(&self, tasks: Vec<Task>) {
        if tasks.is_empty() {
            return;
        }
        let names: Vec<String> = tasks.iter().map(|t| t.key.to_string()).collect();
        debug!(?names, "spawning ready tasks");

        for task in tasks {
            let work = TaskWork {
                edges: self.graph.edges_of(task.action()).to_vec(),
                dependency_results: self.graph.dependency_results(&task.key),
                expanded: self.graph.is_expanded(&task.key),
                no_cache: self.options.no_cache,
                write_version_file: self.options.write_version_files
                    || self.ctx.write_version_files(),
                task,
            };
            tokio::spawn(run_task(self.ctx.clone(), work, self.event_tx.clone()));
        }
    }
}
