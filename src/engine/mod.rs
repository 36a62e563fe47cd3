// src/engine/mod.rs

//! Orchestration engine for trellis.
//!
//! This module ties together:
//! - the pure per-run task graph ([`task_graph`]): readiness, failure
//!   cascade, dependency expansion
//! - the async processor ([`processor`]) that spawns ready tasks under a
//!   concurrency limit and feeds their events back into the graph
//! - per-task execution ([`runner`]) with result caching and at-most-once
//!   dispatch per task key and version ([`in_flight`])
//! - the shared [`EngineContext`] and the [`Engine`] handle callers use.

use crate::dag::ActionDependency;
use crate::tasks::{TaskKey, TaskResult};

/// Per-call processing options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    /// Stop at the first failed task and return `TaskFailed`.
    pub throw_on_error: bool,
    /// Turn requested process tasks into status tasks.
    pub status_only: bool,
    /// Re-run requested tasks even when a cached result matches.
    pub force: bool,
    /// Ignore the result cache for every task in this call.
    pub no_cache: bool,
    /// Write `.trellis-version` files while resolving.
    pub write_version_files: bool,
}

/// Events flowing from spawned tasks back into the processor.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// The task finished with a result (successful or not).
    Completed { key: TaskKey, result: TaskResult },
    /// A resolve task found template references to actions it does not
    /// depend on yet.
    NeedsDependencies {
        key: TaskKey,
        dependencies: Vec<ActionDependency>,
    },
}

pub mod context;
pub mod in_flight;
pub mod instrument;
pub mod processor;
pub mod results;
pub mod runner;
pub mod task_graph;

pub use context::{Engine, EngineContext, EngineOptions};
pub use in_flight::InFlight;
pub use processor::Processor;
pub use results::{ProcessResults, ProcessSummary};
pub use task_graph::{GraphStep, NodeState, TaskGraph};
