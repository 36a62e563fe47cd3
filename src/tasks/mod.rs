// src/tasks/mod.rs

//! Tasks: the schedulable units derived from actions.
//!
//! Every action yields up to three tasks (`resolve`, `status`, `process`);
//! [`Task`] knows how to expand its own dependencies from the action's
//! edges, and [`resolve`] implements the resolve task itself.

pub mod key;
pub mod resolve;
pub mod result;
pub mod task;

pub use key::{TaskKey, TaskType};
pub use resolve::{ResolveOutcome, ResolveRequest, merge_variables, resolve_action};
pub use result::TaskResult;
pub use task::Task;
