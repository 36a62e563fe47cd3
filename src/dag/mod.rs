// src/dag/mod.rs

//! Declared actions and the static dependency graph between them.
//!
//! - [`action`] turns config entries into [`Action`]s with typed edges.
//! - [`graph`] validates keys and references and holds the [`ActionGraph`].
//! - [`cycle`] provides DFS cycle detection that reports the whole loop.

pub mod action;
pub mod cycle;
pub mod graph;

pub use action::{Action, ActionDependency, DependencyKind};
pub use cycle::find_cycle;
pub use graph::ActionGraph;
