// src/template/mod.rs

//! `${...}` template expressions.
//!
//! Resolution happens in passes (see [`Pass`]): non-action scopes first,
//! then action scopes once dependency results exist, and step scopes last,
//! while a workflow-style action executes.

pub mod context;
pub mod parse;
pub mod resolve;
pub mod scan;

pub use context::TemplateContext;
pub use parse::{ActionField, ActionReference, Expression, Scope, Segment, parse_template};
pub use resolve::{Pass, resolve_str, resolve_template};
pub use scan::{check_step_references, collect_expressions, scan_action_references, step_name};
