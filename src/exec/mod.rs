// src/exec/mod.rs

//! Action type handlers.
//!
//! - [`handler`] defines the [`ActionTypeHandler`] trait the engine calls
//!   through, plus the [`ResolvedAction`] / [`HandlerOutput`] types.
//! - [`registry`] maps `(kind, type)` pairs to handlers.
//! - [`schema`] is the declarative spec/output schema handlers publish.
//! - [`exec_handler`] is the built-in `exec` type, running local commands
//!   with `tokio::process`.

pub mod exec_handler;
pub mod handler;
pub mod registry;
pub mod schema;

pub use exec_handler::{EXEC_TYPE, ExecHandler};
pub use handler::{ActionTypeHandler, HandlerFuture, HandlerOutput, ResolvedAction};
pub use registry::HandlerRegistry;
pub use schema::{ActionSchema, FieldSchema, FieldType};
