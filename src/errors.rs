// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Structural errors (`Configuration`, `CircularDependency`) are fatal and
//! abort before or during graph expansion. `Template`, `Validation` and
//! `Handler` errors are caught per task and recorded as failed results.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrellisError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("Template error in {context}: {message}")]
    Template { context: String, message: String },

    #[error("Validation error in {context}: field '{field}' {message}")]
    Validation {
        context: String,
        field: String,
        message: String,
    },

    #[error("Handler error in {key}: {message}")]
    Handler { key: String, message: String },

    #[error("Task {key} failed: {message}")]
    TaskFailed { key: String, message: String },

    #[error("Action not found: {0}")]
    ActionNotFound(String),

    #[error("No handler registered for {kind} actions of type '{type_name}'")]
    HandlerNotFound { kind: String, type_name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrellisError {
    pub fn template(context: impl Into<String>, message: impl Into<String>) -> Self {
        TrellisError::Template {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn validation(
        context: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        TrellisError::Validation {
            context: context.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TrellisError>;
