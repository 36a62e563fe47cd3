// src/config/mod.rs

//! Configuration loading and validation for trellis.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a project file, its includes and varfiles from disk (`loader.rs`).
//! - Validate syntactic invariants like names and reference syntax (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_varfiles};
pub use model::{
    ActionConfig, CopyFromConfig, DependencyConfig, DetailedDependency, EnvironmentConfig,
    ProjectConfig, ProjectSection, ProviderConfig, RawProjectConfig, Variables,
};
pub use validate::validate_config;
