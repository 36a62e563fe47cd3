use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::config::model::{ActionConfig, ProjectConfig, RawProjectConfig, Variables};
use crate::errors::{Result, TrellisError};

/// Default name of the project configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "trellis.toml";

/// Shape of files listed in `[project].includes`.
#[derive(Debug, Deserialize)]
struct IncludedActions {
    #[serde(default, rename = "action")]
    actions: Vec<ActionConfig>,
}

/// Load a configuration file from a given path and return the raw config.
///
/// This performs TOML deserialization, pulls in `includes` and loads
/// varfiles; it does **not** perform semantic validation. Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawProjectConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let mut config: RawProjectConfig = toml::from_str(&contents)?;
    config.root = config_dir_of(path);

    for action in config.actions.iter_mut() {
        action.config_dir = config.root.clone();
    }

    let includes = config.project.includes.clone();
    for include in includes {
        let include_path = config.root.join(&include);
        let mut included = load_included(&include_path)?;
        debug!(
            file = %include_path.display(),
            actions = included.len(),
            "loaded included action file"
        );
        config.actions.append(&mut included);
    }

    for env in config.environments.values_mut() {
        env.varfile_variables = load_varfiles(&config.root, &env.varfiles)?;
    }

    for action in config.actions.iter_mut() {
        action.varfile_variables = load_varfiles(&action.config_dir, &action.varfiles)?;
    }

    Ok(config)
}

/// Load a configuration file from path and run syntactic validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML (including `includes` and varfiles).
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks names, kinds, dependency reference syntax and project settings.
///
/// The action graph builder performs the structural checks (duplicate keys,
/// missing dependencies, cycles).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ProjectConfig> {
    let raw_config = load_from_path(&path)?;
    let config = ProjectConfig::try_from(raw_config)?;
    Ok(config)
}

/// Helper to resolve a default config path: `trellis.toml` in the current
/// working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

fn load_included(path: &Path) -> Result<Vec<ActionConfig>> {
    let contents = fs::read_to_string(path).map_err(|e| {
        TrellisError::Configuration(format!(
            "cannot read included file {}: {e}",
            path.display()
        ))
    })?;
    let included: IncludedActions = toml::from_str(&contents)?;
    let dir = config_dir_of(path);

    Ok(included
        .actions
        .into_iter()
        .map(|mut action| {
            action.config_dir = dir.clone();
            action
        })
        .collect())
}

/// Read and merge a list of TOML varfiles. Later files override earlier ones
/// by top-level key.
pub fn load_varfiles(dir: &Path, varfiles: &[String]) -> Result<Variables> {
    let mut merged = Variables::new();

    for varfile in varfiles {
        let path = dir.join(varfile);
        let contents = fs::read_to_string(&path).map_err(|e| {
            TrellisError::Configuration(format!(
                "cannot read varfile {}: {e}",
                path.display()
            ))
        })?;
        let vars: Variables = toml::from_str(&contents)?;
        for (key, value) in vars {
            merged.insert(key, value);
        }
    }

    Ok(merged)
}

/// Directory of a config file; a bare filename maps to `.`.
fn config_dir_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
