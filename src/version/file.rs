// src/version/file.rs

//! `.trellis-version` files: a snapshot of an action's version written next
//! to its sources, for tooling that wants versions without a full run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::version::resolver::ActionVersion;

pub const VERSION_FILE: &str = ".trellis-version";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct VersionFile {
    version: String,
    source_hash: String,
    config_hash: String,
    #[serde(default)]
    dependency_versions: BTreeMap<String, String>,
}

pub fn version_file_path(base: &Path) -> PathBuf {
    base.join(VERSION_FILE)
}

pub fn write_version_file(fs: &dyn FileSystem, base: &Path, version: &ActionVersion) -> Result<()> {
    let file = VersionFile {
        version: version.version.clone(),
        source_hash: version.source_hash.clone(),
        config_hash: version.config_hash.clone(),
        dependency_versions: version.dependency_versions.clone(),
    };
    let contents = toml::to_string(&file)?;
    let path = version_file_path(base);
    fs.write(&path, contents.as_bytes())?;
    debug!(path = ?path, version = %version.version, "wrote version file");
    Ok(())
}

/// Read a version file; `None` when there is none.
pub fn read_version_file(fs: &dyn FileSystem, base: &Path) -> Result<Option<ActionVersion>> {
    let path = version_file_path(base);
    if !fs.is_file(&path) {
        return Ok(None);
    }
    let contents = fs.read_to_string(&path)?;
    let file: VersionFile = toml::from_str(&contents)?;
    Ok(Some(ActionVersion {
        version: file.version,
        source_hash: file.source_hash,
        config_hash: file.config_hash,
        dependency_versions: file.dependency_versions,
    }))
}
