// src/version/resolver.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::dag::Action;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::version::cache::FileHashCache;
use crate::version::hash::{combine_version, hash_config, hash_tree};
use crate::version::tree::{TreeFilter, collect_tree_files};

/// A computed version together with the inputs it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionVersion {
    pub version: String,
    pub source_hash: String,
    pub config_hash: String,
    /// Dependency key -> dependency version, as folded into `version`.
    pub dependency_versions: BTreeMap<String, String>,
}

impl fmt::Display for ActionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)
    }
}

/// Computes deterministic versions from source trees, effective config and
/// dependency versions.
///
/// Dependency versions are passed in; the caller walks the graph in
/// dependency order.
pub struct VersionResolver {
    fs: Arc<dyn FileSystem>,
    file_hashes: FileHashCache,
}

impl fmt::Debug for VersionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionResolver")
            .field("fs", &self.fs)
            .field("cached_files", &self.file_hashes.len())
            .finish()
    }
}

impl VersionResolver {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            file_hashes: FileHashCache::new(),
        }
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// Hash of the action's source tree after include/exclude filtering.
    pub fn source_hash(&self, action: &Action) -> Result<String> {
        let filter = TreeFilter::for_action(action)?;
        let files = collect_tree_files(self.fs.as_ref(), &action.base_path, &filter)?;

        let mut entries = Vec::with_capacity(files.len());
        for (rel, path) in files {
            let hash = self.file_hashes.get_or_compute(self.fs.as_ref(), &path)?;
            entries.push((rel, hash));
        }
        Ok(hash_tree(&entries))
    }

    /// Version of `action` given its effective spec and the versions of its
    /// dependencies.
    pub fn resolve_version(
        &self,
        action: &Action,
        effective_spec: &Value,
        dependency_versions: &BTreeMap<String, String>,
    ) -> Result<ActionVersion> {
        let source_hash = self.source_hash(action)?;
        let config_hash = hash_config(&json!({
            "kind": action.kind().as_str(),
            "type": action.type_name,
            "name": action.name(),
            "spec": effective_spec,
        }));
        let version = combine_version(&source_hash, &config_hash, dependency_versions);

        debug!(
            action = %action.key,
            version = %version,
            dependencies = dependency_versions.len(),
            "resolved version"
        );

        Ok(ActionVersion {
            version,
            source_hash,
            config_hash,
            dependency_versions: dependency_versions.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::types::ActionKey;
    use std::path::PathBuf;

    fn action(base: &str) -> Action {
        Action {
            key: "build.web".parse::<ActionKey>().unwrap(),
            type_name: "exec".to_string(),
            base_path: PathBuf::from(base),
            include: None,
            exclude: Vec::new(),
            spec: json!({}),
            variables: Default::default(),
            dependencies: Vec::new(),
            disabled: false,
        }
    }

    #[test]
    fn empty_tree_still_gets_a_version() {
        let resolver = VersionResolver::new(Arc::new(MockFileSystem::new()));
        let v = resolver
            .resolve_version(&action("missing"), &json!({}), &BTreeMap::new())
            .unwrap();
        assert!(v.version.starts_with("v-"));
    }

    #[test]
    fn a_single_byte_changes_the_version() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("web/index.html", "<h1>hi</h1>");
        let resolver = VersionResolver::new(fs.clone());
        let a = action("web");

        let before = resolver.resolve_version(&a, &json!({}), &BTreeMap::new()).unwrap();
        let again = resolver.resolve_version(&a, &json!({}), &BTreeMap::new()).unwrap();
        assert_eq!(before, again);

        fs.add_file("web/index.html", "<h1>hi!</h1>");
        let after = resolver.resolve_version(&a, &json!({}), &BTreeMap::new()).unwrap();
        assert_ne!(before.version, after.version);
        assert_eq!(before.config_hash, after.config_hash);
    }

    #[test]
    fn config_changes_the_version() {
        let resolver = VersionResolver::new(Arc::new(MockFileSystem::new()));
        let a = action("web");
        let one = resolver
            .resolve_version(&a, &json!({ "replicas": 1 }), &BTreeMap::new())
            .unwrap();
        let two = resolver
            .resolve_version(&a, &json!({ "replicas": 2 }), &BTreeMap::new())
            .unwrap();
        assert_ne!(one.version, two.version);
        assert_eq!(one.source_hash, two.source_hash);
    }
}
