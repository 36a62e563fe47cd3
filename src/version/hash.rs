// src/version/hash.rs

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use blake3::Hasher;
use serde_json::Value;
use tracing::debug;

use crate::fs::FileSystem;

/// Number of hex characters of the combined hash kept in a version string.
pub const VERSION_HASH_LEN: usize = 12;

/// Hash everything a reader yields, in 8 KiB chunks.
pub fn hash_reader(mut reader: impl Read) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Compute the hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let reader = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    hash_reader(reader).with_context(|| format!("hashing file {:?}", path))
}

/// Hash a file tree given as `(relative path, file hash)` pairs.
///
/// Pairs are sorted by path first, so the result does not depend on the
/// order the directory walk produced them in.
pub fn hash_tree(entries: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = entries.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Hasher::new();
    for (path, hash) in sorted {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    let hash = hasher.finalize().to_hex().to_string();
    debug!(files = entries.len(), hash = %hash, "computed tree hash");
    hash
}

/// Hash of the canonical JSON form of a config value.
///
/// `serde_json` objects keep their keys sorted, so two values that only
/// differ in key insertion order serialize identically.
pub fn hash_config(value: &Value) -> String {
    let canonical = value.to_string();
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

/// Combine the source hash, config hash and dependency versions into a
/// version string (`v-<12 hex chars>`).
pub fn combine_version(
    source_hash: &str,
    config_hash: &str,
    dependency_versions: &BTreeMap<String, String>,
) -> String {
    let mut hasher = Hasher::new();
    hasher.update(format!("source:{source_hash}\nconfig:{config_hash}\n").as_bytes());
    for (key, version) in dependency_versions {
        hasher.update(format!("dep:{key}={version}\n").as_bytes());
    }
    let hex = hasher.finalize().to_hex();
    format!("v-{}", &hex.as_str()[..VERSION_HASH_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tree_hash_ignores_entry_order() {
        let a = vec![
            ("b.txt".to_string(), "2".to_string()),
            ("a.txt".to_string(), "1".to_string()),
        ];
        let b = vec![
            ("a.txt".to_string(), "1".to_string()),
            ("b.txt".to_string(), "2".to_string()),
        ];
        assert_eq!(hash_tree(&a), hash_tree(&b));
    }

    #[test]
    fn tree_hash_covers_paths_not_just_contents() {
        let a = vec![("a.txt".to_string(), "1".to_string())];
        let b = vec![("renamed.txt".to_string(), "1".to_string())];
        assert_ne!(hash_tree(&a), hash_tree(&b));
    }

    #[test]
    fn config_hash_is_independent_of_key_order() {
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": {"b": 2, "a": 1}}"#).unwrap();
        let b = json!({ "y": { "a": 1, "b": 2 }, "x": 1 });
        assert_eq!(hash_config(&a), hash_config(&b));
    }

    #[test]
    fn version_has_prefix_and_fixed_length() {
        let v = combine_version("s", "c", &BTreeMap::new());
        assert!(v.starts_with("v-"));
        assert_eq!(v.len(), 2 + VERSION_HASH_LEN);
    }

    #[test]
    fn dependency_versions_change_the_version() {
        let mut deps = BTreeMap::new();
        deps.insert("build.base".to_string(), "v-1".to_string());
        let before = combine_version("s", "c", &deps);
        deps.insert("build.base".to_string(), "v-2".to_string());
        assert_ne!(before, combine_version("s", "c", &deps));
    }
}
