// src/version/tree.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::dag::Action;
use crate::fs::FileSystem;

/// Directory holding trellis state (result cache etc.); never part of a tree.
pub const STATE_DIR: &str = ".trellis";

/// Compiled include/exclude patterns for one action's source tree.
///
/// Patterns are matched against paths relative to the action's base path,
/// with forward slashes (`src/main.rs`).
#[derive(Clone)]
pub struct TreeFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl fmt::Debug for TreeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeFilter")
            .field("include", &self.include.as_ref().map(|s| s.len()))
            .field("exclude", &self.exclude.as_ref().map(|s| s.len()))
            .finish()
    }
}

impl TreeFilter {
    /// `include = None` selects every file.
    pub fn new(include: Option<&[String]>, exclude: &[String]) -> Result<Self> {
        let include = match include {
            Some(patterns) => Some(build_globset(patterns).context("building include globset")?),
            None => None,
        };
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };
        Ok(Self { include, exclude })
    }

    pub fn for_action(action: &Action) -> Result<Self> {
        Self::new(action.include.as_deref(), &action.exclude)
            .with_context(|| format!("compiling source patterns of {}", action.key))
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(rel_path) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Collect the files of a source tree as `(relative path, full path)` pairs,
/// sorted by relative path.
///
/// `.trellis/` directories and version files are always skipped, so writing
/// a version file never changes the version it records. A missing base path
/// yields an empty tree.
pub fn collect_tree_files(
    fs: &dyn FileSystem,
    base: &Path,
    filter: &TreeFilter,
) -> Result<Vec<(String, PathBuf)>> {
    let root = if base.as_os_str().is_empty() {
        Path::new(".")
    } else {
        base
    };

    if !fs.is_dir(root) {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if fs.is_dir(&path) {
                if name != STATE_DIR {
                    stack.push(path);
                }
            } else if fs.is_file(&path) {
                if name == super::file::VERSION_FILE {
                    continue;
                }
                if let Ok(rel) = path.strip_prefix(root) {
                    let rel_str = rel.to_string_lossy().replace('\\', "/");
                    if filter.matches(&rel_str) {
                        files.push((rel_str, path));
                    }
                }
            }
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn rels(files: &[(String, PathBuf)]) -> Vec<&str> {
        files.iter().map(|(r, _)| r.as_str()).collect()
    }

    #[test]
    fn applies_include_and_exclude() {
        let fs = MockFileSystem::new();
        fs.add_file("web/src/app.ts", "a");
        fs.add_file("web/src/app.test.ts", "t");
        fs.add_file("web/README.md", "r");

        let filter = TreeFilter::new(
            Some(&["src/**".to_string()]),
            &["**/*.test.ts".to_string()],
        )
        .unwrap();
        let files = collect_tree_files(&fs, Path::new("web"), &filter).unwrap();
        assert_eq!(rels(&files), vec!["src/app.ts"]);
    }

    #[test]
    fn skips_state_dir_and_version_file() {
        let fs = MockFileSystem::new();
        fs.add_file("api/main.go", "m");
        fs.add_file("api/.trellis-version", "version = 'v-1'");
        fs.add_file("api/.trellis/results.json", "{}");

        let filter = TreeFilter::new(None, &[]).unwrap();
        let files = collect_tree_files(&fs, Path::new("api"), &filter).unwrap();
        assert_eq!(rels(&files), vec!["main.go"]);
    }

    #[test]
    fn missing_base_path_is_an_empty_tree() {
        let fs = MockFileSystem::new();
        let filter = TreeFilter::new(None, &[]).unwrap();
        assert!(collect_tree_files(&fs, Path::new("nowhere"), &filter).unwrap().is_empty());
    }
}
