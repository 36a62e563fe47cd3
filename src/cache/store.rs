// src/cache/store.rs

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::fs::FileSystem;
use crate::tasks::{TaskKey, TaskResult};
use crate::types::ActionKey;
use crate::version::STATE_DIR;

pub const RESULTS_FILE: &str = "results.json";

/// A stored result together with the version it was produced for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub version: String,
    pub result: TaskResult,
}

/// Abstract storage for task results.
pub trait ResultStore: Send + Sync {
    fn load(&self, key: &TaskKey) -> Result<Option<CachedResult>>;
    fn save(&mut self, key: &TaskKey, entry: &CachedResult) -> Result<()>;
    fn remove(&mut self, key: &TaskKey) -> Result<()>;
    /// Drop every result whose action fails `keep`. Returns how many went.
    fn retain_actions(&mut self, keep: &dyn Fn(&ActionKey) -> bool) -> Result<usize>;
}

/// Stores results in memory only.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    map: HashMap<TaskKey, CachedResult>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryResultStore {
    fn load(&self, key: &TaskKey) -> Result<Option<CachedResult>> {
        Ok(self.map.get(key).cloned())
    }

    fn save(&mut self, key: &TaskKey, entry: &CachedResult) -> Result<()> {
        self.map.insert(key.clone(), entry.clone());
        Ok(())
    }

    fn remove(&mut self, key: &TaskKey) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    fn retain_actions(&mut self, keep: &dyn Fn(&ActionKey) -> bool) -> Result<usize> {
        let before = self.map.len();
        self.map.retain(|k, _| keep(&k.action));
        Ok(before - self.map.len())
    }
}

/// Stores results as JSON in `<root>/.trellis/results.json`.
#[derive(Debug)]
pub struct FileResultStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileResultStore {
    pub fn new(root: PathBuf, fs: Arc<dyn FileSystem>) -> Self {
        Self { root, fs }
    }

    pub fn path(&self) -> PathBuf {
        results_file_path(&self.root)
    }

    fn load_all(&self) -> Result<BTreeMap<TaskKey, CachedResult>> {
        let path = self.path();
        if !self.fs.exists(&path) {
            return Ok(BTreeMap::new());
        }
        let text = self.fs.read_to_string(&path)?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&text).with_context(|| format!("parsing result cache at {:?}", path))
    }

    fn save_all(&self, map: &BTreeMap<TaskKey, CachedResult>) -> Result<()> {
        let path = self.path();
        let text = serde_json::to_string_pretty(map)?;
        self.fs
            .write(&path, text.as_bytes())
            .with_context(|| format!("writing result cache at {:?}", path))
    }
}

impl ResultStore for FileResultStore {
    fn load(&self, key: &TaskKey) -> Result<Option<CachedResult>> {
        Ok(self.load_all()?.remove(key))
    }

    fn save(&mut self, key: &TaskKey, entry: &CachedResult) -> Result<()> {
        let mut map = self.load_all()?;
        map.insert(key.clone(), entry.clone());
        self.save_all(&map)?;
        info!(task = %key, version = %entry.version, "stored task result (file)");
        Ok(())
    }

    fn remove(&mut self, key: &TaskKey) -> Result<()> {
        let mut map = self.load_all()?;
        if map.remove(key).is_some() {
            self.save_all(&map)?;
        }
        Ok(())
    }

    fn retain_actions(&mut self, keep: &dyn Fn(&ActionKey) -> bool) -> Result<usize> {
        let mut map = self.load_all()?;
        let before = map.len();
        map.retain(|k, _| keep(&k.action));
        let removed = before - map.len();
        if removed > 0 {
            self.save_all(&map)?;
            info!(removed, path = %self.path().display(), "dropped results of removed actions");
        }
        Ok(removed)
    }
}

pub fn results_file_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(RESULTS_FILE)
}
