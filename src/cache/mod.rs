// src/cache/mod.rs

//! Task results keyed by task key and action version.
//!
//! A lookup only hits when the stored version equals the current one and
//! the stored result did not fail. Failed results are kept for inspection
//! but always re-run.

pub mod store;

use std::sync::{Arc, RwLock};

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::fs::FileSystem;
use crate::tasks::{TaskKey, TaskResult};
use crate::types::{ActionKey, CacheStorageMode};

pub use store::{CachedResult, FileResultStore, MemoryResultStore, ResultStore, results_file_path};

/// Shared front for a [`ResultStore`]; all access goes through one lock.
pub struct ResultCache {
    store: RwLock<Box<dyn ResultStore>>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache").finish_non_exhaustive()
    }
}

impl ResultCache {
    pub fn new(store: Box<dyn ResultStore>) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryResultStore::new()))
    }

    pub fn for_mode(mode: CacheStorageMode, root: &std::path::Path, fs: Arc<dyn FileSystem>) -> Self {
        match mode {
            CacheStorageMode::Memory => Self::in_memory(),
            CacheStorageMode::File => Self::new(Box::new(FileResultStore::new(root.to_path_buf(), fs))),
        }
    }

    /// A usable result for `key` at exactly `version`.
    pub fn get(&self, key: &TaskKey, version: &str) -> Result<Option<TaskResult>> {
        let Some(entry) = self.get_any(key)? else {
            return Ok(None);
        };
        if entry.version != version {
            debug!(task = %key, cached = %entry.version, current = %version, "cached result is stale");
            return Ok(None);
        }
        if entry.result.is_failed() || entry.result.aborted {
            return Ok(None);
        }
        Ok(Some(entry.result))
    }

    /// Whatever is stored for `key`, regardless of version or state.
    pub fn get_any(&self, key: &TaskKey) -> Result<Option<CachedResult>> {
        let store = self
            .store
            .read()
            .map_err(|_| anyhow!("result cache lock poisoned"))?;
        store.load(key)
    }

    pub fn set(&self, result: &TaskResult) -> Result<()> {
        let Some(version) = result.version.clone() else {
            return Ok(());
        };
        let entry = CachedResult {
            version,
            result: result.clone(),
        };
        let mut store = self
            .store
            .write()
            .map_err(|_| anyhow!("result cache lock poisoned"))?;
        store.save(&result.key, &entry)
    }

    pub fn invalidate(&self, key: &TaskKey) -> Result<()> {
        let mut store = self
            .store
            .write()
            .map_err(|_| anyhow!("result cache lock poisoned"))?;
        store.remove(key)
    }

    /// Forget results of actions for which `keep` is false, e.g. actions
    /// deleted from the project since the results were stored.
    pub fn retain_actions(&self, keep: impl Fn(&ActionKey) -> bool) -> Result<usize> {
        let mut store = self
            .store
            .write()
            .map_err(|_| anyhow!("result cache lock poisoned"))?;
        store.retain_actions(&keep)
    }
}
