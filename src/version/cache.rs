// src/version/cache.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use tracing::trace;

use crate::fs::{FileStamp, FileSystem};
use crate::version::hash::compute_file_hash;

/// In-memory cache of file content hashes.
///
/// Entries are keyed by path and only reused while the file's size and
/// modification time are unchanged, so several actions sharing a tree (or
/// repeated runs in one engine) read each file once. Files without a
/// modification time are hashed on every call.
#[derive(Debug, Default)]
pub struct FileHashCache {
    hashes: Mutex<HashMap<PathBuf, (FileStamp, String)>>,
}

impl FileHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the hash for a file, computing and caching it if the stamp moved.
    pub fn get_or_compute(&self, fs: &dyn FileSystem, path: &Path) -> Result<String> {
        let stamp = fs.stamp(path)?;
        if stamp.modified.is_none() {
            return compute_file_hash(fs, path);
        }

        {
            let hashes = self.hashes.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((cached_stamp, hash)) = hashes.get(path) {
                if *cached_stamp == stamp {
                    return Ok(hash.clone());
                }
            }
        }

        trace!("cache miss: computing hash for {:?}", path);
        let hash = compute_file_hash(fs, path)?;
        let mut hashes = self.hashes.lock().unwrap_or_else(|e| e.into_inner());
        hashes.insert(path.to_path_buf(), (stamp, hash.clone()));
        Ok(hash)
    }

    pub fn invalidate(&self, path: &Path) {
        let mut hashes = self.hashes.lock().unwrap_or_else(|e| e.into_inner());
        hashes.remove(path);
    }

    pub fn len(&self) -> usize {
        self.hashes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
