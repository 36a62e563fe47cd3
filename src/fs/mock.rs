// src/fs/mock.rs

//! In-memory filesystem used by version and tree-hash tests.

use super::{FileStamp, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { content: Vec<u8>, revision: u64 },
    Dir(Vec<String>), // List of child names
}

#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    revisions: Arc<AtomicU64>,
    reads: Arc<AtomicU64>,
    /// Report stamps without modification times.
    no_mtimes: bool,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        // Ensure root exists
        files.insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
            revisions: Arc::new(AtomicU64::new(0)),
            reads: Arc::new(AtomicU64::new(0)),
            no_mtimes: false,
        }
    }

    /// Behave like a filesystem that does not track modification times.
    pub fn without_mtimes(mut self) -> Self {
        self.no_mtimes = true;
        self
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let revision = self.revisions.fetch_add(1, Ordering::SeqCst) + 1;
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(
            path.clone(),
            MockEntry::File {
                content: content.into(),
                revision,
            },
        );

        // Parent directories are created implicitly.
        if let Some(parent) = path.parent() {
            let parent = normalize_parent(parent);
            Self::ensure_dir_entry(&mut files, parent);
            Self::link_child(&mut files, parent, &path);
        }
    }


    /// Number of times file contents were opened for reading.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        if files.contains_key(path) {
            return;
        }
        files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
        if let Some(parent) = path.parent() {
            let parent = normalize_parent(parent);
            if parent != path {
                Self::ensure_dir_entry(files, parent);
                Self::link_child(files, parent, path);
            }
        }
    }

    fn link_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
        if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
            if let Some(name) = child.file_name().and_then(|n| n.to_str()) {
                if !children.iter().any(|c| c == name) {
                    children.push(name.to_string());
                }
            }
        }
    }
}

fn normalize_parent(parent: &Path) -> &Path {
    if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        match files.get(path) {
            Some(MockEntry::File { content, .. }) => {
                self.reads.fetch_add(1, Ordering::SeqCst);
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        match files.get(path) {
            Some(MockEntry::File { content, .. }) => {
                self.reads.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(Cursor::new(content.clone())))
            }
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        matches!(files.get(path), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        matches!(files.get(path), Some(MockEntry::Dir(_)))
    }

    fn stamp(&self, path: &Path) -> Result<FileStamp> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        match files.get(path) {
            Some(MockEntry::File { content, revision }) => Ok(FileStamp {
                len: content.len() as u64,
                modified: (!self.no_mtimes).then_some(*revision as u128),
            }),
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        match files.get(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_files_create_parent_dirs() {
        let fs = MockFileSystem::new();
        fs.add_file("app/src/main.rs", "fn main() {}");

        assert!(fs.is_dir(Path::new("app")));
        assert!(fs.is_dir(Path::new("app/src")));
        assert!(fs.is_file(Path::new("app/src/main.rs")));
        assert_eq!(
            fs.read_dir(Path::new("app")).unwrap(),
            vec![PathBuf::from("app/src")]
        );
    }

    #[test]
    fn rewriting_a_file_changes_its_stamp() {
        let fs = MockFileSystem::new();
        fs.add_file("a.txt", "one");
        let before = fs.stamp(Path::new("a.txt")).unwrap();
        fs.add_file("a.txt", "two");
        let after = fs.stamp(Path::new("a.txt")).unwrap();
        assert_ne!(before, after);
    }
}
