// src/version/mod.rs

//! Content-based action versions.
//!
//! - [`hash`]: blake3 helpers for files, trees, config and the final version.
//! - [`tree`]: include/exclude filtering of an action's source files.
//! - [`cache`]: stamp-keyed file hash cache.
//! - [`resolver`]: [`VersionResolver`], combining the above.
//! - [`file`]: `.trellis-version` files.

pub mod cache;
pub mod file;
pub mod hash;
pub mod resolver;
pub mod tree;

pub use cache::FileHashCache;
pub use file::{VERSION_FILE, read_version_file, write_version_file};
pub use resolver::{ActionVersion, VersionResolver};
pub use tree::{STATE_DIR, TreeFilter};
