// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem services: depth-limited tree listing, file content
//! read/write, and the debounced change watcher. All three operate
//! relative to the current workspace root, which a project switch
//! re-points.

pub mod content;
pub mod tree;
pub mod watch;

use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::ErrorCode;

/// Directory names never listed and never reported by the watcher.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    "target",
    ".next",
    ".venv",
    "__pycache__",
    ".DS_Store",
];

/// The current project root shared by the file services.
pub struct Workspace {
    root: RwLock<PathBuf>,
}

impl Workspace {
    pub fn new(root: PathBuf) -> Self {
        Self { root: RwLock::new(root) }
    }

    pub fn root(&self) -> PathBuf {
        self.root.read().clone()
    }

    /// Re-root the services (project switch).
    pub fn set_root(&self, root: PathBuf) {
        *self.root.write() = root;
    }

    /// Resolve a client-supplied path against the root, rejecting any
    /// path that escapes it.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ErrorCode> {
        let root = self.root();
        resolve_under(&root, path)
    }
}

/// Join `path` onto `root` and require the canonical result to stay under
/// the canonical root.
pub fn resolve_under(root: &Path, path: &str) -> Result<PathBuf, ErrorCode> {
    let canonical_root = root.canonicalize().map_err(|e| { eprintln!("DEBUG root canon {:?}: {:?}", root, e); ErrorCode::IoError })?;
    let joined = if path.is_empty() || path == "." {
        canonical_root.clone()
    } else {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            canonical_root.join(candidate)
        }
    };

    // Canonicalize the deepest existing ancestor so traversal through
    // not-yet-created files is still caught.
    let (existing, remainder) = deepest_existing(&joined);
    let canonical = existing.canonicalize().map_err(|_| ErrorCode::IoError)?;
    if !canonical.starts_with(&canonical_root) {
        return Err(ErrorCode::PathTraversal);
    }
    Ok(canonical.join(remainder))
}

/// Split a path into its deepest existing ancestor and the trailing
/// non-existent remainder.
fn deepest_existing(path: &Path) -> (PathBuf, PathBuf) {
    let mut existing = path.to_path_buf();
    let mut remainder = PathBuf::new();
    while !existing.exists() {
        let Some(file_name) = existing.file_name().map(|n| n.to_owned()) else {
            return (PathBuf::from("/"), remainder);
        };
        let parent = existing.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/"));
        remainder = Path::new(&file_name).join(&remainder);
        existing = parent;
    }
    (existing, remainder)
}

/// Whether any component of the path is on the ignore list.
pub fn is_ignored(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|name| IGNORED_DIRS.contains(&name))
            .unwrap_or(false)
    })
}
