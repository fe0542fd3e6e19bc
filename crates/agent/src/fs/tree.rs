// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use vibepilot_protocol::messages::{EntryKind, TreeEntry};

use crate::error::ErrorCode;

use super::{is_ignored, Workspace};

/// Depth past which a `filetree:list` request is clamped.
const MAX_DEPTH: usize = 8;

/// List a directory under the workspace root to the requested depth.
///
/// `path` is workspace-relative; traversal out of the root is rejected
/// before any filesystem access. Entries are directories-first, each
/// group sorted by name.
pub fn list(workspace: &Workspace, path: &str, depth: usize) -> Result<Vec<TreeEntry>, ErrorCode> {
    let resolved = workspace.resolve(path)?;
    if !resolved.is_dir() {
        return Err(ErrorCode::IoError);
    }
    let root = workspace.root();
    let depth = depth.clamp(1, MAX_DEPTH);
    read_dir(&root, &resolved, depth)
}

fn read_dir(root: &Path, dir: &Path, depth: usize) -> Result<Vec<TreeEntry>, ErrorCode> {
    let mut entries = Vec::new();
    let iter = std::fs::read_dir(dir).map_err(|_| ErrorCode::IoError)?;
    for entry in iter.flatten() {
        let path = entry.path();
        if is_ignored(&path) {
            continue;
        }
        let Ok(file_type) = entry.file_type() else { continue };
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = path
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string_lossy().into_owned());

        if file_type.is_dir() {
            let children = if depth > 1 {
                Some(read_dir(root, &path, depth - 1).unwrap_or_default())
            } else {
                None
            };
            entries.push(TreeEntry { name, path: rel, kind: EntryKind::Directory, children });
        } else if file_type.is_file() {
            entries.push(TreeEntry { name, path: rel, kind: EntryKind::File, children: None });
        }
        // Symlinks and specials are skipped.
    }

    entries.sort_by(|a, b| match (a.kind, b.kind) {
        (EntryKind::Directory, EntryKind::File) => std::cmp::Ordering::Less,
        (EntryKind::File, EntryKind::Directory) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });
    Ok(entries)
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
