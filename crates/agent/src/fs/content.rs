// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use base64::Engine;

use crate::error::ErrorCode;

use super::Workspace;

/// A read file plus the metadata the editor needs to render it.
#[derive(Debug, Clone, PartialEq)]
pub struct FileContent {
    pub content: String,
    pub language: String,
    pub mime_type: String,
    pub readonly: bool,
    pub size: u64,
}

/// Read a file under the workspace root.
///
/// Images and other binary files come back base64-encoded and readonly;
/// text comes back verbatim with a language tag derived from the
/// extension.
pub fn read(workspace: &Workspace, file_path: &str) -> Result<FileContent, ErrorCode> {
    let resolved = workspace.resolve(file_path)?;
    let bytes = std::fs::read(&resolved).map_err(|e| { eprintln!("DEBUG read {:?}: {:?}", resolved, e); ErrorCode::IoError })?;
    let size = bytes.len() as u64;
    let ext = extension(file_path);

    if let Some(mime) = image_mime(&ext) {
        return Ok(FileContent {
            content: base64::engine::general_purpose::STANDARD.encode(&bytes),
            language: "binary".to_owned(),
            mime_type: mime.to_owned(),
            readonly: true,
            size,
        });
    }

    match String::from_utf8(bytes) {
        Ok(text) => Ok(FileContent {
            content: text,
            language: language_for(&ext).to_owned(),
            mime_type: text_mime(&ext).to_owned(),
            readonly: false,
            size,
        }),
        Err(raw) => Ok(FileContent {
            content: base64::engine::general_purpose::STANDARD.encode(raw.as_bytes()),
            language: "binary".to_owned(),
            mime_type: "application/octet-stream".to_owned(),
            readonly: true,
            size,
        }),
    }
}

/// Write UTF-8 content to a file under the workspace root, creating
/// parent directories as needed. Image paths are refused.
pub fn write(workspace: &Workspace, file_path: &str, content: &str) -> Result<u64, ErrorCode> {
    let resolved = workspace.resolve(file_path)?;
    if image_mime(&extension(file_path)).is_some() {
        return Err(ErrorCode::Readonly);
    }
    if let Some(parent) = resolved.parent() {
        std::fs::create_dir_all(parent).map_err(|_| ErrorCode::IoError)?;
    }
    std::fs::write(&resolved, content).map_err(|_| ErrorCode::IoError)?;
    Ok(content.len() as u64)
}

fn extension(path: &str) -> String {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

fn image_mime(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "ico" => Some("image/x-icon"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

fn language_for(ext: &str) -> &'static str {
    match ext {
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" => "python",
        "go" => "go",
        "rb" => "ruby",
        "java" => "java",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" => "cpp",
        "cs" => "csharp",
        "sh" | "bash" => "shell",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "md" | "markdown" => "markdown",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" | "sass" => "scss",
        "sql" => "sql",
        "xml" => "xml",
        _ => "plaintext",
    }
}

fn text_mime(ext: &str) -> &'static str {
    match ext {
        "html" | "htm" => "text/html",
        "css" | "scss" | "sass" => "text/css",
        "json" => "application/json",
        "js" | "mjs" | "cjs" => "text/javascript",
        "xml" => "application/xml",
        "md" | "markdown" => "text/markdown",
        _ => "text/plain",
    }
}

#[cfg(test)]
#[path = "content_tests.rs"]
mod tests;
