// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chunked image uploads reassembled into restrictive-permission temp
//! files, so a shell session can reference a pasted screenshot by path.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use base64::Engine;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::ErrorCode;

/// Uploads larger than this are refused outright.
const MAX_TRANSFER_BYTES: u64 = 32 * 1024 * 1024;

struct Transfer {
    session_id: String,
    filename: String,
    total_size: u64,
    chunks: HashMap<u32, Vec<u8>>,
    received: u64,
}

/// In-flight chunked transfers, keyed by transfer id. One receiver per
/// client; dropped wholesale on disconnect.
#[derive(Default)]
pub struct ImageReceiver {
    transfers: Mutex<HashMap<String, Transfer>>,
}

impl ImageReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a transfer. Restarting an id discards the previous partial.
    pub fn start(
        &self,
        transfer_id: &str,
        session_id: &str,
        filename: &str,
        total_size: u64,
    ) -> Result<(), ErrorCode> {
        if total_size > MAX_TRANSFER_BYTES {
            return Err(ErrorCode::PayloadTooLarge);
        }
        self.transfers.lock().insert(
            transfer_id.to_owned(),
            Transfer {
                session_id: session_id.to_owned(),
                filename: filename.to_owned(),
                total_size,
                chunks: HashMap::new(),
                received: 0,
            },
        );
        Ok(())
    }

    /// Add a base64 chunk; chunks may arrive out of order.
    pub fn chunk(&self, transfer_id: &str, index: u32, data: &str) -> Result<(), ErrorCode> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|_| ErrorCode::BadRequest)?;
        let mut transfers = self.transfers.lock();
        let transfer = transfers.get_mut(transfer_id).ok_or(ErrorCode::BadRequest)?;
        transfer.received += bytes.len() as u64;
        if transfer.received > transfer.total_size.max(MAX_TRANSFER_BYTES) {
            transfers.remove(transfer_id);
            return Err(ErrorCode::PayloadTooLarge);
        }
        transfer.chunks.insert(index, bytes);
        Ok(())
    }

    /// Assemble the chunks into a fresh temp directory with a randomized
    /// name and `0o600` permissions. Returns `(session_id, file_path)`.
    pub fn complete(&self, transfer_id: &str) -> Result<(String, PathBuf), ErrorCode> {
        let transfer =
            self.transfers.lock().remove(transfer_id).ok_or(ErrorCode::BadRequest)?;

        let mut indexes: Vec<u32> = transfer.chunks.keys().copied().collect();
        indexes.sort_unstable();
        // Chunk indexes must be a gapless 0..n run.
        for (expected, got) in indexes.iter().enumerate() {
            if *got != expected as u32 {
                return Err(ErrorCode::BadRequest);
            }
        }

        let dir = tempfile::Builder::new()
            .prefix("vibepilot-img-")
            .tempdir()
            .map_err(|_| ErrorCode::IoError)?
            // Keep the directory; the shell session needs the path after
            // this call returns.
            .keep();

        let safe_name = sanitize_filename(&transfer.filename);
        let path = dir.join(safe_name);
        let mut file = open_private(&path).map_err(|_| ErrorCode::IoError)?;
        for index in indexes {
            if let Some(bytes) = transfer.chunks.get(&index) {
                file.write_all(bytes).map_err(|_| ErrorCode::IoError)?;
            }
        }
        file.flush().map_err(|_| ErrorCode::IoError)?;

        debug!(transfer = transfer_id, path = %path.display(), "image saved");
        Ok((transfer.session_id, path))
    }

    /// Drop all partial transfers (client disconnect).
    pub fn clear(&self) {
        self.transfers.lock().clear();
    }
}

/// Strip any path components; an uploaded filename is a basename only.
fn sanitize_filename(name: &str) -> String {
    let base = std::path::Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    if base.is_empty() || base.starts_with('.') {
        format!("upload-{base}")
    } else {
        base.to_owned()
    }
}

#[cfg(unix)]
fn open_private(path: &std::path::Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new().write(true).create_new(true).mode(0o600).open(path)
}

#[cfg(not(unix))]
fn open_private(path: &std::path::Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
