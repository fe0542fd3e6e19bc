// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use base64::Engine;

use super::*;

fn fixture() -> (tempfile::TempDir, Workspace) {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path().to_path_buf());
    (dir, workspace)
}

#[test]
fn reads_text_with_language_tag() {
    let (dir, workspace) = fixture();
    std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

    let file = read(&workspace, "main.rs").unwrap();
    assert_eq!(file.content, "fn main() {}");
    assert_eq!(file.language, "rust");
    assert_eq!(file.mime_type, "text/plain");
    assert!(!file.readonly);
    assert_eq!(file.size, 12);
}

#[test]
fn images_are_base64_and_readonly() {
    let (dir, workspace) = fixture();
    let bytes = [0x89u8, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];
    std::fs::write(dir.path().join("logo.png"), bytes).unwrap();

    let file = read(&workspace, "logo.png").unwrap();
    assert!(file.readonly);
    assert_eq!(file.mime_type, "image/png");
    assert_eq!(file.language, "binary");
    let decoded = base64::engine::general_purpose::STANDARD.decode(&file.content).unwrap();
    assert_eq!(decoded, bytes);
}

#[test]
fn non_utf8_falls_back_to_binary() {
    let (dir, workspace) = fixture();
    std::fs::write(dir.path().join("blob.dat"), [0xff, 0xfe, 0x00, 0x01]).unwrap();

    let file = read(&workspace, "blob.dat").unwrap();
    assert!(file.readonly);
    assert_eq!(file.mime_type, "application/octet-stream");
}

#[test]
fn write_round_trips_and_creates_parents() {
    let (dir, workspace) = fixture();
    let size = write(&workspace, "src/deep/new.ts", "export {}").unwrap();
    assert_eq!(size, 9);
    let on_disk = std::fs::read_to_string(dir.path().join("src/deep/new.ts")).unwrap();
    assert_eq!(on_disk, "export {}");
}

#[test]
fn write_to_image_is_readonly() {
    let (_dir, workspace) = fixture();
    assert_eq!(write(&workspace, "logo.png", "nope").unwrap_err(), ErrorCode::Readonly);
}

#[test]
fn read_missing_file_is_io_error() {
    let (_dir, workspace) = fixture();
    assert_eq!(read(&workspace, "nope.txt").unwrap_err(), ErrorCode::IoError);
}

#[test]
fn traversal_rejected_on_read_and_write() {
    let (_dir, workspace) = fixture();
    assert_eq!(read(&workspace, "../outside.txt").unwrap_err(), ErrorCode::PathTraversal);
    assert_eq!(
        write(&workspace, "../outside.txt", "x").unwrap_err(),
        ErrorCode::PathTraversal
    );
}
