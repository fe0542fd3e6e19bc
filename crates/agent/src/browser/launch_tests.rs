// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn debug_port_stays_in_range() {
    for _ in 0..1000 {
        let port = random_debug_port();
        assert!((9222..59222).contains(&port), "port {port} out of range");
    }
}

#[test]
fn prepare_profile_clears_stale_locks() {
    let dir = tempfile::tempdir().unwrap();
    let profile = dir.path().join("profile");
    std::fs::create_dir_all(&profile).unwrap();
    std::fs::write(profile.join("SingletonLock"), "stale").unwrap();
    std::fs::write(profile.join("Preferences"), "{}").unwrap();

    prepare_profile(&profile).unwrap();
    assert!(!profile.join("SingletonLock").exists());
    // Real profile data survives.
    assert!(profile.join("Preferences").exists());
}

#[test]
fn prepare_profile_creates_missing_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let profile = dir.path().join("deep/nested/profile");
    prepare_profile(&profile).unwrap();
    assert!(profile.is_dir());
}

#[tokio::test]
async fn endpoint_scrape_matches_devtools_banner() {
    // Feed the scraper through a fake child whose stderr prints the
    // banner the way Chromium does.
    let mut child = tokio::process::Command::new("/bin/sh")
        .arg("-c")
        .arg("echo 'noise line' >&2; echo 'DevTools listening on ws://127.0.0.1:9333/devtools/browser/abc' >&2")
        .stderr(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    let stderr = child.stderr.take().unwrap();
    let endpoint = scrape_endpoint(stderr).await;
    assert_eq!(endpoint.as_deref(), Some("ws://127.0.0.1:9333/devtools/browser/abc"));
    let _ = child.wait().await;
}

#[tokio::test]
async fn endpoint_scrape_gives_up_on_eof() {
    let mut child = tokio::process::Command::new("/bin/sh")
        .arg("-c")
        .arg("echo 'no banner here' >&2")
        .stderr(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    let stderr = child.stderr.take().unwrap();
    assert!(scrape_endpoint(stderr).await.is_none());
    let _ = child.wait().await;
}
