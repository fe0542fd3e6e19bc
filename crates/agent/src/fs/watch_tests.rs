// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::sync::broadcast;

use super::*;

async fn collect_changes(
    rx: &mut broadcast::Receiver<AgentEvent>,
    window: Duration,
) -> Vec<(ChangeKind, String)> {
    let deadline = tokio::time::Instant::now() + window;
    let mut out = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return out;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(AgentEvent::FiletreeChanged { kind, path })) => out.push((kind, path)),
            Ok(Ok(_)) => {}
            Ok(Err(_)) | Err(_) => return out,
        }
    }
}

#[tokio::test]
async fn reports_add_and_change() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let (tx, mut rx) = broadcast::channel(64);
    let cancel = spawn_watcher(root.clone(), tx);
    tokio::time::sleep(Duration::from_millis(300)).await;

    std::fs::write(root.join("fresh.txt"), "one").unwrap();
    let changes = collect_changes(&mut rx, Duration::from_secs(3)).await;
    assert!(
        changes.iter().any(|(k, p)| p == "fresh.txt"
            && matches!(k, ChangeKind::Add | ChangeKind::Change)),
        "changes: {changes:?}"
    );

    cancel.cancel();
}

#[tokio::test]
async fn ignored_directories_are_silent() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::create_dir_all(root.join("node_modules")).unwrap();
    let (tx, mut rx) = broadcast::channel(64);
    let cancel = spawn_watcher(root.clone(), tx);
    tokio::time::sleep(Duration::from_millis(300)).await;

    std::fs::write(root.join("node_modules/pkg.json"), "{}").unwrap();
    let changes = collect_changes(&mut rx, Duration::from_secs(2)).await;
    assert!(changes.iter().all(|(_, p)| !p.contains("node_modules")), "changes: {changes:?}");

    cancel.cancel();
}

#[test]
fn classify_maps_removals() {
    let root = std::path::Path::new("/w");
    let event = Event {
        kind: EventKind::Remove(notify::event::RemoveKind::File),
        paths: vec!["/w/gone.txt".into()],
        attrs: Default::default(),
    };
    assert_eq!(classify(root, &event), vec![("gone.txt".to_owned(), ChangeKind::Unlink)]);

    let event = Event {
        kind: EventKind::Remove(notify::event::RemoveKind::Folder),
        paths: vec!["/w/gone-dir".into()],
        attrs: Default::default(),
    };
    assert_eq!(classify(root, &event), vec![("gone-dir".to_owned(), ChangeKind::UnlinkDir)]);
}

#[test]
fn classify_skips_ignored_paths() {
    let root = std::path::Path::new("/w");
    let event = Event {
        kind: EventKind::Remove(notify::event::RemoveKind::File),
        paths: vec!["/w/.git/index".into()],
        attrs: Default::default(),
    };
    assert!(classify(root, &event).is_empty());
}
