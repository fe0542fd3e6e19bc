// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced recursive watcher over the project root. Change events are
//! broadcast to every connected client as `filetree:changed`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vibepilot_protocol::messages::ChangeKind;
use vibepilot_protocol::AgentEvent;

use super::is_ignored;

/// Quiet period before a path's pending change is flushed.
const DEBOUNCE: Duration = Duration::from_millis(200);

/// Start watching `root`, broadcasting debounced change events until the
/// returned token is cancelled (used on project switch and shutdown).
pub fn spawn_watcher(
    root: PathBuf,
    events: broadcast::Sender<AgentEvent>,
) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = match build_watcher(raw_tx) {
            Ok(w) => w,
            Err(e) => {
                warn!(err = %e, "file watcher failed to start");
                return;
            }
        };
        if let Err(e) = watcher.watch(&root, RecursiveMode::Recursive) {
            warn!(root = %root.display(), err = %e, "file watcher failed to watch root");
            return;
        }
        debug!(root = %root.display(), "file watcher started");
        debounce_loop(&root, raw_rx, events, cancel).await;
        // Dropping the watcher here stops the notify backend.
    });

    token
}

fn build_watcher(
    raw_tx: mpsc::UnboundedSender<Event>,
) -> notify::Result<RecommendedWatcher> {
    notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            let _ = raw_tx.send(event);
        }
    })
}

/// Collapse bursts of raw notify events into one change per path.
async fn debounce_loop(
    root: &Path,
    mut raw_rx: mpsc::UnboundedReceiver<Event>,
    events: broadcast::Sender<AgentEvent>,
    cancel: CancellationToken,
) {
    let mut pending: HashMap<String, ChangeKind> = HashMap::new();
    let mut flush = tokio::time::interval(DEBOUNCE);
    flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = raw_rx.recv() => {
                let Some(event) = event else { break };
                for (path, kind) in classify(root, &event) {
                    // Later kinds win: a create followed by a write is
                    // still reported as an add.
                    pending.entry(path).or_insert(kind);
                }
            }
            _ = flush.tick() => {
                for (path, kind) in pending.drain() {
                    let _ = events.send(AgentEvent::FiletreeChanged { kind, path });
                }
            }
        }
    }
}

/// Map a notify event to wire change kinds, one per affected path.
fn classify(root: &Path, event: &Event) -> Vec<(String, ChangeKind)> {
    let kind = match event.kind {
        EventKind::Create(notify::event::CreateKind::Folder) => Some(ChangeKind::AddDir),
        // Creates of unknown flavor and rename halves are resolved
        // per-path below: present on disk means add, absent means unlink.
        EventKind::Create(_) | EventKind::Modify(notify::event::ModifyKind::Name(_)) => None,
        EventKind::Modify(notify::event::ModifyKind::Data(_))
        | EventKind::Modify(notify::event::ModifyKind::Any) => Some(ChangeKind::Change),
        EventKind::Remove(notify::event::RemoveKind::Folder) => Some(ChangeKind::UnlinkDir),
        EventKind::Remove(_) => Some(ChangeKind::Unlink),
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter(|p| !is_ignored(p))
        .filter_map(|p| {
            let rel = p.strip_prefix(root).unwrap_or(p).to_string_lossy().into_owned();
            let kind = kind.or_else(|| {
                Some(if p.is_dir() {
                    ChangeKind::AddDir
                } else if p.exists() {
                    ChangeKind::Add
                } else {
                    ChangeKind::Unlink
                })
            })?;
            Some((rel, kind))
        })
        .collect()
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
