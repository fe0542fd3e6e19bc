// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session persistence: orphaned-but-alive PTYs, their TTL timers, and
//! resume across client reconnects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use vibepilot_protocol::AgentEvent;

use crate::error::ErrorCode;
use crate::pty::{PtyManager, SessionExit};

/// A session whose owning client disconnected while the shell lives on.
pub struct OrphanRecord {
    pub last_cwd: String,
    pub deadline: Instant,
    ttl_cancel: CancellationToken,
}

/// Tracks orphans and enforces the per-session TTL.
pub struct SessionPersistence {
    pty: Arc<PtyManager>,
    orphans: Mutex<HashMap<String, OrphanRecord>>,
    ttl: Duration,
}

impl SessionPersistence {
    pub fn new(pty: Arc<PtyManager>, ttl: Duration) -> Arc<Self> {
        Arc::new(Self { pty, orphans: Mutex::new(HashMap::new()), ttl })
    }

    /// Consume PTY exits until shutdown, reconciling the tables.
    pub async fn run(
        self: Arc<Self>,
        mut exit_rx: mpsc::UnboundedReceiver<SessionExit>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                exit = exit_rx.recv() => {
                    match exit {
                        Some(exit) => self.handle_exit(&exit),
                        None => break,
                    }
                }
            }
        }
    }

    /// Orphan a still-running session: detach its sink (output now flows
    /// into the replay buffer), remember the cwd, and arm the TTL timer.
    pub fn orphan(self: &Arc<Self>, session_id: &str) {
        let Some(session) = self.pty.get(session_id) else { return };
        session.delegate.detach();

        let cancel = CancellationToken::new();
        let record = OrphanRecord {
            last_cwd: session.last_cwd(),
            deadline: Instant::now() + self.ttl,
            ttl_cancel: cancel.clone(),
        };

        // A re-orphan (client reconnected and dropped again) replaces the
        // record and restarts the clock.
        if let Some(old) = self.orphans.lock().insert(session_id.to_owned(), record) {
            old.ttl_cancel.cancel();
        }
        info!(session = session_id, ttl_secs = self.ttl.as_secs(), "session orphaned");

        let this = Arc::clone(self);
        let session_id = session_id.to_owned();
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(ttl) => {
                    info!(session = %session_id, "orphan ttl expired");
                    this.orphans.lock().remove(&session_id);
                    this.pty.destroy(&session_id);
                }
            }
        });
    }

    /// Reclaim an orphan: swap in the new client's sink and hand back the
    /// pid plus whatever output accumulated while disconnected.
    pub fn resume(
        &self,
        session_id: &str,
        sink: mpsc::UnboundedSender<AgentEvent>,
    ) -> Result<(i32, Vec<u8>), ErrorCode> {
        let record = self
            .orphans
            .lock()
            .remove(session_id)
            .ok_or(ErrorCode::SessionNotFoundForAttach)?;
        record.ttl_cancel.cancel();

        let session = self.pty.get(session_id).ok_or(ErrorCode::SessionNotFoundForAttach)?;
        let buffered = session.delegate.attach(sink);
        debug!(
            session = session_id,
            buffered = buffered.len(),
            last_cwd = %record.last_cwd,
            "session resumed"
        );
        Ok((session.pid, buffered))
    }

    pub fn is_orphaned(&self, session_id: &str) -> bool {
        self.orphans.lock().contains_key(session_id)
    }

    /// A PTY exited: cancel any TTL timer and drop the tables. An orphan
    /// exiting has no owner to notify, so removal is silent.
    fn handle_exit(&self, exit: &SessionExit) {
        if let Some(record) = self.orphans.lock().remove(&exit.session_id) {
            record.ttl_cancel.cancel();
        }
        self.pty.remove(&exit.session_id);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
