// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use vibepilot_protocol::AgentEvent;

use crate::auth::AuthProvider;
use crate::browser::BrowserHandle;
use crate::config::Config;
use crate::fs::Workspace;
use crate::peer::PeerFactory;
use crate::project::ProjectStore;
use crate::pty::PtyManager;
use crate::session::SessionPersistence;

/// Process-wide shared state handed to every connection.
///
/// Organized by concern the way the services own it: the PTY tables and
/// persistence, the workspace-rooted file services, the singleton browser
/// handle, and the per-process broadcast fan-outs.
pub struct AgentState {
    pub config: Config,
    pub shutdown: CancellationToken,

    pub pty: Arc<PtyManager>,
    pub persistence: Arc<SessionPersistence>,
    /// `sessionId -> client id`; authoritative for output routing.
    pub session_owners: Mutex<HashMap<String, u64>>,

    pub workspace: Arc<Workspace>,
    pub projects: Arc<ProjectStore>,
    /// `filetree:changed` fan-out to every connected client.
    pub fs_events: broadcast::Sender<AgentEvent>,
    /// Cancels the currently-running watcher (project switch restarts it).
    pub watcher_cancel: Mutex<Option<CancellationToken>>,

    pub browser: BrowserHandle,
    /// Client currently owning the browser stream, if any.
    pub browser_owner: Mutex<Option<u64>>,

    pub auth: Option<Arc<dyn AuthProvider>>,
    pub peer_factory: Arc<dyn PeerFactory>,

    next_client_id: AtomicU64,
}

impl AgentState {
    pub fn new(
        config: Config,
        shutdown: CancellationToken,
        pty: Arc<PtyManager>,
        persistence: Arc<SessionPersistence>,
        workspace: Arc<Workspace>,
        projects: Arc<ProjectStore>,
        browser: BrowserHandle,
        auth: Option<Arc<dyn AuthProvider>>,
        peer_factory: Arc<dyn PeerFactory>,
    ) -> Arc<Self> {
        let (fs_events, _) = broadcast::channel(256);
        Arc::new(Self {
            config,
            shutdown,
            pty,
            persistence,
            session_owners: Mutex::new(HashMap::new()),
            workspace,
            projects,
            fs_events,
            watcher_cancel: Mutex::new(None),
            browser,
            browser_owner: Mutex::new(None),
            auth,
            peer_factory,
            next_client_id: AtomicU64::new(1),
        })
    }

    pub fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Restart the file watcher on a new root.
    pub fn reroot_watcher(&self, root: PathBuf) {
        let mut guard = self.watcher_cancel.lock();
        if let Some(old) = guard.take() {
            old.cancel();
        }
        *guard = Some(crate::fs::watch::spawn_watcher(root, self.fs_events.clone()));
    }

    /// Claim the browser stream for `client_id`. Returns the previous
    /// owner when this is a takeover.
    pub fn claim_browser(&self, client_id: u64) -> Option<u64> {
        self.browser_owner.lock().replace(client_id)
    }

    pub fn owns_browser(&self, client_id: u64) -> bool {
        *self.browser_owner.lock() == Some(client_id)
    }

    /// Release the browser stream if `client_id` holds it.
    pub fn release_browser(&self, client_id: u64) -> bool {
        let mut owner = self.browser_owner.lock();
        if *owner == Some(client_id) {
            *owner = None;
            true
        } else {
            false
        }
    }
}
