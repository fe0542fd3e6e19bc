// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY manager: shell children keyed by session id, with switchable
//! output sinks and per-session input serialization.

pub mod spawn;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vibepilot_protocol::AgentEvent;

use crate::delegate::OutputDelegate;
use crate::error::ErrorCode;

use spawn::{read_cwd, NativePty};

/// Shells a client may request. Anything else is rejected; `None` falls
/// back to `$SHELL` and then `/bin/bash`.
const SHELL_WHITELIST: &[&str] = &["/bin/bash", "/bin/zsh", "/bin/sh"];

/// How often a live session's working directory is probed.
const CWD_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Options accepted by `terminal:create`.
#[derive(Debug, Default, Clone)]
pub struct CreateOpts {
    pub cols: Option<u16>,
    pub rows: Option<u16>,
    pub cwd: Option<String>,
    pub shell: Option<String>,
}

/// Exit notification delivered to the session supervisor.
#[derive(Debug, Clone)]
pub struct SessionExit {
    pub session_id: String,
    pub exit_code: i32,
}

/// One live shell child and its I/O endpoints.
#[derive(Debug)]
pub struct PtySession {
    pub session_id: String,
    pub pid: i32,
    pub delegate: Arc<OutputDelegate>,
    input_tx: mpsc::Sender<Bytes>,
    resize_tx: mpsc::Sender<(u16, u16)>,
    cancel: CancellationToken,
    last_cwd: Mutex<String>,
}

impl PtySession {
    /// Last working directory observed by the poller.
    pub fn last_cwd(&self) -> String {
        self.last_cwd.lock().clone()
    }
}

/// Owns every PTY child in the agent process.
pub struct PtyManager {
    sessions: RwLock<HashMap<String, Arc<PtySession>>>,
    replay_capacity: usize,
    exit_tx: mpsc::UnboundedSender<SessionExit>,
}

impl PtyManager {
    /// Build a manager; exits are reported on the returned receiver so the
    /// session supervisor can reconcile orphan state.
    pub fn new(replay_capacity: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionExit>) {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self { sessions: RwLock::new(HashMap::new()), replay_capacity, exit_tx }),
            exit_rx,
        )
    }

    /// Spawn a shell for `session_id`. Fails on duplicate ids and on
    /// shells outside the whitelist.
    pub fn create(
        self: &Arc<Self>,
        session_id: &str,
        opts: CreateOpts,
    ) -> Result<Arc<PtySession>, ErrorCode> {
        let shell = resolve_shell(opts.shell.as_deref())?;
        let cols = opts.cols.unwrap_or(80);
        let rows = opts.rows.unwrap_or(24);
        let cwd = opts.cwd.map(PathBuf::from);

        {
            let sessions = self.sessions.read();
            if sessions.contains_key(session_id) {
                return Err(ErrorCode::SessionExists);
            }
        }

        let pty = NativePty::spawn(&shell, cwd.as_deref(), cols, rows).map_err(|e| {
            warn!(session = session_id, err = %e, "pty spawn failed");
            ErrorCode::Internal
        })?;
        let pid = pty.child_pid();

        let delegate = Arc::new(OutputDelegate::new(session_id, self.replay_capacity));
        let (input_tx, input_rx) = mpsc::channel(256);
        let (resize_tx, resize_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let initial_cwd = cwd
            .map(|p| p.to_string_lossy().into_owned())
            .or_else(|| read_cwd(pid))
            .unwrap_or_default();

        let session = Arc::new(PtySession {
            session_id: session_id.to_owned(),
            pid,
            delegate: Arc::clone(&delegate),
            input_tx,
            resize_tx,
            cancel: cancel.clone(),
            last_cwd: Mutex::new(initial_cwd),
        });

        {
            // Re-check under the write lock: two clients racing on the
            // same id must not both win.
            let mut sessions = self.sessions.write();
            if sessions.contains_key(session_id) {
                drop(sessions);
                pty.kill();
                tokio::spawn(async move {
                    let _ = pty.wait_exit().await;
                });
                return Err(ErrorCode::SessionExists);
            }
            sessions.insert(session_id.to_owned(), Arc::clone(&session));
        }

        tokio::spawn(pump(
            pty,
            Arc::clone(&session),
            input_rx,
            resize_rx,
            cancel.clone(),
            self.exit_tx.clone(),
        ));
        tokio::spawn(poll_cwd(Arc::clone(&session), cancel));

        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<PtySession>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Write input bytes to a session's PTY.
    pub async fn write(&self, session_id: &str, data: &[u8]) -> Result<(), ErrorCode> {
        let session = self.get(session_id).ok_or(ErrorCode::SessionGone)?;
        session
            .input_tx
            .send(Bytes::copy_from_slice(data))
            .await
            .map_err(|_| ErrorCode::SessionGone)
    }

    /// Update a session's terminal dimensions.
    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> Result<(), ErrorCode> {
        let session = self.get(session_id).ok_or(ErrorCode::SessionGone)?;
        session.resize_tx.send((cols, rows)).await.map_err(|_| ErrorCode::SessionGone)
    }

    /// Terminate a session's child. The exit flows back through the pump,
    /// so the owner still observes `terminal:destroyed`.
    pub fn destroy(&self, session_id: &str) {
        if let Some(session) = self.get(session_id) {
            session.cancel.cancel();
        }
    }

    /// Swap the session's sink and drain replayed bytes for the caller.
    pub fn attach_output(
        &self,
        session_id: &str,
        sink: mpsc::UnboundedSender<AgentEvent>,
    ) -> Result<Vec<u8>, ErrorCode> {
        let session = self.get(session_id).ok_or(ErrorCode::SessionGone)?;
        Ok(session.delegate.attach(sink))
    }

    /// Current working directory of the child, falling back to the last
    /// observed value when procfs inspection fails.
    pub fn cwd(&self, session_id: &str) -> Option<String> {
        let session = self.get(session_id)?;
        match read_cwd(session.pid) {
            Some(cwd) => {
                *session.last_cwd.lock() = cwd.clone();
                Some(cwd)
            }
            None => Some(session.last_cwd()),
        }
    }

    /// Drop a session from the table (called by the supervisor after the
    /// pump reports exit).
    pub fn remove(&self, session_id: &str) -> Option<Arc<PtySession>> {
        self.sessions.write().remove(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Terminate every session (process shutdown).
    pub fn destroy_all(&self) {
        for session in self.sessions.read().values() {
            session.cancel.cancel();
        }
    }
}

/// Validate the requested shell against the whitelist.
fn resolve_shell(requested: Option<&str>) -> Result<String, ErrorCode> {
    match requested {
        Some(shell) => {
            if SHELL_WHITELIST.contains(&shell) {
                Ok(shell.to_owned())
            } else {
                Err(ErrorCode::ShellNotAllowed)
            }
        }
        None => Ok(std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_owned())),
    }
}

/// Per-session I/O pump: owns the PTY, serializes writes, and feeds output
/// through the delegate until the child exits or the session is destroyed.
async fn pump(
    pty: NativePty,
    session: Arc<PtySession>,
    mut input_rx: mpsc::Receiver<Bytes>,
    mut resize_rx: mpsc::Receiver<(u16, u16)>,
    cancel: CancellationToken,
    exit_tx: mpsc::UnboundedSender<SessionExit>,
) {
    let mut buf = vec![0u8; 8192];
    let mut killed = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled(), if !killed => {
                pty.kill();
                killed = true;
            }
            result = pty.read_chunk(&mut buf) => {
                match result {
                    Ok(0) => break,
                    Ok(n) => session.delegate.write(&buf[..n]),
                    Err(e) if NativePty::is_hangup(&e) => break,
                    Err(e) => {
                        warn!(session = %session.session_id, err = %e, "pty read failed");
                        break;
                    }
                }
            }
            input = input_rx.recv() => {
                match input {
                    Some(data) => {
                        if let Err(e) = pty.write_all(&data).await {
                            warn!(session = %session.session_id, err = %e, "pty write failed");
                        }
                    }
                    None => {
                        // All input handles dropped; keep pumping output.
                    }
                }
            }
            dims = resize_rx.recv() => {
                if let Some((cols, rows)) = dims {
                    if let Err(e) = pty.resize(cols, rows) {
                        warn!(session = %session.session_id, err = %e, "pty resize failed");
                    }
                }
            }
        }
    }

    let status = match pty.wait_exit().await {
        Ok(status) => status,
        Err(e) => {
            warn!(session = %session.session_id, err = %e, "reap failed");
            spawn::ExitStatus { code: None, signal: None }
        }
    };
    let exit_code = status.exit_code();
    debug!(session = %session.session_id, exit_code, "pty exited");

    // Delivered only when a client holds the session; orphaned exits are
    // reconciled silently by the supervisor.
    session.delegate.emit(AgentEvent::TerminalDestroyed {
        session_id: session.session_id.clone(),
        exit_code,
    });
    let _ = exit_tx.send(SessionExit { session_id: session.session_id.clone(), exit_code });
}

/// Poll the child's cwd while a live sink is attached; orphaned sessions
/// pause automatically because `emit` drops sinkless events.
async fn poll_cwd(session: Arc<PtySession>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(CWD_POLL_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        if !session.delegate.has_sink() {
            continue;
        }
        let Some(cwd) = read_cwd(session.pid) else { continue };
        let changed = {
            let mut last = session.last_cwd.lock();
            if *last == cwd {
                false
            } else {
                *last = cwd.clone();
                true
            }
        };
        if changed {
            session.delegate.emit(AgentEvent::TerminalCwd {
                session_id: session.session_id.clone(),
                cwd,
            });
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
