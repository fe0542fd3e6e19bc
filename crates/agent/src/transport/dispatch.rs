// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-client dispatcher: routes decoded requests to the services and
//! owns this client's slice of agent state — its sessions, tunnels,
//! image transfers, peer connection, and browser-stream claim.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use vibepilot_protocol::messages::BrowserInputEvent;
use vibepilot_protocol::{AgentEvent, ClientRequest};

use crate::browser::StartOpts;
use crate::error::ErrorCode;
use crate::fs::{content, tree};
use crate::image::ImageReceiver;
use crate::peer::{PeerEvent, PeerTransport};
use crate::pty::CreateOpts;
use crate::state::AgentState;
use crate::tunnel::{ForwardRequest, TunnelProxy};

pub struct Dispatcher {
    pub client_id: u64,
    state: Arc<AgentState>,
    outbound: mpsc::UnboundedSender<AgentEvent>,
    session_ids: HashSet<String>,
    tunnels: TunnelProxy,
    images: ImageReceiver,
    peer: Option<Arc<dyn PeerTransport>>,
    peer_events_tx: mpsc::UnboundedSender<PeerEvent>,
}

impl Dispatcher {
    pub fn new(
        state: Arc<AgentState>,
        client_id: u64,
        outbound: mpsc::UnboundedSender<AgentEvent>,
        peer_events_tx: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        let tunnels = TunnelProxy::new(outbound.clone());
        Self {
            client_id,
            state,
            outbound,
            session_ids: HashSet::new(),
            tunnels,
            images: ImageReceiver::new(),
            peer: None,
            peer_events_tx,
        }
    }

    pub fn peer(&self) -> Option<&Arc<dyn PeerTransport>> {
        self.peer.as_ref()
    }

    /// Adopt an externally-established peer (bus-signaled handoff).
    pub fn adopt_peer(&mut self, peer: Arc<dyn PeerTransport>) {
        self.spawn_peer_forwarder(&peer);
        self.peer = Some(peer);
    }

    fn send(&self, event: AgentEvent) {
        let _ = self.outbound.send(event);
    }

    /// Route one decoded request.
    pub async fn handle(&mut self, request: ClientRequest) {
        match request {
            // -- Terminals ----------------------------------------------------
            ClientRequest::TerminalCreate { session_id, cols, rows, cwd, shell } => {
                let opts = CreateOpts { cols, rows, cwd, shell };
                match self.state.pty.create(&session_id, opts) {
                    Ok(session) => {
                        self.claim_session(&session_id);
                        // The delegate buffers whatever the shell printed
                        // between spawn and this attach.
                        let early = self
                            .state
                            .pty
                            .attach_output(&session_id, self.outbound.clone())
                            .unwrap_or_default();
                        self.send(AgentEvent::TerminalCreated {
                            session_id: session_id.clone(),
                            pid: session.pid,
                        });
                        if !early.is_empty() {
                            self.send(AgentEvent::TerminalOutput {
                                session_id,
                                data: String::from_utf8_lossy(&early).into_owned(),
                            });
                        }
                    }
                    Err(code) => self.terminal_error(session_id, code),
                }
            }
            ClientRequest::TerminalAttach { session_id, cols, rows } => {
                match self.state.persistence.resume(&session_id, self.outbound.clone()) {
                    Ok((pid, buffered)) => {
                        self.claim_session(&session_id);
                        if let (Some(cols), Some(rows)) = (cols, rows) {
                            let _ = self.state.pty.resize(&session_id, cols, rows).await;
                        }
                        self.send(AgentEvent::TerminalAttached {
                            session_id,
                            pid,
                            buffered_output: String::from_utf8_lossy(&buffered).into_owned(),
                        });
                    }
                    Err(_) => {
                        // No orphan to resume: report the session dead.
                        self.send(AgentEvent::TerminalDestroyed { session_id, exit_code: -1 });
                    }
                }
            }
            ClientRequest::TerminalInput { session_id, data } => {
                if let Err(code) = self.state.pty.write(&session_id, data.as_bytes()).await {
                    self.terminal_error(session_id, code);
                }
            }
            ClientRequest::TerminalResize { session_id, cols, rows } => {
                let _ = self.state.pty.resize(&session_id, cols, rows).await;
            }
            ClientRequest::TerminalDestroy { session_id } => {
                self.release_session(&session_id);
                self.state.pty.destroy(&session_id);
            }

            // -- File tree / contents ----------------------------------------
            ClientRequest::FiletreeList { path, depth } => {
                match tree::list(&self.state.workspace, &path, depth.unwrap_or(1)) {
                    Ok(entries) => self.send(AgentEvent::FiletreeData { path, entries }),
                    Err(code) => self.send(AgentEvent::FiletreeError {
                        path,
                        code: code.as_str().to_owned(),
                        message: format!("listing failed: {code}"),
                    }),
                }
            }
            ClientRequest::FileRead { file_path } => {
                match content::read(&self.state.workspace, &file_path) {
                    Ok(file) => self.send(AgentEvent::FileData {
                        file_path,
                        content: file.content,
                        language: file.language,
                        mime_type: file.mime_type,
                        readonly: file.readonly,
                        size: file.size,
                    }),
                    Err(code) => self.file_error(file_path, code),
                }
            }
            ClientRequest::FileWrite { file_path, content, encoding } => {
                if let Some(ref encoding) = encoding {
                    if encoding != "utf-8" {
                        self.file_error(file_path, ErrorCode::BadRequest);
                        return;
                    }
                }
                match content::write(&self.state.workspace, &file_path, &content) {
                    Ok(size) => self.send(AgentEvent::FileWritten { file_path, size }),
                    Err(code) => self.file_error(file_path, code),
                }
            }

            // -- Image uploads -----------------------------------------------
            ClientRequest::ImageStart { transfer_id, session_id, filename, total_size } => {
                if let Err(code) =
                    self.images.start(&transfer_id, &session_id, &filename, total_size)
                {
                    self.image_error(transfer_id, code);
                }
            }
            ClientRequest::ImageChunk { transfer_id, chunk_index, data } => {
                if let Err(code) = self.images.chunk(&transfer_id, chunk_index, &data) {
                    self.image_error(transfer_id, code);
                }
            }
            ClientRequest::ImageComplete { transfer_id } => {
                match self.images.complete(&transfer_id) {
                    Ok((session_id, path)) => self.send(AgentEvent::ImageSaved {
                        transfer_id,
                        session_id,
                        file_path: path.to_string_lossy().into_owned(),
                    }),
                    Err(code) => self.image_error(transfer_id, code),
                }
            }

            // -- Projects -----------------------------------------------------
            ClientRequest::ProjectList {} => {
                let (projects, current_project_id) = self.state.projects.list();
                self.send(AgentEvent::ProjectListData { projects, current_project_id });
            }
            ClientRequest::ProjectAdd { name, path } => {
                match self.state.projects.add(&name, &path) {
                    Ok(project) => self.send(AgentEvent::ProjectAdded { project }),
                    Err(code) => self.project_error(code),
                }
            }
            ClientRequest::ProjectRemove { project_id } => {
                match self.state.projects.remove(&project_id) {
                    Ok(()) => self.send(AgentEvent::ProjectRemoved { project_id }),
                    Err(code) => self.project_error(code),
                }
            }
            ClientRequest::ProjectUpdate { project_id, updates } => {
                match self.state.projects.update(&project_id, &updates) {
                    Ok(project) => self.send(AgentEvent::ProjectUpdated { project }),
                    Err(code) => self.project_error(code),
                }
            }
            ClientRequest::ProjectSwitch { project_id } => {
                match self.state.projects.switch(&project_id) {
                    Ok(root) => {
                        // Re-root every path-based service.
                        self.state.workspace.set_root(root.clone());
                        self.state.reroot_watcher(root);
                        self.send(AgentEvent::ProjectSwitched { project_id });
                    }
                    Err(code) => self.project_error(code),
                }
            }

            // -- Tunnels ------------------------------------------------------
            ClientRequest::TunnelOpen { tunnel_id, target_port, target_host } => {
                match self.tunnels.open(&tunnel_id, target_port, target_host) {
                    Ok(()) => self.send(AgentEvent::TunnelOpened { tunnel_id }),
                    Err(code) => self.tunnel_error(tunnel_id, None, code),
                }
            }
            ClientRequest::TunnelClose { tunnel_id } => {
                match self.tunnels.close(&tunnel_id) {
                    Ok(()) => self.send(AgentEvent::TunnelClosed { tunnel_id }),
                    Err(code) => self.tunnel_error(tunnel_id, None, code),
                }
            }
            ClientRequest::TunnelRequest { tunnel_id, request_id, method, path, headers, body } => {
                let request = ForwardRequest {
                    tunnel_id: tunnel_id.clone(),
                    request_id: request_id.clone(),
                    method,
                    path,
                    headers,
                    body,
                };
                if let Err(code) = self.tunnels.forward(request) {
                    self.tunnel_error(tunnel_id, Some(request_id), code);
                }
            }

            // -- Browser ------------------------------------------------------
            ClientRequest::BrowserStart { project_id, url, width, height } => {
                // At most one client owns the stream; a second start is a
                // takeover / re-attach.
                if let Some(previous) = self.state.claim_browser(self.client_id) {
                    if previous != self.client_id {
                        debug!(previous, client = self.client_id, "browser stream takeover");
                    }
                }
                let opts = StartOpts { project_id, url, width, height };
                match self.state.browser.start(opts).await {
                    Ok(info) => self.send(AgentEvent::BrowserStarted { info }),
                    Err(error) => {
                        self.state.release_browser(self.client_id);
                        self.browser_error(error.code, error.message);
                    }
                }
            }
            ClientRequest::BrowserStop {} => {
                self.state.browser.stop().await;
                self.state.release_browser(self.client_id);
                self.send(AgentEvent::BrowserStopped {});
            }
            ClientRequest::BrowserNavigate { url } => {
                match self.state.browser.navigate(url).await {
                    Ok(url) => self.send(AgentEvent::BrowserNavigated { url }),
                    Err(error) => self.browser_error(error.code, error.message),
                }
            }
            ClientRequest::BrowserInput { event } => {
                self.forward_browser_input(event).await;
            }
            ClientRequest::BrowserResize { width, height } => {
                if let Err(error) = self.state.browser.resize(width, height).await {
                    self.browser_error(error.code, error.message);
                }
            }
            ClientRequest::BrowserFrameAck { timestamp } => {
                self.state.browser.ack_frame(timestamp).await;
            }

            // -- In-band signaling -------------------------------------------
            ClientRequest::ConnectionRequest { agent_id } => {
                // Over the reliable stream the rendezvous is trivial: the
                // client is already talking to us.
                self.send(AgentEvent::ConnectionReady { agent_id });
            }
            ClientRequest::SignalOffer { sdp } => {
                self.handle_offer(sdp).await;
            }
            ClientRequest::SignalCandidate { candidate, sdp_mid, .. } => {
                match self.peer {
                    Some(ref peer) => {
                        if let Err(e) = peer.add_ice_candidate(candidate, sdp_mid).await {
                            warn!(client = self.client_id, err = %e, "candidate rejected");
                        }
                    }
                    None => warn!(client = self.client_id, "candidate before offer ignored"),
                }
            }
        }
    }

    async fn handle_offer(&mut self, sdp: String) {
        if let Some(old) = self.peer.take() {
            old.close().await;
        }
        let peer = match self.state.peer_factory.create().await {
            Ok(peer) => peer,
            Err(e) => {
                warn!(client = self.client_id, err = %e, "peer creation failed");
                return;
            }
        };
        match peer.handle_offer(sdp).await {
            Ok(answer) => {
                self.spawn_peer_forwarder(&peer);
                self.peer = Some(peer);
                self.send(AgentEvent::SignalAnswer { sdp: answer });
            }
            Err(e) => {
                warn!(client = self.client_id, err = %e, "offer handling failed");
                peer.close().await;
            }
        }
    }

    /// Bridge a peer's event stream into this connection's select loop.
    fn spawn_peer_forwarder(&self, peer: &Arc<dyn PeerTransport>) {
        let mut events = peer.subscribe();
        let tx = self.peer_events_tx.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
    }

    async fn forward_browser_input(&self, event: BrowserInputEvent) {
        if self.state.owns_browser(self.client_id) {
            self.state.browser.input(event).await;
        }
    }

    fn claim_session(&mut self, session_id: &str) {
        self.session_ids.insert(session_id.to_owned());
        self.state.session_owners.lock().insert(session_id.to_owned(), self.client_id);
    }

    fn release_session(&mut self, session_id: &str) {
        self.session_ids.remove(session_id);
        let mut owners = self.state.session_owners.lock();
        if owners.get(session_id) == Some(&self.client_id) {
            owners.remove(session_id);
        }
    }

    /// The disconnect sweep: orphan-or-forget sessions, reject in-flight
    /// tunnel work, drop transfers, close the peer, release the browser.
    pub async fn disconnect(&mut self) {
        if self.state.release_browser(self.client_id) {
            self.state.browser.detach_preview().await;
        }

        let owned: Vec<String> = self.session_ids.drain().collect();
        for session_id in owned {
            {
                let mut owners = self.state.session_owners.lock();
                if owners.get(&session_id) != Some(&self.client_id) {
                    // Another client claimed it since (attach takeover).
                    continue;
                }
                owners.remove(&session_id);
            }
            if self.state.pty.get(&session_id).is_some() {
                self.state.persistence.orphan(&session_id);
            }
        }

        self.tunnels.close_all();
        self.images.clear();

        if let Some(peer) = self.peer.take() {
            peer.close().await;
        }
        debug!(client = self.client_id, "client disconnected");
    }

    // -- Error helpers --------------------------------------------------------

    fn terminal_error(&self, session_id: String, code: ErrorCode) {
        self.send(AgentEvent::TerminalError {
            session_id,
            code: code.as_str().to_owned(),
            message: format!("terminal operation failed: {code}"),
        });
    }

    fn file_error(&self, file_path: String, code: ErrorCode) {
        self.send(AgentEvent::FileError {
            file_path,
            code: code.as_str().to_owned(),
            message: format!("file operation failed: {code}"),
        });
    }

    fn image_error(&self, transfer_id: String, code: ErrorCode) {
        self.send(AgentEvent::ImageError {
            transfer_id,
            code: code.as_str().to_owned(),
            message: format!("image transfer failed: {code}"),
        });
    }

    fn project_error(&self, code: ErrorCode) {
        self.send(AgentEvent::ProjectError {
            code: code.as_str().to_owned(),
            message: format!("project operation failed: {code}"),
        });
    }

    fn tunnel_error(&self, tunnel_id: String, request_id: Option<String>, code: ErrorCode) {
        self.send(AgentEvent::TunnelError {
            tunnel_id,
            request_id,
            code: code.as_str().to_owned(),
            message: format!("tunnel operation failed: {code}"),
        });
    }

    fn browser_error(&self, code: ErrorCode, message: String) {
        self.send(AgentEvent::BrowserError { code: code.as_str().to_owned(), message });
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
