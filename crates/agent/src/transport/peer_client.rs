// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection loop for a client that arrived via bus signaling and talks
//! only over the peer datagram channels — no reliable stream exists for
//! it, so reliable-class traffic rides the `file-transfer` channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use vibepilot_protocol::{AgentEvent, ClientRequest};

use crate::peer::{channel_for, PeerEvent, PeerTransport, FILE_TRANSFER};
use crate::state::AgentState;
use crate::transport::dispatch::Dispatcher;
use crate::transport::ws::browser_event_to_wire;

/// Attach a dispatcher to an established peer and serve it until the
/// peer goes away.
pub fn spawn_peer_client(state: Arc<AgentState>, peer: Arc<dyn PeerTransport>) {
    tokio::spawn(async move {
        let client_id = state.next_client_id();
        debug!(client = client_id, "peer client attached");

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<AgentEvent>();
        let (peer_tx, mut peer_rx) = mpsc::unbounded_channel::<PeerEvent>();
        let mut dispatcher =
            Dispatcher::new(Arc::clone(&state), client_id, outbound_tx, peer_tx);
        dispatcher.adopt_peer(Arc::clone(&peer));

        let mut fs_rx = state.fs_events.subscribe();
        let mut browser_rx = state.browser.subscribe();

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,

                event = outbound_rx.recv() => {
                    let Some(event) = event else { break };
                    send_via_peer(&peer, event).await;
                }

                event = fs_rx.recv() => {
                    let Ok(event) = event else { continue };
                    send_via_peer(&peer, event).await;
                }

                event = browser_rx.recv() => {
                    let Ok(event) = event else { continue };
                    if !state.owns_browser(client_id) {
                        continue;
                    }
                    let Some(event) = browser_event_to_wire(event) else { continue };
                    send_via_peer(&peer, event).await;
                }

                event = peer_rx.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        PeerEvent::Message { envelope, .. } => {
                            match ClientRequest::from_envelope(&envelope) {
                                Ok(Some(request)) => dispatcher.handle(request).await,
                                Ok(None) => warn!(kind = %envelope.kind, "unknown peer message type"),
                                Err(e) => warn!(err = %e, "bad peer payload"),
                            }
                        }
                        PeerEvent::Disconnected => break,
                        _ => {}
                    }
                }
            }
        }

        dispatcher.disconnect().await;
        debug!(client = client_id, "peer client detached");
    });
}

/// Outgoing routing without a reliable-stream fallback: class channel
/// first, `file-transfer` for everything else.
async fn send_via_peer(peer: &Arc<dyn PeerTransport>, event: AgentEvent) {
    let envelope = event.into_envelope();
    let label = channel_for(&envelope.kind).unwrap_or(FILE_TRANSFER);
    if let Err(code) = peer.send(label, &envelope).await {
        debug!(kind = %envelope.kind, %label, %code, "peer send dropped");
    }
}
