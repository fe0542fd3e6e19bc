// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-side signaling coordinator: listens for connection requests on
//! the owner's presence channel, runs the offer/answer/candidate exchange
//! on an ephemeral per-session channel, and hands established peers to
//! the transport layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{Bus, BusMessage, BusSubscription};
use crate::peer::{PeerEvent, PeerFactory, PeerTransport};

/// Subscribing the per-session signaling channel must finish within this.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);
/// The signaling channel is ephemeral: torn down this long after the
/// connection request, connected or not.
const CLEANUP_AFTER: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestPayload {
    agent_id: String,
}

#[derive(Debug, Deserialize)]
struct OfferPayload {
    sdp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidatePayload {
    candidate: String,
    #[serde(default)]
    sdp_mid: Option<String>,
    /// The signaling channel is a broadcast topic, so each side tags its
    /// candidates and skips its own echoes.
    #[serde(default)]
    role: Option<String>,
}

/// An established peer delivered to the transport layer, which attaches a
/// dispatcher to it.
pub struct PeerHandoff {
    pub peer: Arc<dyn PeerTransport>,
}

/// Listens on `user:{ownerId}:agents` and drives per-session signaling.
pub struct SignalingCoordinator {
    bus: Arc<dyn Bus>,
    factory: Arc<dyn PeerFactory>,
    agent_id: String,
    owner_id: String,
    handoff_tx: mpsc::UnboundedSender<PeerHandoff>,
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl SignalingCoordinator {
    pub fn new(
        bus: Arc<dyn Bus>,
        factory: Arc<dyn PeerFactory>,
        agent_id: impl Into<String>,
        owner_id: impl Into<String>,
        handoff_tx: mpsc::UnboundedSender<PeerHandoff>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            factory,
            agent_id: agent_id.into(),
            owner_id: owner_id.into(),
            handoff_tx,
            active: Mutex::new(HashMap::new()),
        })
    }

    fn presence_channel(&self) -> String {
        format!("user:{}:agents", self.owner_id)
    }

    fn signaling_channel(agent_id: &str) -> String {
        format!("agent:{agent_id}:signaling")
    }

    /// Listen for connection requests until shutdown.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let presence = self.presence_channel();
        let mut sub = match self.bus.subscribe(&presence).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(channel = %presence, err = %e, "presence subscribe failed");
                return;
            }
        };
        info!(channel = %presence, agent = %self.agent_id, "signaling coordinator listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = sub.recv() => {
                    let Some(msg) = msg else { break };
                    if msg.event != "connection-request" {
                        continue;
                    }
                    let Ok(request) = serde_json::from_value::<RequestPayload>(msg.payload) else {
                        warn!("dropping malformed connection-request");
                        continue;
                    };
                    if request.agent_id != self.agent_id {
                        debug!(target_agent = %request.agent_id, "request not for this agent");
                        continue;
                    }
                    self.handle_request(&shutdown).await;
                }
            }
        }
    }

    /// Start (or restart) the signaling session for this agent.
    async fn handle_request(self: &Arc<Self>, shutdown: &CancellationToken) {
        // A duplicate request tears down the previous signaling channel
        // before anything else.
        let cancel = shutdown.child_token();
        if let Some(old) = self
            .active
            .lock()
            .insert(self.agent_id.clone(), cancel.clone())
        {
            old.cancel();
        }

        let channel = Self::signaling_channel(&self.agent_id);
        // The offer listener must be registered before connection-ready
        // goes out, or a fast client can offer into the void.
        let sub = match tokio::time::timeout(SUBSCRIBE_TIMEOUT, self.bus.subscribe(&channel)).await
        {
            Ok(Ok(sub)) => sub,
            Ok(Err(e)) => {
                warn!(channel = %channel, err = %e, "signaling subscribe failed");
                return;
            }
            Err(_) => {
                warn!(channel = %channel, "signaling subscribe timed out");
                return;
            }
        };

        if let Err(e) = self
            .bus
            .publish(
                &self.presence_channel(),
                "connection-ready",
                serde_json::json!({ "agentId": self.agent_id }),
            )
            .await
        {
            warn!(err = %e, "connection-ready publish failed");
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.session(sub, cancel).await;
        });
    }

    /// Drive one offer/answer/candidate exchange to completion.
    async fn session(self: Arc<Self>, mut sub: BusSubscription, cancel: CancellationToken) {
        let channel = Self::signaling_channel(&self.agent_id);
        let cleanup = tokio::time::sleep(CLEANUP_AFTER);
        tokio::pin!(cleanup);

        let mut peer: Option<Arc<dyn PeerTransport>> = None;
        let mut peer_events: Option<tokio::sync::broadcast::Receiver<PeerEvent>> = None;
        // Candidates arriving before the offer are held back.
        let mut early_candidates: Vec<CandidatePayload> = Vec::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = &mut cleanup => {
                    debug!(channel = %channel, "signaling cleanup deadline");
                    break;
                }
                msg = sub.recv() => {
                    let Some(msg) = msg else { break };
                    if self.handle_signal(msg, &channel, &mut peer, &mut peer_events, &mut early_candidates).await {
                        break;
                    }
                }
                event = recv_peer_event(&mut peer_events) => {
                    match event {
                        Some(PeerEvent::Candidate { candidate, sdp_mid }) => {
                            let payload = serde_json::json!({
                                "candidate": candidate,
                                "sdpMid": sdp_mid,
                                "role": "agent",
                            });
                            if let Err(e) = self.bus.publish(&channel, "candidate", payload).await {
                                warn!(err = %e, "candidate publish failed");
                            }
                        }
                        Some(PeerEvent::Connected) => {
                            info!(agent = %self.agent_id, "peer connected");
                        }
                        Some(PeerEvent::Disconnected) | None => break,
                        Some(_) => {}
                    }
                }
            }
        }

        // The subscription drops here, unsubscribing the ephemeral
        // channel. An unconnected peer is abandoned with it.
        if let Some(peer) = peer {
            if !peer.is_connected() {
                peer.close().await;
            }
        }
        // A replacement session owns a fresh (uncancelled) token; only an
        // entry belonging to this session is removed.
        let mut active = self.active.lock();
        if active.get(&self.agent_id).map(|t| t.is_cancelled()).unwrap_or(false) {
            active.remove(&self.agent_id);
        }
    }

    /// Process one signaling broadcast. Returns `true` when the session
    /// should end.
    async fn handle_signal(
        &self,
        msg: BusMessage,
        channel: &str,
        peer: &mut Option<Arc<dyn PeerTransport>>,
        peer_events: &mut Option<tokio::sync::broadcast::Receiver<PeerEvent>>,
        early_candidates: &mut Vec<CandidatePayload>,
    ) -> bool {
        match msg.event.as_str() {
            "offer" => {
                let Ok(offer) = serde_json::from_value::<OfferPayload>(msg.payload) else {
                    warn!("dropping malformed offer");
                    return false;
                };
                let created = match self.factory.create().await {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(err = %e, "peer creation failed");
                        return true;
                    }
                };
                let answer = match created.handle_offer(offer.sdp).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        warn!(err = %e, "offer handling failed");
                        created.close().await;
                        return true;
                    }
                };
                *peer_events = Some(created.subscribe());
                for pending in early_candidates.drain(..) {
                    if let Err(e) =
                        created.add_ice_candidate(pending.candidate, pending.sdp_mid).await
                    {
                        warn!(err = %e, "buffered candidate rejected");
                    }
                }
                if let Err(e) = self
                    .bus
                    .publish(channel, "answer", serde_json::json!({ "sdp": answer }))
                    .await
                {
                    warn!(err = %e, "answer publish failed");
                    created.close().await;
                    return true;
                }
                let _ = self.handoff_tx.send(PeerHandoff { peer: Arc::clone(&created) });
                *peer = Some(created);
                false
            }
            "candidate" => {
                let Ok(parsed) = serde_json::from_value::<CandidatePayload>(msg.payload) else {
                    warn!("dropping malformed candidate");
                    return false;
                };
                if parsed.role.as_deref() == Some("agent") {
                    return false;
                }
                match peer {
                    Some(peer) => {
                        if let Err(e) =
                            peer.add_ice_candidate(parsed.candidate, parsed.sdp_mid).await
                        {
                            warn!(err = %e, "candidate rejected");
                        }
                    }
                    None => early_candidates.push(parsed),
                }
                false
            }
            // Our own broadcasts (answer, outgoing candidates echoed by
            // the bus) and anything unknown.
            _ => false,
        }
    }
}

/// Await a peer event, pending forever until a peer exists.
async fn recv_peer_event(
    events: &mut Option<tokio::sync::broadcast::Receiver<PeerEvent>>,
) -> Option<PeerEvent> {
    match events {
        Some(rx) => match rx.recv().await {
            Ok(event) => Some(event),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "signaling_tests.rs"]
mod tests;
