// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer-to-peer datagram transport: a thin wrapper over a WebRTC peer
//! connection exposing the three named data channels and a typed event
//! stream. The browser client is always the offerer; the agent answers
//! and accepts whatever channels the offer declares.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use vibepilot_protocol::Envelope;

use crate::error::ErrorCode;

pub const STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Latency-first channel: ordered, non-retransmitting.
pub const TERMINAL_IO: &str = "terminal-io";
/// Ordered, reliable.
pub const FILE_TRANSFER: &str = "file-transfer";
/// Ordered, reliable.
pub const BROWSER_STREAM: &str = "browser-stream";

const OFFER_TIMEOUT: Duration = Duration::from_secs(10);

/// Above this many queued bytes, terminal-io sends are dropped rather
/// than delayed: stale interactive output is worthless.
const TERMINAL_HIGH_WATER: usize = 1024 * 1024;

/// Pick the datagram channel for an outgoing message type, or `None` for
/// the reliable stream fallback.
pub fn channel_for(kind: &str) -> Option<&'static str> {
    if kind == "terminal:output" || kind == "terminal:input" {
        return Some(TERMINAL_IO);
    }
    if kind.starts_with("image:") || kind.starts_with("file:") {
        return Some(FILE_TRANSFER);
    }
    if kind.starts_with("browser:") {
        return Some(BROWSER_STREAM);
    }
    None
}

/// Events surfaced by a peer connection.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    Connected,
    Disconnected,
    ChannelOpen { label: String },
    ChannelClose { label: String },
    Candidate { candidate: String, sdp_mid: Option<String> },
    Message { label: String, envelope: Envelope },
}

/// Transport-side surface of a peer connection; mockable for signaling
/// tests.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Apply the remote offer and produce the local answer SDP.
    async fn handle_offer(&self, sdp: String) -> anyhow::Result<String>;
    async fn add_ice_candidate(
        &self,
        candidate: String,
        sdp_mid: Option<String>,
    ) -> anyhow::Result<()>;
    /// Send an envelope on a named channel.
    async fn send(&self, label: &str, envelope: &Envelope) -> Result<(), ErrorCode>;
    fn subscribe(&self) -> broadcast::Receiver<PeerEvent>;
    fn is_connected(&self) -> bool;
    async fn close(&self);
}

/// Builds peer connections; swapped for a stub in tests.
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(&self) -> anyhow::Result<Arc<dyn PeerTransport>>;
}

// -- WebRTC implementation ----------------------------------------------------

pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    channels: Arc<Mutex<HashMap<String, Arc<RTCDataChannel>>>>,
    events: broadcast::Sender<PeerEvent>,
    connected: Arc<AtomicBool>,
}

impl WebRtcPeer {
    pub async fn new() -> anyhow::Result<Arc<Self>> {
        let api = APIBuilder::new().build();
        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec![STUN_SERVER.to_owned()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(config).await?);

        let (events, _) = broadcast::channel(256);
        let channels = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(false));

        let peer = Arc::new(Self {
            pc: Arc::clone(&pc),
            channels: Arc::clone(&channels),
            events: events.clone(),
            connected: Arc::clone(&connected),
        });

        {
            let events = events.clone();
            let connected = Arc::clone(&connected);
            pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let events = events.clone();
                let connected = Arc::clone(&connected);
                Box::pin(async move {
                    debug!(?state, "peer connection state");
                    match state {
                        RTCPeerConnectionState::Connected => {
                            connected.store(true, Ordering::Release);
                            let _ = events.send(PeerEvent::Connected);
                        }
                        RTCPeerConnectionState::Disconnected
                        | RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Closed => {
                            if connected.swap(false, Ordering::AcqRel) {
                                let _ = events.send(PeerEvent::Disconnected);
                            }
                        }
                        _ => {}
                    }
                })
            }));
        }

        {
            let events = events.clone();
            pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let events = events.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else { return };
                    match candidate.to_json() {
                        Ok(init) => {
                            let _ = events.send(PeerEvent::Candidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                            });
                        }
                        Err(e) => warn!(err = %e, "candidate serialization failed"),
                    }
                })
            }));
        }

        {
            let events = events.clone();
            let channels = Arc::clone(&channels);
            pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                let events = events.clone();
                let channels = Arc::clone(&channels);
                Box::pin(async move {
                    register_channel(dc, channels, events);
                })
            }));
        }

        Ok(peer)
    }
}

/// Wire a freshly-announced data channel into the event stream.
fn register_channel(
    dc: Arc<RTCDataChannel>,
    channels: Arc<Mutex<HashMap<String, Arc<RTCDataChannel>>>>,
    events: broadcast::Sender<PeerEvent>,
) {
    let label = dc.label().to_owned();
    channels.lock().insert(label.clone(), Arc::clone(&dc));

    {
        let events = events.clone();
        let label = label.clone();
        dc.on_open(Box::new(move || {
            let _ = events.send(PeerEvent::ChannelOpen { label: label.clone() });
            Box::pin(async {})
        }));
    }
    {
        let events = events.clone();
        let label = label.clone();
        let channels = Arc::clone(&channels);
        dc.on_close(Box::new(move || {
            channels.lock().remove(&label);
            let _ = events.send(PeerEvent::ChannelClose { label: label.clone() });
            Box::pin(async {})
        }));
    }
    {
        let label = label.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let text = String::from_utf8_lossy(&msg.data);
            match Envelope::decode(&text) {
                Ok(envelope) => {
                    let _ = events.send(PeerEvent::Message { label: label.clone(), envelope });
                }
                Err(e) => {
                    warn!(label = %label, err = %e, "dropping malformed datachannel record");
                }
            }
            Box::pin(async {})
        }));
    }
}

#[async_trait]
impl PeerTransport for WebRtcPeer {
    async fn handle_offer(&self, sdp: String) -> anyhow::Result<String> {
        let answer = tokio::time::timeout(OFFER_TIMEOUT, async {
            let offer = RTCSessionDescription::offer(sdp)?;
            self.pc.set_remote_description(offer).await?;
            let answer = self.pc.create_answer(None).await?;
            self.pc.set_local_description(answer.clone()).await?;
            anyhow::Ok(answer.sdp)
        })
        .await
        .map_err(|_| anyhow::anyhow!("offer handling timed out"))??;
        Ok(answer)
    }

    async fn add_ice_candidate(
        &self,
        candidate: String,
        sdp_mid: Option<String>,
    ) -> anyhow::Result<()> {
        let init = RTCIceCandidateInit { candidate, sdp_mid, ..Default::default() };
        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn send(&self, label: &str, envelope: &Envelope) -> Result<(), ErrorCode> {
        let dc = self
            .channels
            .lock()
            .get(label)
            .cloned()
            .ok_or(ErrorCode::ChannelNotFound)?;
        if dc.ready_state() != RTCDataChannelState::Open {
            return Err(ErrorCode::ChannelNotOpen);
        }
        if label == TERMINAL_IO && dc.buffered_amount().await > TERMINAL_HIGH_WATER {
            // Interactive TTY traffic: drop rather than queue stale bytes.
            return Ok(());
        }
        dc.send_text(envelope.encode()).await.map_err(|_| ErrorCode::ChannelNotOpen)?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            debug!(err = %e, "peer close");
        }
    }
}

/// Default factory producing real WebRTC peers.
pub struct WebRtcPeerFactory;

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(&self) -> anyhow::Result<Arc<dyn PeerTransport>> {
        let peer: Arc<dyn PeerTransport> = WebRtcPeer::new().await?;
        Ok(peer)
    }
}

#[cfg(test)]
#[path = "peer_tests.rs"]
mod tests;
