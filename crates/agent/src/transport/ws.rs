// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket connection lifecycle: auth upgrade, the per-client select
//! loop, and outbound routing across the reliable stream and the peer
//! datagram channels.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use vibepilot_protocol::{AgentEvent, ClientRequest, Envelope, EnvelopeError};

use crate::browser::BrowserEvent;
use crate::error::ErrorCode;
use crate::peer::{channel_for, PeerEvent, PeerTransport};
use crate::state::AgentState;
use crate::transport::dispatch::Dispatcher;
use crate::transport::MAX_PAYLOAD_BYTES;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Upgrade handler. With an auth provider configured, the bearer token
/// rides the handshake query string; a denied verify is a 403 and a
/// provider failure is a 500, both before the socket upgrades.
pub async fn ws_handler(
    State(state): State<Arc<AgentState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Some(ref auth) = state.auth {
        let Some(ref token) = query.token else {
            return status_response(403, "missing token");
        };
        match auth.verify(token).await {
            Ok(verdict) if verdict.ok => {}
            Ok(_) => return status_response(403, "unauthorized"),
            Err(e) => {
                warn!(err = %e, "auth provider failure");
                return status_response(500, "auth unavailable");
            }
        }
    }

    ws.on_upgrade(move |socket| handle_connection(state, socket)).into_response()
}

fn status_response(status: u16, body: &'static str) -> axum::response::Response {
    axum::http::Response::builder()
        .status(status)
        .body(axum::body::Body::from(body))
        .unwrap_or_default()
        .into_response()
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<AgentState>, socket: WebSocket) {
    let client_id = state.next_client_id();
    debug!(client = client_id, "client connected");

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<AgentEvent>();
    let (peer_tx, mut peer_rx) = mpsc::unbounded_channel::<PeerEvent>();
    let mut dispatcher = Dispatcher::new(Arc::clone(&state), client_id, outbound_tx, peer_tx);

    let mut fs_rx = state.fs_events.subscribe();
    let mut browser_rx = state.browser.subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(_)) | None => break,
                };
                match msg {
                    Message::Text(text) => {
                        if handle_incoming(&mut dispatcher, &mut ws_tx, &text).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }

            event = outbound_rx.recv() => {
                let Some(event) = event else { break };
                if route_out(&mut ws_tx, dispatcher.peer(), event).await.is_err() {
                    break;
                }
            }

            event = fs_rx.recv() => {
                // Watcher events are broadcast to every client.
                let Ok(event) = event else { continue };
                if route_out(&mut ws_tx, dispatcher.peer(), event).await.is_err() {
                    break;
                }
            }

            event = browser_rx.recv() => {
                let Ok(event) = event else { continue };
                if !state.owns_browser(client_id) {
                    continue;
                }
                let Some(event) = browser_event_to_wire(event) else { continue };
                if route_out(&mut ws_tx, dispatcher.peer(), event).await.is_err() {
                    break;
                }
            }

            event = peer_rx.recv() => {
                let Some(event) = event else { continue };
                match event {
                    PeerEvent::Message { label, envelope } => {
                        debug!(client = client_id, %label, kind = %envelope.kind, "peer message");
                        match ClientRequest::from_envelope(&envelope) {
                            Ok(Some(request)) => dispatcher.handle(request).await,
                            Ok(None) => warn!(kind = %envelope.kind, "unknown peer message type"),
                            Err(e) => warn!(err = %e, "bad peer payload"),
                        }
                    }
                    PeerEvent::Candidate { candidate, sdp_mid } => {
                        let event = AgentEvent::SignalCandidate {
                            candidate,
                            sdp_mid,
                            sdp_m_line_index: None,
                        };
                        if route_out(&mut ws_tx, None, event).await.is_err() {
                            break;
                        }
                    }
                    PeerEvent::Disconnected => {
                        debug!(client = client_id, "peer transport lost");
                    }
                    PeerEvent::Connected
                    | PeerEvent::ChannelOpen { .. }
                    | PeerEvent::ChannelClose { .. } => {}
                }
            }
        }
    }

    dispatcher.disconnect().await;
    debug!(client = client_id, "connection closed");
}

/// Decode and dispatch one incoming text record, surfacing framing
/// problems as `error` envelopes rather than disconnects.
async fn handle_incoming(
    dispatcher: &mut Dispatcher,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    text: &str,
) -> Result<(), ()> {
    if text.len() > MAX_PAYLOAD_BYTES {
        return send_error(ws_tx, ErrorCode::PayloadTooLarge, "record exceeds 10 MiB").await;
    }
    let envelope = match Envelope::decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            return send_error(ws_tx, ErrorCode::MalformedEnvelope, &e.to_string()).await;
        }
    };
    match ClientRequest::from_envelope(&envelope) {
        Ok(Some(request)) => {
            dispatcher.handle(request).await;
            Ok(())
        }
        Ok(None) => {
            warn!(kind = %envelope.kind, "ignoring unknown message type");
            Ok(())
        }
        Err(EnvelopeError::BadPayload(detail)) => {
            send_error(ws_tx, ErrorCode::MalformedEnvelope, &detail).await
        }
        Err(EnvelopeError::Malformed(detail)) => {
            send_error(ws_tx, ErrorCode::MalformedEnvelope, &detail).await
        }
    }
}

async fn send_error(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: ErrorCode,
    message: &str,
) -> Result<(), ()> {
    let envelope = Envelope::new(
        "error",
        serde_json::json!({ "code": code.as_str(), "message": message }),
    );
    ws_tx.send(Message::Text(envelope.encode().into())).await.map_err(|_| ())
}

/// Route an outgoing event: the peer datagram channel its class prefers
/// when open, otherwise the reliable stream.
async fn route_out(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    peer: Option<&Arc<dyn PeerTransport>>,
    event: AgentEvent,
) -> Result<(), ()> {
    let envelope = event.into_envelope();
    if let Some(peer) = peer {
        if let Some(label) = channel_for(&envelope.kind) {
            match peer.send(label, &envelope).await {
                Ok(()) => return Ok(()),
                Err(ErrorCode::ChannelNotOpen) | Err(ErrorCode::ChannelNotFound) => {
                    // Fall through to the reliable stream.
                }
                Err(_) => {}
            }
        }
    }
    ws_tx.send(Message::Text(envelope.encode().into())).await.map_err(|_| ())
}

/// Translate service broadcasts to wire events for the stream owner.
pub(crate) fn browser_event_to_wire(event: BrowserEvent) -> Option<AgentEvent> {
    match event {
        BrowserEvent::Frame { data, timestamp, metadata } => {
            Some(AgentEvent::BrowserFrame { data, timestamp, metadata })
        }
        BrowserEvent::Cursor { cursor } => Some(AgentEvent::BrowserCursor { cursor }),
        BrowserEvent::Crash { code, signal } => Some(AgentEvent::BrowserError {
            code: ErrorCode::BrowserCrashed.as_str().to_owned(),
            message: format!("browser crashed (code={code:?}, signal={signal:?})"),
        }),
        BrowserEvent::Error { code, message } => {
            Some(AgentEvent::BrowserError { code: code.as_str().to_owned(), message })
        }
        BrowserEvent::IdleShutdown => Some(AgentEvent::BrowserStopped {}),
        // Explicit stops are replied to directly by the dispatcher.
        BrowserEvent::Stopped => None,
    }
}
