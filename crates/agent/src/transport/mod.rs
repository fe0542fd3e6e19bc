// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport surfaces: the reliable-stream WebSocket server and the
//! standalone loop for bus-signaled peer clients.

pub mod dispatch;
pub mod peer_client;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::state::AgentState;

/// Per-record ceiling on the reliable stream.
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Build the agent's HTTP router: the WebSocket endpoint plus a health
/// probe.
pub fn build_router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
