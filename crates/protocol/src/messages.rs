// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed message catalogue.
//!
//! Two adjacently-tagged enums cover the two directions; their serialized
//! form (`{"type": ..., "payload": {...}}`) is exactly the envelope body,
//! so converting between [`Envelope`] and a typed message is a single
//! serde pass. Payload keys are camelCase on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{Envelope, EnvelopeError};

// -- Shared payload records ---------------------------------------------------

/// One entry in a `filetree:data` listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeEntry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Filesystem change kinds reported by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "add")]
    Add,
    #[serde(rename = "change")]
    Change,
    #[serde(rename = "unlink")]
    Unlink,
    #[serde(rename = "addDir")]
    AddDir,
    #[serde(rename = "unlinkDir")]
    UnlinkDir,
}

/// A registered project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: String,
}

/// A single input event forwarded to the embedded browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInputEvent {
    /// Event kind: `mousePressed`, `mouseReleased`, `mouseMoved`, `wheel`,
    /// `keyDown`, `keyUp`, `char`, or `insertText`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<u32>,
}

/// Metadata accompanying a screencast frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMetadata {
    pub device_width: u32,
    pub device_height: u32,
    pub page_scale_factor: f64,
    pub offset_top: f64,
    pub scroll_offset_x: f64,
    pub scroll_offset_y: f64,
}

/// Snapshot of the browser service returned by `browser:started`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInfo {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

// -- Client → agent -----------------------------------------------------------

/// Requests a client may send to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientRequest {
    #[serde(rename = "terminal:create", rename_all = "camelCase")]
    TerminalCreate {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cols: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rows: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        shell: Option<String>,
    },
    #[serde(rename = "terminal:input", rename_all = "camelCase")]
    TerminalInput { session_id: String, data: String },
    #[serde(rename = "terminal:resize", rename_all = "camelCase")]
    TerminalResize { session_id: String, cols: u16, rows: u16 },
    #[serde(rename = "terminal:destroy", rename_all = "camelCase")]
    TerminalDestroy { session_id: String },
    #[serde(rename = "terminal:attach", rename_all = "camelCase")]
    TerminalAttach {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cols: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rows: Option<u16>,
    },

    #[serde(rename = "filetree:list", rename_all = "camelCase")]
    FiletreeList {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        depth: Option<usize>,
    },
    #[serde(rename = "file:read", rename_all = "camelCase")]
    FileRead { file_path: String },
    #[serde(rename = "file:write", rename_all = "camelCase")]
    FileWrite {
        file_path: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        encoding: Option<String>,
    },

    #[serde(rename = "image:start", rename_all = "camelCase")]
    ImageStart {
        transfer_id: String,
        session_id: String,
        filename: String,
        total_size: u64,
    },
    #[serde(rename = "image:chunk", rename_all = "camelCase")]
    ImageChunk { transfer_id: String, chunk_index: u32, data: String },
    #[serde(rename = "image:complete", rename_all = "camelCase")]
    ImageComplete { transfer_id: String },

    #[serde(rename = "project:list", rename_all = "camelCase")]
    ProjectList {},
    #[serde(rename = "project:add", rename_all = "camelCase")]
    ProjectAdd { name: String, path: String },
    #[serde(rename = "project:remove", rename_all = "camelCase")]
    ProjectRemove { project_id: String },
    #[serde(rename = "project:update", rename_all = "camelCase")]
    ProjectUpdate { project_id: String, updates: Value },
    #[serde(rename = "project:switch", rename_all = "camelCase")]
    ProjectSwitch { project_id: String },

    #[serde(rename = "tunnel:open", rename_all = "camelCase")]
    TunnelOpen {
        tunnel_id: String,
        target_port: u16,
        #[serde(skip_serializing_if = "Option::is_none")]
        target_host: Option<String>,
    },
    #[serde(rename = "tunnel:close", rename_all = "camelCase")]
    TunnelClose { tunnel_id: String },
    #[serde(rename = "tunnel:request", rename_all = "camelCase")]
    TunnelRequest {
        tunnel_id: String,
        request_id: String,
        method: String,
        path: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },

    #[serde(rename = "browser:start", rename_all = "camelCase")]
    BrowserStart {
        #[serde(skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    #[serde(rename = "browser:stop", rename_all = "camelCase")]
    BrowserStop {},
    #[serde(rename = "browser:navigate", rename_all = "camelCase")]
    BrowserNavigate { url: String },
    #[serde(rename = "browser:input", rename_all = "camelCase")]
    BrowserInput {
        #[serde(flatten)]
        event: BrowserInputEvent,
    },
    #[serde(rename = "browser:resize", rename_all = "camelCase")]
    BrowserResize { width: u32, height: u32 },
    #[serde(rename = "browser:frame-ack", rename_all = "camelCase")]
    BrowserFrameAck { timestamp: i64 },

    #[serde(rename = "connection:request", rename_all = "camelCase")]
    ConnectionRequest { agent_id: String },
    #[serde(rename = "signal:offer", rename_all = "camelCase")]
    SignalOffer { sdp: String },
    #[serde(rename = "signal:candidate", rename_all = "camelCase")]
    SignalCandidate {
        candidate: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp_m_line_index: Option<u16>,
    },
}

// -- Agent → client -----------------------------------------------------------

/// Events and replies the agent sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum AgentEvent {
    #[serde(rename = "terminal:created", rename_all = "camelCase")]
    TerminalCreated { session_id: String, pid: i32 },
    #[serde(rename = "terminal:output", rename_all = "camelCase")]
    TerminalOutput { session_id: String, data: String },
    #[serde(rename = "terminal:destroyed", rename_all = "camelCase")]
    TerminalDestroyed { session_id: String, exit_code: i32 },
    #[serde(rename = "terminal:attached", rename_all = "camelCase")]
    TerminalAttached { session_id: String, pid: i32, buffered_output: String },
    #[serde(rename = "terminal:cwd", rename_all = "camelCase")]
    TerminalCwd { session_id: String, cwd: String },
    #[serde(rename = "terminal:error", rename_all = "camelCase")]
    TerminalError { session_id: String, code: String, message: String },

    #[serde(rename = "filetree:data", rename_all = "camelCase")]
    FiletreeData { path: String, entries: Vec<TreeEntry> },
    #[serde(rename = "filetree:changed", rename_all = "camelCase")]
    FiletreeChanged {
        #[serde(rename = "type")]
        kind: ChangeKind,
        path: String,
    },
    #[serde(rename = "filetree:error", rename_all = "camelCase")]
    FiletreeError { path: String, code: String, message: String },

    #[serde(rename = "file:data", rename_all = "camelCase")]
    FileData {
        file_path: String,
        content: String,
        language: String,
        mime_type: String,
        readonly: bool,
        size: u64,
    },
    #[serde(rename = "file:written", rename_all = "camelCase")]
    FileWritten { file_path: String, size: u64 },
    #[serde(rename = "file:error", rename_all = "camelCase")]
    FileError { file_path: String, code: String, message: String },

    #[serde(rename = "image:saved", rename_all = "camelCase")]
    ImageSaved { transfer_id: String, session_id: String, file_path: String },
    #[serde(rename = "image:error", rename_all = "camelCase")]
    ImageError { transfer_id: String, code: String, message: String },

    #[serde(rename = "project:list-data", rename_all = "camelCase")]
    ProjectListData { projects: Vec<Project>, current_project_id: Option<String> },
    #[serde(rename = "project:added", rename_all = "camelCase")]
    ProjectAdded { project: Project },
    #[serde(rename = "project:removed", rename_all = "camelCase")]
    ProjectRemoved { project_id: String },
    #[serde(rename = "project:updated", rename_all = "camelCase")]
    ProjectUpdated { project: Project },
    #[serde(rename = "project:switched", rename_all = "camelCase")]
    ProjectSwitched { project_id: String },
    #[serde(rename = "project:error", rename_all = "camelCase")]
    ProjectError { code: String, message: String },

    #[serde(rename = "tunnel:opened", rename_all = "camelCase")]
    TunnelOpened { tunnel_id: String },
    #[serde(rename = "tunnel:closed", rename_all = "camelCase")]
    TunnelClosed { tunnel_id: String },
    #[serde(rename = "tunnel:response", rename_all = "camelCase")]
    TunnelResponse {
        tunnel_id: String,
        request_id: String,
        status: u16,
        headers: BTreeMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    #[serde(rename = "tunnel:error", rename_all = "camelCase")]
    TunnelError {
        tunnel_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        code: String,
        message: String,
    },

    #[serde(rename = "browser:started", rename_all = "camelCase")]
    BrowserStarted {
        #[serde(flatten)]
        info: BrowserInfo,
    },
    #[serde(rename = "browser:stopped", rename_all = "camelCase")]
    BrowserStopped {},
    #[serde(rename = "browser:navigated", rename_all = "camelCase")]
    BrowserNavigated { url: String },
    #[serde(rename = "browser:frame", rename_all = "camelCase")]
    BrowserFrame { data: String, timestamp: i64, metadata: FrameMetadata },
    #[serde(rename = "browser:cursor", rename_all = "camelCase")]
    BrowserCursor { cursor: String },
    #[serde(rename = "browser:error", rename_all = "camelCase")]
    BrowserError { code: String, message: String },

    #[serde(rename = "connection:ready", rename_all = "camelCase")]
    ConnectionReady { agent_id: String },
    #[serde(rename = "signal:answer", rename_all = "camelCase")]
    SignalAnswer { sdp: String },
    #[serde(rename = "signal:candidate", rename_all = "camelCase")]
    SignalCandidate {
        candidate: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp_m_line_index: Option<u16>,
    },
}

// -- Envelope conversion ------------------------------------------------------

/// Message types the agent understands. Anything else is skipped with a
/// warning rather than treated as malformed.
pub const KNOWN_REQUEST_TYPES: &[&str] = &[
    "terminal:create",
    "terminal:input",
    "terminal:resize",
    "terminal:destroy",
    "terminal:attach",
    "filetree:list",
    "file:read",
    "file:write",
    "image:start",
    "image:chunk",
    "image:complete",
    "project:list",
    "project:add",
    "project:remove",
    "project:update",
    "project:switch",
    "tunnel:open",
    "tunnel:close",
    "tunnel:request",
    "browser:start",
    "browser:stop",
    "browser:navigate",
    "browser:input",
    "browser:resize",
    "browser:frame-ack",
    "connection:request",
    "signal:offer",
    "signal:candidate",
];

impl ClientRequest {
    /// Interpret a decoded envelope as a typed request.
    ///
    /// Returns `Ok(None)` for message types the agent does not know, and
    /// `Err(BadPayload)` when a known type carries a payload that does not
    /// match its schema.
    pub fn from_envelope(env: &Envelope) -> Result<Option<Self>, EnvelopeError> {
        if !KNOWN_REQUEST_TYPES.contains(&env.kind.as_str()) {
            return Ok(None);
        }
        let body = serde_json::json!({ "type": env.kind, "payload": env.payload });
        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| EnvelopeError::BadPayload(format!("{}: {e}", env.kind)))
    }
}

impl AgentEvent {
    /// Frame this event as an envelope with a fresh id and timestamp.
    pub fn into_envelope(self) -> Envelope {
        // AgentEvent serialization cannot fail: every field is a plain
        // serde type with no custom Serialize impls.
        let body = serde_json::to_value(&self).unwrap_or_default();
        let kind = body
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        let payload = body
            .get("payload")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        Envelope::new(kind, payload)
    }

    /// The wire type string for this event, without framing it.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TerminalCreated { .. } => "terminal:created",
            Self::TerminalOutput { .. } => "terminal:output",
            Self::TerminalDestroyed { .. } => "terminal:destroyed",
            Self::TerminalAttached { .. } => "terminal:attached",
            Self::TerminalCwd { .. } => "terminal:cwd",
            Self::TerminalError { .. } => "terminal:error",
            Self::FiletreeData { .. } => "filetree:data",
            Self::FiletreeChanged { .. } => "filetree:changed",
            Self::FiletreeError { .. } => "filetree:error",
            Self::FileData { .. } => "file:data",
            Self::FileWritten { .. } => "file:written",
            Self::FileError { .. } => "file:error",
            Self::ImageSaved { .. } => "image:saved",
            Self::ImageError { .. } => "image:error",
            Self::ProjectListData { .. } => "project:list-data",
            Self::ProjectAdded { .. } => "project:added",
            Self::ProjectRemoved { .. } => "project:removed",
            Self::ProjectUpdated { .. } => "project:updated",
            Self::ProjectSwitched { .. } => "project:switched",
            Self::ProjectError { .. } => "project:error",
            Self::TunnelOpened { .. } => "tunnel:opened",
            Self::TunnelClosed { .. } => "tunnel:closed",
            Self::TunnelResponse { .. } => "tunnel:response",
            Self::TunnelError { .. } => "tunnel:error",
            Self::BrowserStarted { .. } => "browser:started",
            Self::BrowserStopped { .. } => "browser:stopped",
            Self::BrowserNavigated { .. } => "browser:navigated",
            Self::BrowserFrame { .. } => "browser:frame",
            Self::BrowserCursor { .. } => "browser:cursor",
            Self::BrowserError { .. } => "browser:error",
            Self::ConnectionReady { .. } => "connection:ready",
            Self::SignalAnswer { .. } => "signal:answer",
            Self::SignalCandidate { .. } => "signal:candidate",
        }
    }
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
