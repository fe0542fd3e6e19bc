// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed error codes carried in `*:error` envelopes.
///
/// Every failure a client can observe maps to one of these; the stable
/// string forms are the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Transport
    AuthRejected,
    MalformedEnvelope,
    PayloadTooLarge,

    // Sessions
    SessionGone,
    ShellNotAllowed,
    SessionExists,
    SessionNotFoundForAttach,

    // Filesystem
    PathTraversal,
    IoError,
    Readonly,

    // Tunnels
    TunnelExists,
    TunnelNotOpen,
    TunnelClosed,
    UpstreamUnreachable,

    // Browser
    BrowserBinaryNotFound,
    LaunchFailed,
    InspectorTimeout,
    CdpConnectionLost,
    SchemeBlocked,
    BrowserNotStarted,
    BrowserCrashed,
    NavigateFailed,

    // Signaling / peer
    SignalingSubscribeTimeout,
    ReadyTimeout,
    AnswerTimeout,
    ConnectionTimeout,
    MaxRetriesExceeded,
    ChannelNotOpen,
    ChannelNotFound,

    // Misc
    BadRequest,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthRejected => "AUTH_REJECTED",
            Self::MalformedEnvelope => "MALFORMED_ENVELOPE",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::SessionGone => "SESSION_GONE",
            Self::ShellNotAllowed => "SHELL_NOT_ALLOWED",
            Self::SessionExists => "SESSION_EXISTS",
            Self::SessionNotFoundForAttach => "SESSION_NOT_FOUND_FOR_ATTACH",
            Self::PathTraversal => "PATH_TRAVERSAL",
            Self::IoError => "IO_ERROR",
            Self::Readonly => "READONLY",
            Self::TunnelExists => "TUNNEL_EXISTS",
            Self::TunnelNotOpen => "TUNNEL_NOT_OPEN",
            Self::TunnelClosed => "TUNNEL_CLOSED",
            Self::UpstreamUnreachable => "UPSTREAM_UNREACHABLE",
            Self::BrowserBinaryNotFound => "BROWSER_BINARY_NOT_FOUND",
            Self::LaunchFailed => "LAUNCH_FAILED",
            Self::InspectorTimeout => "INSPECTOR_TIMEOUT",
            Self::CdpConnectionLost => "CDP_CONNECTION_LOST",
            Self::SchemeBlocked => "SCHEME_BLOCKED",
            Self::BrowserNotStarted => "BROWSER_NOT_STARTED",
            Self::BrowserCrashed => "BROWSER_CRASHED",
            Self::NavigateFailed => "NAVIGATE_FAILED",
            Self::SignalingSubscribeTimeout => "SIGNALING_SUBSCRIBE_TIMEOUT",
            Self::ReadyTimeout => "READY_TIMEOUT",
            Self::AnswerTimeout => "ANSWER_TIMEOUT",
            Self::ConnectionTimeout => "CONNECTION_TIMEOUT",
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::ChannelNotOpen => "CHANNEL_NOT_OPEN",
            Self::ChannelNotFound => "CHANNEL_NOT_FOUND",
            Self::BadRequest => "BAD_REQUEST",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
