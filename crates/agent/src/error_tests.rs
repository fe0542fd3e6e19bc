// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn stable_string_forms() {
    assert_eq!(ErrorCode::TunnelClosed.as_str(), "TUNNEL_CLOSED");
    assert_eq!(ErrorCode::ShellNotAllowed.as_str(), "SHELL_NOT_ALLOWED");
    assert_eq!(ErrorCode::SchemeBlocked.as_str(), "SCHEME_BLOCKED");
    assert_eq!(ErrorCode::PathTraversal.as_str(), "PATH_TRAVERSAL");
    assert_eq!(ErrorCode::NavigateFailed.as_str(), "NAVIGATE_FAILED");
}

#[test]
fn display_matches_as_str() {
    assert_eq!(ErrorCode::UpstreamUnreachable.to_string(), "UPSTREAM_UNREACHABLE");
    assert_eq!(ErrorCode::CdpConnectionLost.to_string(), "CDP_CONNECTION_LOST");
}
