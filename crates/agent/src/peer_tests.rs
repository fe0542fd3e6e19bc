// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn channel_routing_table() {
    assert_eq!(channel_for("terminal:output"), Some(TERMINAL_IO));
    assert_eq!(channel_for("terminal:input"), Some(TERMINAL_IO));
    // Lifecycle terminal messages stay on the reliable stream.
    assert_eq!(channel_for("terminal:created"), None);
    assert_eq!(channel_for("terminal:destroyed"), None);

    assert_eq!(channel_for("image:chunk"), Some(FILE_TRANSFER));
    assert_eq!(channel_for("file:data"), Some(FILE_TRANSFER));
    assert_eq!(channel_for("filetree:data"), None);

    assert_eq!(channel_for("browser:frame"), Some(BROWSER_STREAM));
    assert_eq!(channel_for("browser:cursor"), Some(BROWSER_STREAM));

    assert_eq!(channel_for("tunnel:response"), None);
    assert_eq!(channel_for("project:list-data"), None);
}

#[tokio::test]
async fn fresh_peer_has_no_channels() {
    let peer = WebRtcPeer::new().await.unwrap();
    assert!(!peer.is_connected());
    let env = Envelope::new("terminal:output", serde_json::json!({}));
    assert_eq!(peer.send(TERMINAL_IO, &env).await.unwrap_err(), ErrorCode::ChannelNotFound);
    peer.close().await;
}

#[tokio::test]
async fn handle_offer_rejects_garbage_sdp() {
    let peer = WebRtcPeer::new().await.unwrap();
    assert!(peer.handle_offer("not an sdp".to_owned()).await.is_err());
    peer.close().await;
}
