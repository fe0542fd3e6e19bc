// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::envelope::Envelope;

fn parse(kind: &str, payload: serde_json::Value) -> Result<Option<ClientRequest>, EnvelopeError> {
    let env = Envelope::new(kind, payload);
    ClientRequest::from_envelope(&env)
}

#[test]
fn terminal_create_parses() {
    let req = parse(
        "terminal:create",
        serde_json::json!({"sessionId": "s1", "cols": 80, "rows": 24}),
    )
    .unwrap()
    .unwrap();
    match req {
        ClientRequest::TerminalCreate { session_id, cols, rows, cwd, shell } => {
            assert_eq!(session_id, "s1");
            assert_eq!(cols, Some(80));
            assert_eq!(rows, Some(24));
            assert_eq!(cwd, None);
            assert_eq!(shell, None);
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn unknown_type_is_skipped_not_an_error() {
    let result = parse("terminal:flip", serde_json::json!({})).unwrap();
    assert!(result.is_none());
}

#[test]
fn known_type_with_bad_payload_errors() {
    let err = parse("terminal:input", serde_json::json!({"sessionId": 7})).unwrap_err();
    assert!(matches!(err, EnvelopeError::BadPayload(_)));
}

#[test]
fn tunnel_request_headers_default_empty() {
    let req = parse(
        "tunnel:request",
        serde_json::json!({
            "tunnelId": "t1", "requestId": "r1", "method": "GET", "path": "/ping"
        }),
    )
    .unwrap()
    .unwrap();
    match req {
        ClientRequest::TunnelRequest { headers, body, .. } => {
            assert!(headers.is_empty());
            assert!(body.is_none());
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn browser_input_fields_sit_at_payload_top_level() {
    let req = parse(
        "browser:input",
        serde_json::json!({"type": "mouseMoved", "x": 10.0, "y": 20.0}),
    )
    .unwrap()
    .unwrap();
    match req {
        ClientRequest::BrowserInput { event } => {
            assert_eq!(event.kind, "mouseMoved");
            assert_eq!(event.x, Some(10.0));
            assert_eq!(event.y, Some(20.0));
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn agent_event_envelope_kind_matches() {
    let event = AgentEvent::TerminalOutput { session_id: "s1".into(), data: "hi".into() };
    assert_eq!(event.kind(), "terminal:output");
    let env = event.into_envelope();
    assert_eq!(env.kind, "terminal:output");
    assert_eq!(env.payload["sessionId"], "s1");
    assert_eq!(env.payload["data"], "hi");
}

#[test]
fn agent_events_round_trip_through_envelopes() {
    let events = vec![
        AgentEvent::TerminalCreated { session_id: "s".into(), pid: 42 },
        AgentEvent::FiletreeChanged { kind: ChangeKind::AddDir, path: "src".into() },
        AgentEvent::TunnelError {
            tunnel_id: "t".into(),
            request_id: Some("r".into()),
            code: "TUNNEL_CLOSED".into(),
            message: "tunnel closed".into(),
        },
        AgentEvent::BrowserCursor { cursor: "pointer".into() },
        AgentEvent::SignalAnswer { sdp: "v=0".into() },
    ];
    for event in events {
        let env = event.clone().into_envelope();
        let decoded = Envelope::decode(&env.encode()).unwrap();
        let body = serde_json::json!({"type": decoded.kind, "payload": decoded.payload});
        let back: AgentEvent = serde_json::from_value(body).unwrap();
        assert_eq!(back, event);
    }
}

#[test]
fn change_kind_wire_names() {
    assert_eq!(serde_json::to_value(ChangeKind::AddDir).unwrap(), "addDir");
    assert_eq!(serde_json::to_value(ChangeKind::Unlink).unwrap(), "unlink");
}

#[test]
fn known_request_types_cover_every_variant() {
    // Every entry in the known-types list must parse into a variant when
    // given a maximally-populated payload or fail only on payload shape,
    // never on the tag.
    for kind in KNOWN_REQUEST_TYPES {
        let env = Envelope::new(*kind, serde_json::json!({}));
        match ClientRequest::from_envelope(&env) {
            Ok(Some(_)) | Err(EnvelopeError::BadPayload(_)) => {}
            other => panic!("{kind}: tag not recognized: {other:?}"),
        }
    }
}
