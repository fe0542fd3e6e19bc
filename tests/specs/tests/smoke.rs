// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests that spawn the real `vibepilot` binary and drive it
//! over the wire: terminal lifecycle, orphan/resume, tunnels, file
//! services, and transport-level framing errors.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::Request;
use axum::routing::any;
use axum::Router;
use base64::Engine;

use vibepilot_protocol::{AgentEvent, ClientRequest, Envelope};
use vibepilot_specs::{AgentProcess, WsClient};

const TIMEOUT: Duration = Duration::from_secs(15);

fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn create_sh(session_id: &str) -> ClientRequest {
    ClientRequest::TerminalCreate {
        session_id: session_id.to_owned(),
        cols: Some(80),
        rows: Some(24),
        cwd: None,
        shell: Some("/bin/sh".to_owned()),
    }
}

// -- S1: create / echo / destroy ---------------------------------------------

#[tokio::test]
async fn terminal_create_echo_destroy() -> anyhow::Result<()> {
    let agent = AgentProcess::start(None)?;
    agent.wait_healthy(TIMEOUT).await?;
    let mut client = WsClient::connect(&agent.ws_url(None)).await?;

    client.send(&create_sh("s1")).await?;
    let pid = client
        .expect(TIMEOUT, |e| match e {
            AgentEvent::TerminalCreated { session_id, pid } if session_id == "s1" => Some(*pid),
            _ => None,
        })
        .await?;
    assert!(pid > 0);

    client
        .send(&ClientRequest::TerminalInput { session_id: "s1".into(), data: "echo hi\r".into() })
        .await?;
    client
        .expect(TIMEOUT, |e| match e {
            AgentEvent::TerminalOutput { session_id, data }
                if session_id == "s1" && data.contains("hi") =>
            {
                Some(())
            }
            _ => None,
        })
        .await?;

    client.send(&ClientRequest::TerminalDestroy { session_id: "s1".into() }).await?;
    client
        .expect(TIMEOUT, |e| match e {
            AgentEvent::TerminalDestroyed { session_id, .. } if session_id == "s1" => Some(()),
            _ => None,
        })
        .await?;

    Ok(())
}

// -- S2: orphan and resume ----------------------------------------------------

#[tokio::test]
async fn orphan_and_resume_preserves_output() -> anyhow::Result<()> {
    let agent = AgentProcess::start(None)?;
    agent.wait_healthy(TIMEOUT).await?;

    let mut first = WsClient::connect(&agent.ws_url(None)).await?;
    first.send(&create_sh("s1")).await?;
    let pid = first
        .expect(TIMEOUT, |e| match e {
            AgentEvent::TerminalCreated { pid, .. } => Some(*pid),
            _ => None,
        })
        .await?;

    // Queue output that will land after the disconnect.
    first
        .send(&ClientRequest::TerminalInput {
            session_id: "s1".into(),
            data: "sleep 1; echo pending-bytes\r".into(),
        })
        .await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    drop(first);

    // Give the shell time to produce the orphaned output.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let mut second = WsClient::connect(&agent.ws_url(None)).await?;
    second
        .send(&ClientRequest::TerminalAttach { session_id: "s1".into(), cols: None, rows: None })
        .await?;
    let (resumed_pid, buffered) = second
        .expect(TIMEOUT, |e| match e {
            AgentEvent::TerminalAttached { pid, buffered_output, .. } => {
                Some((*pid, buffered_output.clone()))
            }
            _ => None,
        })
        .await?;
    assert_eq!(resumed_pid, pid);
    assert!(buffered.contains("pending-bytes"), "buffered: {buffered:?}");

    // The resumed session is still interactive.
    second
        .send(&ClientRequest::TerminalInput {
            session_id: "s1".into(),
            data: "echo after-resume\r".into(),
        })
        .await?;
    second
        .expect(TIMEOUT, |e| match e {
            AgentEvent::TerminalOutput { data, .. } if data.contains("after-resume") => Some(()),
            _ => None,
        })
        .await?;

    Ok(())
}

#[tokio::test]
async fn attach_to_unknown_session_reports_destroyed() -> anyhow::Result<()> {
    let agent = AgentProcess::start(None)?;
    agent.wait_healthy(TIMEOUT).await?;
    let mut client = WsClient::connect(&agent.ws_url(None)).await?;

    client
        .send(&ClientRequest::TerminalAttach { session_id: "ghost".into(), cols: None, rows: None })
        .await?;
    let exit_code = client
        .expect(TIMEOUT, |e| match e {
            AgentEvent::TerminalDestroyed { session_id, exit_code } if session_id == "ghost" => {
                Some(*exit_code)
            }
            _ => None,
        })
        .await?;
    assert_eq!(exit_code, -1);
    Ok(())
}

// -- S3 / S4: tunnel round-trips ---------------------------------------------

async fn spawn_echo_server() -> anyhow::Result<u16> {
    let app = Router::new().fallback(any(|req: Request| async move {
        let method = req.method().to_string();
        let url = req.uri().path_and_query().map(|pq| pq.to_string()).unwrap_or_default();
        let body = axum::body::to_bytes(req.into_body(), 1024 * 1024).await.unwrap_or_default();
        if body.is_empty() {
            Bytes::from(format!("{{\"method\":\"{method}\",\"url\":\"{url}\"}}"))
        } else {
            body
        }
    }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(port)
}

#[tokio::test]
async fn tunnel_get_round_trip() -> anyhow::Result<()> {
    let agent = AgentProcess::start(None)?;
    agent.wait_healthy(TIMEOUT).await?;
    let upstream_port = spawn_echo_server().await?;
    let mut client = WsClient::connect(&agent.ws_url(None)).await?;

    client
        .send(&ClientRequest::TunnelOpen {
            tunnel_id: "t1".into(),
            target_port: upstream_port,
            target_host: None,
        })
        .await?;
    client
        .expect(TIMEOUT, |e| match e {
            AgentEvent::TunnelOpened { tunnel_id } if tunnel_id == "t1" => Some(()),
            _ => None,
        })
        .await?;

    client
        .send(&ClientRequest::TunnelRequest {
            tunnel_id: "t1".into(),
            request_id: "r1".into(),
            method: "GET".into(),
            path: "/ping?x=1".into(),
            headers: BTreeMap::new(),
            body: None,
        })
        .await?;
    let (status, body) = client
        .expect(TIMEOUT, |e| match e {
            AgentEvent::TunnelResponse { request_id, status, body, .. } if request_id == "r1" => {
                Some((*status, body.clone()))
            }
            _ => None,
        })
        .await?;
    assert_eq!(status, 200);
    let decoded = base64::engine::general_purpose::STANDARD.decode(body.unwrap())?;
    let text = String::from_utf8(decoded)?;
    assert!(text.starts_with("{\"method\":\"GET\",\"url\":\"/ping?x=1\""), "{text}");
    Ok(())
}

#[tokio::test]
async fn tunnel_binary_round_trip() -> anyhow::Result<()> {
    let agent = AgentProcess::start(None)?;
    agent.wait_healthy(TIMEOUT).await?;
    let upstream_port = spawn_echo_server().await?;
    let mut client = WsClient::connect(&agent.ws_url(None)).await?;

    client
        .send(&ClientRequest::TunnelOpen {
            tunnel_id: "t1".into(),
            target_port: upstream_port,
            target_host: None,
        })
        .await?;
    client
        .expect(TIMEOUT, |e| matches!(e, AgentEvent::TunnelOpened { .. }).then_some(()))
        .await?;

    let payload: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
    client
        .send(&ClientRequest::TunnelRequest {
            tunnel_id: "t1".into(),
            request_id: "r1".into(),
            method: "POST".into(),
            path: "/b".into(),
            headers: BTreeMap::new(),
            body: Some(b64(&payload)),
        })
        .await?;
    let (headers, body) = client
        .expect(TIMEOUT, |e| match e {
            AgentEvent::TunnelResponse { request_id, headers, body, .. } if request_id == "r1" => {
                Some((headers.clone(), body.clone()))
            }
            _ => None,
        })
        .await?;
    assert_eq!(headers.get("content-length").map(String::as_str), Some("256"));
    let decoded = base64::engine::general_purpose::STANDARD.decode(body.unwrap())?;
    assert_eq!(decoded, payload);
    Ok(())
}

// -- File services over the wire ---------------------------------------------

#[tokio::test]
async fn file_write_read_and_traversal_rejection() -> anyhow::Result<()> {
    let agent = AgentProcess::start(None)?;
    agent.wait_healthy(TIMEOUT).await?;
    let mut client = WsClient::connect(&agent.ws_url(None)).await?;

    client
        .send(&ClientRequest::FileWrite {
            file_path: "notes.md".into(),
            content: "# notes".into(),
            encoding: Some("utf-8".into()),
        })
        .await?;
    client
        .expect(TIMEOUT, |e| matches!(e, AgentEvent::FileWritten { .. }).then_some(()))
        .await?;
    assert_eq!(std::fs::read_to_string(agent.project_root.join("notes.md"))?, "# notes");

    client
        .send(&ClientRequest::FiletreeList { path: "../".into(), depth: None })
        .await?;
    let code = client
        .expect(TIMEOUT, |e| match e {
            AgentEvent::FiletreeError { code, .. } => Some(code.clone()),
            _ => None,
        })
        .await?;
    assert_eq!(code, "PATH_TRAVERSAL");
    Ok(())
}

// -- Transport framing --------------------------------------------------------

#[tokio::test]
async fn malformed_envelope_gets_error_not_disconnect() -> anyhow::Result<()> {
    let agent = AgentProcess::start(None)?;
    agent.wait_healthy(TIMEOUT).await?;
    let mut client = WsClient::connect(&agent.ws_url(None)).await?;

    client.send_raw("{\"id\":\"1-0\",\"timestamp\":1}").await?;
    let envelope = client.recv_envelope(TIMEOUT).await?;
    assert_eq!(envelope.kind, "error");
    assert_eq!(envelope.payload["code"], "MALFORMED_ENVELOPE");

    // Connection still works afterwards.
    client.send(&ClientRequest::ProjectList {}).await?;
    client
        .expect(TIMEOUT, |e| matches!(e, AgentEvent::ProjectListData { .. }).then_some(()))
        .await?;
    Ok(())
}

#[tokio::test]
async fn unknown_message_type_is_ignored() -> anyhow::Result<()> {
    let agent = AgentProcess::start(None)?;
    agent.wait_healthy(TIMEOUT).await?;
    let mut client = WsClient::connect(&agent.ws_url(None)).await?;

    let unknown = Envelope::new("terminal:levitate", serde_json::json!({}));
    client.send_raw(&unknown.encode()).await?;

    // The agent keeps serving.
    client.send(&ClientRequest::ProjectList {}).await?;
    client
        .expect(TIMEOUT, |e| matches!(e, AgentEvent::ProjectListData { .. }).then_some(()))
        .await?;
    Ok(())
}

// -- Auth upgrade -------------------------------------------------------------

#[tokio::test]
async fn auth_rejects_bad_token_and_accepts_good() -> anyhow::Result<()> {
    let agent = AgentProcess::start(Some("hunter2"))?;
    agent.wait_healthy(TIMEOUT).await?;

    assert!(WsClient::connect(&agent.ws_url(None)).await.is_err());
    assert!(WsClient::connect(&agent.ws_url(Some("wrong"))).await.is_err());

    let mut client = WsClient::connect(&agent.ws_url(Some("hunter2"))).await?;
    client.send(&ClientRequest::ProjectList {}).await?;
    client
        .expect(TIMEOUT, |e| matches!(e, AgentEvent::ProjectListData { .. }).then_some(()))
        .await?;
    Ok(())
}

// -- Watcher broadcast --------------------------------------------------------

#[tokio::test]
async fn filesystem_changes_reach_every_client() -> anyhow::Result<()> {
    let agent = AgentProcess::start(None)?;
    agent.wait_healthy(TIMEOUT).await?;
    let mut a = WsClient::connect(&agent.ws_url(None)).await?;
    let mut b = WsClient::connect(&agent.ws_url(None)).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    std::fs::write(agent.project_root.join("fresh.txt"), "x")?;

    for client in [&mut a, &mut b] {
        client
            .expect(TIMEOUT, |e| match e {
                AgentEvent::FiletreeChanged { path, .. } if path == "fresh.txt" => Some(()),
                _ => None,
            })
            .await?;
    }
    Ok(())
}
