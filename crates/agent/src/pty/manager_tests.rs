// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::sync::mpsc;

use vibepilot_protocol::AgentEvent;

use super::*;

fn opts_sh() -> CreateOpts {
    CreateOpts { shell: Some("/bin/sh".to_owned()), ..Default::default() }
}

async fn recv_output(
    rx: &mut mpsc::UnboundedReceiver<AgentEvent>,
    needle: &str,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut seen = String::new();
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(AgentEvent::TerminalOutput { data, .. })) => {
                seen.push_str(&data);
                if seen.contains(needle) {
                    return true;
                }
            }
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => return false,
        }
    }
}

#[tokio::test]
async fn create_echo_destroy() {
    let (manager, mut exit_rx) = PtyManager::new(64 * 1024);
    let session = manager.create("s1", opts_sh()).unwrap();
    assert!(session.pid > 0);

    let (tx, mut rx) = mpsc::unbounded_channel();
    manager.attach_output("s1", tx).unwrap();

    manager.write("s1", b"echo hi-there\n").await.unwrap();
    assert!(recv_output(&mut rx, "hi-there", Duration::from_secs(10)).await);

    manager.destroy("s1");
    let exit = tokio::time::timeout(Duration::from_secs(10), exit_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit.session_id, "s1");
}

#[tokio::test]
async fn duplicate_session_id_rejected() {
    let (manager, _exit_rx) = PtyManager::new(1024);
    manager.create("dup", opts_sh()).unwrap();
    assert_eq!(manager.create("dup", opts_sh()).unwrap_err(), ErrorCode::SessionExists);
    manager.destroy("dup");
}

#[tokio::test]
async fn shell_outside_whitelist_rejected() {
    let (manager, _exit_rx) = PtyManager::new(1024);
    let opts = CreateOpts { shell: Some("/usr/bin/python3".to_owned()), ..Default::default() };
    assert_eq!(manager.create("s", opts).unwrap_err(), ErrorCode::ShellNotAllowed);
}

#[tokio::test]
async fn write_to_unknown_session_is_session_gone() {
    let (manager, _exit_rx) = PtyManager::new(1024);
    assert_eq!(manager.write("nope", b"x").await.unwrap_err(), ErrorCode::SessionGone);
}

#[tokio::test]
async fn output_buffers_while_detached_and_drains_on_attach() {
    let (manager, _exit_rx) = PtyManager::new(64 * 1024);
    manager.create("s2", opts_sh()).unwrap();

    // No sink yet: the banner/echo accumulates in the replay buffer.
    manager.write("s2", b"echo buffered-marker\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let drained = manager.attach_output("s2", tx).unwrap();
    let drained = String::from_utf8_lossy(&drained).into_owned();
    assert!(drained.contains("buffered-marker"), "drained: {drained:?}");

    manager.destroy("s2");
}

#[tokio::test]
async fn exit_without_destroy_reports_through_exit_channel() {
    let (manager, mut exit_rx) = PtyManager::new(1024);
    manager.create("s3", opts_sh()).unwrap();
    manager.write("s3", b"exit 7\n").await.unwrap();

    let exit = tokio::time::timeout(Duration::from_secs(10), exit_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit.session_id, "s3");
    assert_eq!(exit.exit_code, 7);
}

#[test]
fn exit_code_collapse() {
    use super::spawn::ExitStatus;
    assert_eq!(ExitStatus { code: Some(0), signal: None }.exit_code(), 0);
    assert_eq!(ExitStatus { code: None, signal: Some(9) }.exit_code(), 137);
    assert_eq!(ExitStatus { code: None, signal: None }.exit_code(), -1);
}
