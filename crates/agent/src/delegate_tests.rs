// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::sync::mpsc;

use vibepilot_protocol::AgentEvent;

use super::*;

fn output_data(event: AgentEvent) -> String {
    match event {
        AgentEvent::TerminalOutput { data, .. } => data,
        other => panic!("expected TerminalOutput, got {other:?}"),
    }
}

#[test]
fn buffers_without_sink() {
    let delegate = OutputDelegate::new("s1", 64);
    delegate.write(b"hello");
    assert!(!delegate.has_sink());
    assert_eq!(delegate.buffered(), 5);
}

#[test]
fn forwards_with_sink() {
    let delegate = OutputDelegate::new("s1", 64);
    let (tx, mut rx) = mpsc::unbounded_channel();
    assert!(delegate.attach(tx).is_empty());
    delegate.write(b"hi");
    assert_eq!(output_data(rx.try_recv().unwrap()), "hi");
    assert_eq!(delegate.buffered(), 0);
}

#[test]
fn attach_drains_buffered_bytes_to_caller() {
    let delegate = OutputDelegate::new("s1", 64);
    delegate.write(b"pending-");
    delegate.write(b"bytes");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let drained = delegate.attach(tx);
    assert_eq!(drained, b"pending-bytes".to_vec());
    // Drained bytes go to the caller, not through the sink.
    assert!(rx.try_recv().is_err());

    delegate.write(b"after");
    assert_eq!(output_data(rx.try_recv().unwrap()), "after");
}

#[test]
fn detach_redirects_to_buffer() {
    let delegate = OutputDelegate::new("s1", 64);
    let (tx, mut rx) = mpsc::unbounded_channel();
    delegate.attach(tx);
    delegate.write(b"live");
    delegate.detach();
    delegate.write(b"orphaned");

    assert_eq!(output_data(rx.try_recv().unwrap()), "live");
    assert!(rx.try_recv().is_err());
    assert_eq!(delegate.buffered(), 8);
}

#[test]
fn dead_sink_falls_back_to_buffer() {
    let delegate = OutputDelegate::new("s1", 64);
    let (tx, rx) = mpsc::unbounded_channel();
    delegate.attach(tx);
    drop(rx);
    delegate.write(b"lost-client");
    assert!(!delegate.has_sink());
    assert_eq!(delegate.buffered(), 11);
}

#[test]
fn emit_goes_only_to_live_sink() {
    let delegate = OutputDelegate::new("s1", 64);
    let cwd = AgentEvent::TerminalCwd { session_id: "s1".into(), cwd: "/tmp".into() };

    // No sink: dropped, not buffered.
    delegate.emit(cwd.clone());
    assert_eq!(delegate.buffered(), 0);

    let (tx, mut rx) = mpsc::unbounded_channel();
    delegate.attach(tx);
    delegate.emit(cwd.clone());
    assert_eq!(rx.try_recv().unwrap(), cwd);
}
