// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use parking_lot::Mutex;
use tokio::sync::mpsc;

use vibepilot_protocol::AgentEvent;

use crate::replay::ReplayBuffer;

/// Where a session's output currently goes: a live client queue, or the
/// replay buffer while the session is orphaned.
type Sink = mpsc::UnboundedSender<AgentEvent>;

/// Indirection between a PTY pump and its current output sink.
///
/// The swap and the buffered-byte drain happen under one lock, so from the
/// producer's point of view every byte is observed exactly once — by the
/// old sink, the buffer, or the new sink.
#[derive(Debug)]
pub struct OutputDelegate {
    session_id: String,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    sink: Option<Sink>,
    buffer: ReplayBuffer,
}

impl OutputDelegate {
    pub fn new(session_id: impl Into<String>, replay_capacity: usize) -> Self {
        Self {
            session_id: session_id.into(),
            inner: Mutex::new(Inner { sink: None, buffer: ReplayBuffer::new(replay_capacity) }),
        }
    }

    /// Deliver output bytes to the live sink, or buffer them.
    ///
    /// A sink whose receiver has gone away counts as detached: the bytes
    /// land in the buffer and the stale sink is dropped.
    pub fn write(&self, data: &[u8]) {
        let mut inner = self.inner.lock();
        if let Some(ref sink) = inner.sink {
            let event = AgentEvent::TerminalOutput {
                session_id: self.session_id.clone(),
                data: String::from_utf8_lossy(data).into_owned(),
            };
            if sink.send(event).is_ok() {
                return;
            }
            inner.sink = None;
        }
        inner.buffer.write(data);
    }

    /// Forward a non-output session event (cwd change, exit) to the live
    /// sink. Dropped silently while orphaned — cwd polling is paused and
    /// an exit with no owner has nobody to tell.
    pub fn emit(&self, event: AgentEvent) {
        let mut inner = self.inner.lock();
        if let Some(ref sink) = inner.sink {
            if sink.send(event).is_err() {
                inner.sink = None;
            }
        }
    }

    /// Swap in a live sink and drain whatever accumulated while orphaned.
    ///
    /// The drained bytes are returned to the caller (for `bufferedOutput`
    /// in the attach reply) rather than pushed through the new sink.
    pub fn attach(&self, sink: Sink) -> Vec<u8> {
        let mut inner = self.inner.lock();
        inner.sink = Some(sink);
        inner.buffer.drain()
    }

    /// Remove the live sink; subsequent output accumulates in the buffer.
    pub fn detach(&self) {
        self.inner.lock().sink = None;
    }

    pub fn has_sink(&self) -> bool {
        self.inner.lock().sink.is_some()
    }

    pub fn buffered(&self) -> usize {
        self.inner.lock().buffer.size()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(test)]
#[path = "delegate_tests.rs"]
mod tests;
