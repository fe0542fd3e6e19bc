// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rendezvous bus capability used for out-of-band peer signaling. The
//! wire shape on any backend is `{"event": ..., "payload": {...}}`;
//! malformed bus payloads are dropped at this boundary, never propagated.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One broadcast received on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

/// A live channel subscription. Dropping it unsubscribes.
pub struct BusSubscription {
    rx: mpsc::UnboundedReceiver<BusMessage>,
    cancel: CancellationToken,
}

impl BusSubscription {
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Broadcast-bus capability: named channels carrying tagged JSON events.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn subscribe(&self, channel: &str) -> anyhow::Result<BusSubscription>;
    async fn publish(&self, channel: &str, event: &str, payload: Value) -> anyhow::Result<()>;
}

// -- NATS backend -------------------------------------------------------------

/// NATS-backed bus. Channel names map to subjects with `:` folded to `.`
/// so `user:u1:agents` becomes `user.u1.agents`.
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(url: &str, token: Option<&str>) -> anyhow::Result<Self> {
        let client = match token {
            Some(token) => {
                async_nats::ConnectOptions::new()
                    .token(token.to_owned())
                    .connect(url)
                    .await?
            }
            None => async_nats::connect(url).await?,
        };
        Ok(Self { client })
    }

    fn subject(channel: &str) -> String {
        channel.replace(':', ".")
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn subscribe(&self, channel: &str) -> anyhow::Result<BusSubscription> {
        let mut subscriber = self.client.subscribe(Self::subject(channel)).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let channel = channel.to_owned();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    msg = subscriber.next() => {
                        let Some(msg) = msg else { break };
                        match serde_json::from_slice::<BusMessage>(&msg.payload) {
                            Ok(parsed) => {
                                if tx.send(parsed).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(channel = %channel, err = %e, "dropping malformed bus payload");
                            }
                        }
                    }
                }
            }
            let _ = subscriber.unsubscribe().await;
        });

        Ok(BusSubscription { rx, cancel })
    }

    async fn publish(&self, channel: &str, event: &str, payload: Value) -> anyhow::Result<()> {
        let body = serde_json::to_vec(&BusMessage { event: event.to_owned(), payload })?;
        self.client.publish(Self::subject(channel), body.into()).await?;
        Ok(())
    }
}

// -- In-memory backend --------------------------------------------------------

/// Process-local bus for tests and single-host setups.
#[derive(Default)]
pub struct MemoryBus {
    channels: Mutex<HashMap<String, broadcast::Sender<BusMessage>>>,
}

impl MemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<BusMessage> {
        self.channels
            .lock()
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn subscribe(&self, channel: &str) -> anyhow::Result<BusSubscription> {
        let mut source = self.sender(channel).subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let child = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    msg = source.recv() => {
                        match msg {
                            Ok(msg) => {
                                if tx.send(msg).is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                debug!(skipped = n, "memory bus subscriber lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });

        Ok(BusSubscription { rx, cancel })
    }

    async fn publish(&self, channel: &str, event: &str, payload: Value) -> anyhow::Result<()> {
        let _ = self.sender(channel).send(BusMessage { event: event.to_owned(), payload });
        Ok(())
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
