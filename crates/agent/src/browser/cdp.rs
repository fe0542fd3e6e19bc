// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal DevTools-protocol client: one WebSocket to the browser's
//! inspector endpoint, request/response correlation by call id, and an
//! event stream for everything else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// An inspector notification (or the connection ending).
#[derive(Debug, Clone)]
pub enum CdpEvent {
    Notification { method: String, params: Value },
    Disconnected,
}

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;

/// Handle to a live inspector connection.
pub struct CdpClient {
    out_tx: mpsc::UnboundedSender<String>,
    pending: Pending,
    next_id: AtomicU64,
}

impl CdpClient {
    /// Connect to a `ws://` inspector endpoint. Events arrive on the
    /// returned receiver; the reader task ends with a `Disconnected`
    /// event when the browser goes away.
    pub async fn connect(
        endpoint: &str,
    ) -> anyhow::Result<(Arc<Self>, mpsc::UnboundedReceiver<CdpEvent>)> {
        let (ws, _) = tokio_tungstenite::connect_async(endpoint).await?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        // Writer task.
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        // Reader task: resolve calls, forward notifications.
        {
            let pending = Arc::clone(&pending);
            tokio::spawn(async move {
                while let Some(msg) = ws_rx.next().await {
                    let text = match msg {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Close(_)) | Err(_) => break,
                        Ok(_) => continue,
                    };
                    let Ok(value) = serde_json::from_str::<Value>(&text) else {
                        warn!("unparseable inspector message");
                        continue;
                    };
                    if let Some(id) = value.get("id").and_then(Value::as_u64) {
                        let Some(reply) = pending.lock().remove(&id) else { continue };
                        let result = match value.get("error") {
                            Some(err) => Err(err
                                .get("message")
                                .and_then(Value::as_str)
                                .unwrap_or("inspector error")
                                .to_owned()),
                            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
                        };
                        let _ = reply.send(result);
                    } else if let Some(method) = value.get("method").and_then(Value::as_str) {
                        let params = value.get("params").cloned().unwrap_or(Value::Null);
                        if event_tx
                            .send(CdpEvent::Notification { method: method.to_owned(), params })
                            .is_err()
                        {
                            break;
                        }
                    }
                }
                // Flush waiters so calls fail fast instead of timing out.
                for (_, reply) in pending.lock().drain() {
                    let _ = reply.send(Err("inspector disconnected".to_owned()));
                }
                let _ = event_tx.send(CdpEvent::Disconnected);
                debug!("inspector connection closed");
            });
        }

        Ok((Arc::new(Self { out_tx, pending, next_id: AtomicU64::new(1) }), event_rx))
    }

    /// Issue one protocol call and await its result.
    pub async fn call(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let message = json!({ "id": id, "method": method, "params": params }).to_string();
        if self.out_tx.send(message).is_err() {
            self.pending.lock().remove(&id);
            anyhow::bail!("inspector connection closed");
        }

        let result = tokio::time::timeout(CALL_TIMEOUT, rx).await;
        match result {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => anyhow::bail!("{method}: {message}"),
            Ok(Err(_)) => anyhow::bail!("{method}: inspector dropped the call"),
            Err(_) => {
                self.pending.lock().remove(&id);
                anyhow::bail!("{method}: inspector call timed out")
            }
        }
    }

    /// Fire-and-forget call for paths where the result is irrelevant
    /// (frame acks, input bursts).
    pub fn call_detached(self: &Arc<Self>, method: &'static str, params: Value) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.call(method, params).await {
                debug!(method, err = %e, "detached inspector call failed");
            }
        });
    }
}
