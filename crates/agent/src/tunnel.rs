// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-client reverse proxy into locally-listening dev servers. Requests
//! and responses ride the envelope layer, correlated by `requestId`; the
//! proxy itself speaks plain HTTP to `127.0.0.1:<port>`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vibepilot_protocol::AgentEvent;

use crate::error::ErrorCode;

/// Ceiling on a single proxied exchange; responses are buffered whole.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Headers that must not cross the proxy in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

struct Tunnel {
    target_host: String,
    target_port: u16,
    cancel: CancellationToken,
}

/// An incoming `tunnel:request`, already decoded from the envelope.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub tunnel_id: String,
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

/// All tunnels owned by one client.
pub struct TunnelProxy {
    tunnels: Mutex<HashMap<String, Arc<Tunnel>>>,
    http: reqwest::Client,
    outbound: mpsc::UnboundedSender<AgentEvent>,
}

/// `reqwest`'s `rustls-no-provider` feature requires the process to install
/// a crypto provider before building any TLS-capable client.
fn ensure_crypto_provider() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

impl TunnelProxy {
    pub fn new(outbound: mpsc::UnboundedSender<AgentEvent>) -> Self {
        ensure_crypto_provider();
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()
            .unwrap_or_default();
        Self { tunnels: Mutex::new(HashMap::new()), http, outbound }
    }

    /// Register a tunnel. Duplicate ids fail; the old tunnel stays open.
    pub fn open(
        &self,
        tunnel_id: &str,
        target_port: u16,
        target_host: Option<String>,
    ) -> Result<(), ErrorCode> {
        let mut tunnels = self.tunnels.lock();
        if tunnels.contains_key(tunnel_id) {
            return Err(ErrorCode::TunnelExists);
        }
        tunnels.insert(
            tunnel_id.to_owned(),
            Arc::new(Tunnel {
                target_host: target_host.unwrap_or_else(|| "127.0.0.1".to_owned()),
                target_port,
                cancel: CancellationToken::new(),
            }),
        );
        debug!(tunnel = tunnel_id, port = target_port, "tunnel opened");
        Ok(())
    }

    /// Close a tunnel, rejecting every in-flight request with
    /// `TunnelClosed`.
    pub fn close(&self, tunnel_id: &str) -> Result<(), ErrorCode> {
        let tunnel =
            self.tunnels.lock().remove(tunnel_id).ok_or(ErrorCode::TunnelNotOpen)?;
        tunnel.cancel.cancel();
        debug!(tunnel = tunnel_id, "tunnel closed");
        Ok(())
    }

    /// Close everything (client disconnect).
    pub fn close_all(&self) {
        for (_, tunnel) in self.tunnels.lock().drain() {
            tunnel.cancel.cancel();
        }
    }

    /// Forward one request. Resolution is exactly-once: the spawned task
    /// emits either `tunnel:response` or `tunnel:error` for this
    /// `requestId`, never both.
    pub fn forward(&self, request: ForwardRequest) -> Result<(), ErrorCode> {
        let tunnel = self
            .tunnels
            .lock()
            .get(&request.tunnel_id)
            .cloned()
            .ok_or(ErrorCode::TunnelNotOpen)?;

        let http = self.http.clone();
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            let event = tokio::select! {
                _ = tunnel.cancel.cancelled() => AgentEvent::TunnelError {
                    tunnel_id: request.tunnel_id.clone(),
                    request_id: Some(request.request_id.clone()),
                    code: ErrorCode::TunnelClosed.as_str().to_owned(),
                    message: "tunnel closed".to_owned(),
                },
                result = proxy_once(&http, &tunnel, &request) => match result {
                    Ok(event) => event,
                    Err((code, message)) => AgentEvent::TunnelError {
                        tunnel_id: request.tunnel_id.clone(),
                        request_id: Some(request.request_id.clone()),
                        code: code.as_str().to_owned(),
                        message,
                    },
                },
            };
            let _ = outbound.send(event);
        });
        Ok(())
    }

    pub fn is_open(&self, tunnel_id: &str) -> bool {
        self.tunnels.lock().contains_key(tunnel_id)
    }
}

/// Perform the upstream HTTP exchange and build the response event.
async fn proxy_once(
    http: &reqwest::Client,
    tunnel: &Tunnel,
    request: &ForwardRequest,
) -> Result<AgentEvent, (ErrorCode, String)> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|_| (ErrorCode::BadRequest, format!("bad method {}", request.method)))?;
    let url = format!("http://{}:{}{}", tunnel.target_host, tunnel.target_port, request.path);

    let mut builder = http.request(method, &url);
    for (name, value) in &request.headers {
        if HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(ref body) = request.body {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body)
            .map_err(|_| (ErrorCode::BadRequest, "body is not base64".to_owned()))?;
        builder = builder.body(bytes);
    }

    let response = builder.send().await.map_err(|e| {
        let code = if e.is_connect() {
            ErrorCode::UpstreamUnreachable
        } else {
            ErrorCode::Internal
        };
        warn!(tunnel = %request.tunnel_id, err = %e, "upstream request failed");
        (code, e.to_string())
    })?;

    let status = response.status().as_u16();
    let mut headers = BTreeMap::new();
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.to_string(), value.to_owned());
        }
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| (ErrorCode::UpstreamUnreachable, e.to_string()))?;
    let body = if bytes.is_empty() {
        None
    } else {
        Some(base64::engine::general_purpose::STANDARD.encode(&bytes))
    };

    Ok(AgentEvent::TunnelResponse {
        tunnel_id: request.tunnel_id.clone(),
        request_id: request.request_id.clone(),
        status,
        headers,
        body,
    })
}

#[cfg(test)]
#[path = "tunnel_tests.rs"]
mod tests;
