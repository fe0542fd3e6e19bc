// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end agent tests.
//!
//! Spawns the real `vibepilot` binary as a subprocess and talks to it
//! over the reliable-stream WebSocket, exactly as a browser client would.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use vibepilot_protocol::{AgentEvent, ClientRequest, Envelope};

/// Resolve the path to the compiled `vibepilot` binary.
pub fn agent_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("vibepilot")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running agent process, killed on drop. The home and project root
/// are hermetic temp directories.
pub struct AgentProcess {
    child: Child,
    port: u16,
    pub project_root: PathBuf,
    _dirs: Vec<tempfile::TempDir>,
}

impl AgentProcess {
    /// Spawn the agent with an optional bearer token.
    pub fn start(token: Option<&str>) -> anyhow::Result<Self> {
        let binary = agent_binary();
        anyhow::ensure!(binary.exists(), "vibepilot binary not found at {}", binary.display());

        let home = tempfile::tempdir()?;
        let project = tempfile::tempdir()?;
        let port = free_port()?;

        let mut command = Command::new(&binary);
        command
            .arg("serve")
            .env("PORT", port.to_string())
            .env("VP_HOST", "127.0.0.1")
            .env("HOME", home.path())
            .env("VP_PROJECT_ROOT", project.path())
            .env("VP_LOG_LEVEL", "warn")
            .env_remove("VP_TOKEN")
            .env_remove("VP_REGISTRY_PATH")
            .env_remove("VP_SUPABASE_URL")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(token) = token {
            command.env("VP_TOKEN", token);
        }
        let child = command.spawn()?;

        Ok(Self {
            child,
            port,
            project_root: project.path().to_path_buf(),
            _dirs: vec![home, project],
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ws_url(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://127.0.0.1:{}/ws?token={token}", self.port),
            None => format!("ws://127.0.0.1:{}/ws", self.port),
        }
    }

    /// Poll the health endpoint until the agent answers.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let url = format!("http://127.0.0.1:{}/healthz", self.port);
        let client = reqwest::Client::new();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("agent did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// A connected protocol client.
pub struct WsClient {
    tx: WsSink,
    rx: WsSource,
}

impl WsClient {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (tx, rx) = stream.split();
        Ok(Self { tx, rx })
    }

    /// Frame and send a request the way the browser client does.
    pub async fn send(&mut self, request: &ClientRequest) -> anyhow::Result<()> {
        let body = serde_json::to_value(request)?;
        let kind = body
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let payload = body
            .get("payload")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        let envelope = Envelope::new(kind, payload);
        self.send_raw(&envelope.encode()).await
    }

    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.tx.send(Message::Text(text.to_owned().into())).await?;
        Ok(())
    }

    /// Receive the next envelope, whatever its type.
    pub async fn recv_envelope(&mut self, timeout: Duration) -> anyhow::Result<Envelope> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let msg = tokio::time::timeout(remaining, self.rx.next())
                .await
                .map_err(|_| anyhow::anyhow!("timed out waiting for a message"))?;
            match msg {
                Some(Ok(Message::Text(text))) => return Envelope::decode(&text).map_err(Into::into),
                Some(Ok(_)) => continue,
                Some(Err(e)) => anyhow::bail!("ws error: {e}"),
                None => anyhow::bail!("connection closed"),
            }
        }
    }

    /// Receive until an event matching `matcher` arrives.
    pub async fn expect<T>(
        &mut self,
        timeout: Duration,
        matcher: impl Fn(&AgentEvent) -> Option<T>,
    ) -> anyhow::Result<T> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("expected event did not arrive within {timeout:?}");
            }
            let envelope = self.recv_envelope(remaining).await?;
            let body = serde_json::json!({"type": envelope.kind, "payload": envelope.payload});
            if let Ok(event) = serde_json::from_value::<AgentEvent>(body) {
                if let Some(found) = matcher(&event) {
                    return Ok(found);
                }
            }
        }
    }
}
