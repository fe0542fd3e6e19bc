// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Headless-browser control plane. The service is a single task driven by
//! a command queue; dispatchers hold a [`BrowserHandle`] and never touch
//! the browser state directly. Frames, cursor changes, and crashes flow
//! back through a broadcast channel to whichever client owns the stream.

pub mod cdp;
pub mod input;
pub mod launch;
pub mod quality;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::process::Child;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vibepilot_protocol::envelope::now_ms;
use vibepilot_protocol::messages::{BrowserInfo, BrowserInputEvent, FrameMetadata};

use crate::config::Config;
use crate::error::ErrorCode;

use cdp::{CdpClient, CdpEvent};
use quality::QualityController;

/// Grace between asking the child to quit and SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(5);
/// Bound on the `(frame timestamp -> sent at)` correlation map.
const MAX_FRAME_TIMESTAMPS: usize = 1000;

const DEFAULT_VIEWPORT: (u32, u32) = (1280, 720);

/// A browser failure carried back to the requesting client.
#[derive(Debug, Clone)]
pub struct BrowserError {
    pub code: ErrorCode,
    pub message: String,
}

impl BrowserError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Events broadcast to the stream owner.
#[derive(Debug, Clone)]
pub enum BrowserEvent {
    Frame { data: String, timestamp: i64, metadata: FrameMetadata },
    Cursor { cursor: String },
    Crash { code: Option<i32>, signal: Option<i32> },
    Error { code: ErrorCode, message: String },
    IdleShutdown,
    Stopped,
}

/// Parameters for `browser:start`.
#[derive(Debug, Clone, Default)]
pub struct StartOpts {
    pub project_id: Option<String>,
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

enum Command {
    Start { opts: StartOpts, reply: oneshot::Sender<Result<BrowserInfo, BrowserError>> },
    Stop { reply: oneshot::Sender<()> },
    Navigate { url: String, reply: oneshot::Sender<Result<String, BrowserError>> },
    Input { event: BrowserInputEvent },
    Resize { width: u32, height: u32, reply: oneshot::Sender<Result<(), BrowserError>> },
    AckFrame { timestamp: i64 },
    AttachPreview,
    DetachPreview,
}

enum Internal {
    LaunchDone(Box<Result<Launched, BrowserError>>),
    Cdp(CdpEvent),
    ChildExited { code: Option<i32>, signal: Option<i32> },
    IdleFire,
    CursorProbed { cursor: String },
}

/// Handle held by dispatchers; cheap to clone.
#[derive(Clone)]
pub struct BrowserHandle {
    cmd_tx: mpsc::Sender<Command>,
    events: broadcast::Sender<BrowserEvent>,
}

impl BrowserHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<BrowserEvent> {
        self.events.subscribe()
    }

    pub async fn start(&self, opts: StartOpts) -> Result<BrowserInfo, BrowserError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Start { opts, reply })
            .await
            .map_err(|_| BrowserError::new(ErrorCode::Internal, "browser service gone"))?;
        rx.await
            .map_err(|_| BrowserError::new(ErrorCode::Internal, "browser service dropped start"))?
    }

    pub async fn stop(&self) {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Stop { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn navigate(&self, url: String) -> Result<String, BrowserError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Navigate { url, reply })
            .await
            .map_err(|_| BrowserError::new(ErrorCode::Internal, "browser service gone"))?;
        rx.await
            .map_err(|_| BrowserError::new(ErrorCode::Internal, "browser service dropped call"))?
    }

    pub async fn input(&self, event: BrowserInputEvent) {
        let _ = self.cmd_tx.send(Command::Input { event }).await;
    }

    pub async fn resize(&self, width: u32, height: u32) -> Result<(), BrowserError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Resize { width, height, reply })
            .await
            .map_err(|_| BrowserError::new(ErrorCode::Internal, "browser service gone"))?;
        rx.await
            .map_err(|_| BrowserError::new(ErrorCode::Internal, "browser service dropped call"))?
    }

    pub async fn ack_frame(&self, timestamp: i64) {
        let _ = self.cmd_tx.send(Command::AckFrame { timestamp }).await;
    }

    pub async fn attach_preview(&self) {
        let _ = self.cmd_tx.send(Command::AttachPreview).await;
    }

    pub async fn detach_preview(&self) {
        let _ = self.cmd_tx.send(Command::DetachPreview).await;
    }
}

/// Spawn the singleton service task.
pub fn spawn_browser_service(idle_timeout: Duration, shutdown: CancellationToken) -> BrowserHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (events, _) = broadcast::channel(256);
    let handle = BrowserHandle { cmd_tx, events: events.clone() };
    tokio::spawn(service_loop(cmd_rx, events, idle_timeout, shutdown));
    handle
}

// -- Service internals --------------------------------------------------------

/// Everything the launch task hands back once the child is up and the
/// inspector is wired.
struct Launched {
    client: Arc<CdpClient>,
    child: Child,
    endpoint: String,
    project_id: String,
    viewport: (u32, u32),
    event_rx: Option<mpsc::UnboundedReceiver<CdpEvent>>,
}

struct Running {
    client: Arc<CdpClient>,
    endpoint: String,
    project_id: String,
    viewport: (u32, u32),
    screencast_running: bool,
    /// `frame timestamp -> sent at`, insertion-ordered for head eviction.
    frame_sent: HashMap<i64, Instant>,
    frame_order: VecDeque<i64>,
    last_frame_ts: i64,
    quality: QualityController,
    last_cursor: Option<String>,
    idle_cancel: Option<CancellationToken>,
    /// Cancelling this tells the child watcher the exit is intentional.
    stop_token: CancellationToken,
}

enum ServiceState {
    Stopped,
    Starting { waiters: Vec<oneshot::Sender<Result<BrowserInfo, BrowserError>>> },
    Running(Box<Running>),
}

async fn service_loop(
    mut cmd_rx: mpsc::Receiver<Command>,
    events: broadcast::Sender<BrowserEvent>,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) {
    let (internal_tx, mut internal_rx) = mpsc::unbounded_channel();
    let mut state = ServiceState::Stopped;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let ServiceState::Running(running) = state {
                    stop_running(*running, &events, false).await;
                }
                break;
            }
            command = cmd_rx.recv() => {
                let Some(command) = command else { break };
                state = handle_command(state, command, &events, &internal_tx, idle_timeout).await;
            }
            internal = internal_rx.recv() => {
                let Some(internal) = internal else { break };
                state = handle_internal(state, internal, &events, &internal_tx).await;
            }
        }
    }
}

async fn handle_command(
    state: ServiceState,
    command: Command,
    events: &broadcast::Sender<BrowserEvent>,
    internal_tx: &mpsc::UnboundedSender<Internal>,
    idle_timeout: Duration,
) -> ServiceState {
    match command {
        Command::Start { opts, reply } => handle_start(state, opts, reply, internal_tx).await,
        Command::Stop { reply } => {
            let next = match state {
                ServiceState::Running(running) => {
                    stop_running(*running, events, false).await;
                    ServiceState::Stopped
                }
                ServiceState::Starting { waiters } => {
                    // Cancels the start-in-flight from the waiters' view;
                    // the launch result is discarded on arrival.
                    for waiter in waiters {
                        let _ = waiter.send(Err(BrowserError::new(
                            ErrorCode::BrowserNotStarted,
                            "start cancelled by stop",
                        )));
                    }
                    ServiceState::Stopped
                }
                ServiceState::Stopped => ServiceState::Stopped,
            };
            let _ = reply.send(());
            next
        }
        Command::Navigate { url, reply } => {
            match state {
                ServiceState::Running(ref running) => {
                    let _ = reply.send(navigate(&running.client, &url).await);
                }
                _ => {
                    let _ = reply.send(Err(BrowserError::new(
                        ErrorCode::BrowserNotStarted,
                        "browser not started",
                    )));
                }
            }
            state
        }
        Command::Input { event } => {
            if let ServiceState::Running(ref running) = state {
                dispatch_input(running, &event, internal_tx);
            }
            state
        }
        Command::Resize { width, height, reply } => match state {
            ServiceState::Running(mut running) => {
                running.viewport = (width.max(1), height.max(1));
                let result = apply_viewport(&running.client, running.viewport).await;
                if result.is_ok() && running.screencast_running {
                    restart_screencast(&running).await;
                }
                let _ = reply.send(result.map_err(|e| {
                    BrowserError::new(ErrorCode::Internal, format!("viewport update failed: {e}"))
                }));
                ServiceState::Running(running)
            }
            other => {
                let _ = reply.send(Err(BrowserError::new(
                    ErrorCode::BrowserNotStarted,
                    "browser not started",
                )));
                other
            }
        },
        Command::AckFrame { timestamp } => match state {
            ServiceState::Running(mut running) => {
                ack_frame(&mut running, timestamp).await;
                ServiceState::Running(running)
            }
            other => other,
        },
        Command::DetachPreview => match state {
            ServiceState::Running(mut running) => {
                if running.screencast_running {
                    running.client.call_detached("Page.stopScreencast", json!({}));
                    running.screencast_running = false;
                }
                let cancel = CancellationToken::new();
                running.idle_cancel = Some(cancel.clone());
                let internal_tx = internal_tx.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(idle_timeout) => {
                            let _ = internal_tx.send(Internal::IdleFire);
                        }
                    }
                });
                debug!("preview detached, idle timer armed");
                ServiceState::Running(running)
            }
            other => other,
        },
        Command::AttachPreview => match state {
            ServiceState::Running(mut running) => {
                if let Some(cancel) = running.idle_cancel.take() {
                    cancel.cancel();
                }
                if !running.screencast_running {
                    start_screencast(&running.client, running.quality.quality(), running.viewport)
                        .await;
                    running.screencast_running = true;
                }
                ServiceState::Running(running)
            }
            other => other,
        },
    }
}

async fn handle_start(
    state: ServiceState,
    opts: StartOpts,
    reply: oneshot::Sender<Result<BrowserInfo, BrowserError>>,
    internal_tx: &mpsc::UnboundedSender<Internal>,
) -> ServiceState {
    // Scheme screening happens before anything is spawned.
    if let Some(ref url) = opts.url {
        if !scheme_allowed(url) {
            let _ = reply.send(Err(BrowserError::new(
                ErrorCode::SchemeBlocked,
                format!("scheme not allowed: {url}"),
            )));
            return state;
        }
    }

    match state {
        ServiceState::Running(mut running) => {
            // Re-attach semantics: cached info, screencast revived if a
            // previous owner detached it.
            if let Some(cancel) = running.idle_cancel.take() {
                cancel.cancel();
            }
            if !running.screencast_running {
                start_screencast(&running.client, running.quality.quality(), running.viewport)
                    .await;
                running.screencast_running = true;
            }
            let _ = reply.send(Ok(info_of(&running)));
            ServiceState::Running(running)
        }
        ServiceState::Starting { mut waiters } => {
            // Coalesce: everyone waits on the same in-flight launch.
            waiters.push(reply);
            ServiceState::Starting { waiters }
        }
        ServiceState::Stopped => {
            let internal_tx = internal_tx.clone();
            tokio::spawn(async move {
                let result = launch_browser(opts).await;
                let _ = internal_tx.send(Internal::LaunchDone(Box::new(result)));
            });
            ServiceState::Starting { waiters: vec![reply] }
        }
    }
}

async fn handle_internal(
    state: ServiceState,
    internal: Internal,
    events: &broadcast::Sender<BrowserEvent>,
    internal_tx: &mpsc::UnboundedSender<Internal>,
) -> ServiceState {
    match internal {
        Internal::LaunchDone(result) => {
            let ServiceState::Starting { waiters } = state else {
                // Stopped while launching: tear the stray child down.
                if let Ok(launched) = *result {
                    stop_running(running_from(launched, internal_tx), events, false).await;
                }
                return state;
            };
            match *result {
                Ok(launched) => {
                    let running = running_from(launched, internal_tx);
                    let info = info_of(&running);
                    info!(endpoint = %running.endpoint, "browser running");
                    for waiter in waiters {
                        let _ = waiter.send(Ok(info.clone()));
                    }
                    ServiceState::Running(Box::new(running))
                }
                Err(error) => {
                    warn!(code = %error.code, msg = %error.message, "browser start failed");
                    for waiter in waiters {
                        let _ = waiter.send(Err(error.clone()));
                    }
                    ServiceState::Stopped
                }
            }
        }
        Internal::Cdp(CdpEvent::Notification { method, params }) => match state {
            ServiceState::Running(mut running) => {
                if method == "Page.screencastFrame" {
                    handle_frame(&mut running, params, events);
                }
                ServiceState::Running(running)
            }
            other => other,
        },
        Internal::Cdp(CdpEvent::Disconnected) => match state {
            ServiceState::Running(running) => {
                warn!("inspector connection lost");
                if let Some(cancel) = running.idle_cancel {
                    cancel.cancel();
                }
                running.stop_token.cancel();
                launch::remove_bridge_config();
                let _ = events.send(BrowserEvent::Error {
                    code: ErrorCode::CdpConnectionLost,
                    message: "inspector connection lost".to_owned(),
                });
                ServiceState::Stopped
            }
            other => other,
        },
        Internal::ChildExited { code, signal } => match state {
            ServiceState::Running(running) => {
                warn!(?code, ?signal, "browser child exited unexpectedly");
                if let Some(cancel) = running.idle_cancel {
                    cancel.cancel();
                }
                launch::remove_bridge_config();
                let _ = events.send(BrowserEvent::Crash { code, signal });
                ServiceState::Stopped
            }
            other => other,
        },
        Internal::IdleFire => match state {
            ServiceState::Running(running) => {
                info!("idle shutdown");
                stop_running(*running, events, true).await;
                ServiceState::Stopped
            }
            other => other,
        },
        Internal::CursorProbed { cursor } => match state {
            ServiceState::Running(mut running) => {
                if running.last_cursor.as_deref() != Some(cursor.as_str()) {
                    running.last_cursor = Some(cursor.clone());
                    let _ = events.send(BrowserEvent::Cursor { cursor });
                }
                ServiceState::Running(running)
            }
            other => other,
        },
    }
}

// -- Steps --------------------------------------------------------------------

/// Launch the child, connect the inspector, and wire the page domain.
async fn launch_browser(opts: StartOpts) -> Result<Launched, BrowserError> {
    let project_id = opts.project_id.unwrap_or_else(|| "default".to_owned());
    let viewport = (
        opts.width.unwrap_or(DEFAULT_VIEWPORT.0).max(1),
        opts.height.unwrap_or(DEFAULT_VIEWPORT.1).max(1),
    );

    let binary = launch::probe_binary()
        .map_err(|code| BrowserError::new(code, "no browser binary found"))?;
    let profile = launch::prepare_profile(&Config::browser_profile_dir(&project_id))
        .map_err(|code| BrowserError::new(code, "profile directory unavailable"))?;
    let port = launch::random_debug_port();

    let launched = launch::launch(&binary, &profile, port, viewport.0, viewport.1)
        .await
        .map_err(|code| BrowserError::new(code, "browser launch failed"))?;

    let (client, event_rx) = CdpClient::connect(&launched.endpoint).await.map_err(|e| {
        BrowserError::new(ErrorCode::LaunchFailed, format!("inspector connect failed: {e}"))
    })?;

    client
        .call("Page.enable", json!({}))
        .await
        .map_err(|e| BrowserError::new(ErrorCode::LaunchFailed, e.to_string()))?;
    apply_viewport(&client, viewport)
        .await
        .map_err(|e| BrowserError::new(ErrorCode::LaunchFailed, e.to_string()))?;

    if let Some(url) = opts.url {
        navigate(&client, &url).await.map_err(|e| {
            BrowserError::new(ErrorCode::NavigateFailed, format!("initial navigate: {}", e.message))
        })?;
    }

    launch::write_bridge_config(&project_id, &launched.endpoint, launched.port);

    Ok(Launched {
        client,
        child: launched.child,
        endpoint: launched.endpoint,
        project_id,
        viewport,
        event_rx: Some(event_rx),
    })
}

/// Promote a launch result into running state: start the screencast,
/// watch the child, bridge inspector events into the service loop.
fn running_from(mut launched: Launched, internal_tx: &mpsc::UnboundedSender<Internal>) -> Running {
    let stop_token = CancellationToken::new();

    // Bridge inspector events.
    if let Some(mut event_rx) = launched.event_rx.take() {
        let internal_tx = internal_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let disconnect = matches!(event, CdpEvent::Disconnected);
                if internal_tx.send(Internal::Cdp(event)).is_err() || disconnect {
                    break;
                }
            }
        });
    }

    // Watch the child: unexpected exit is a crash, cancellation means an
    // intentional stop (grace, then SIGKILL).
    {
        let mut child = launched.child;
        let stop_token = stop_token.clone();
        let internal_tx = internal_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let (code, signal) = match status {
                        Ok(status) => (status.code(), exit_signal(&status)),
                        Err(_) => (None, None),
                    };
                    let _ = internal_tx.send(Internal::ChildExited { code, signal });
                }
                _ = stop_token.cancelled() => {
                    if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_err() {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                    }
                }
            }
        });
    }

    let quality = QualityController::new();
    let running = Running {
        client: launched.client,
        endpoint: launched.endpoint,
        project_id: launched.project_id,
        viewport: launched.viewport,
        screencast_running: true,
        frame_sent: HashMap::new(),
        frame_order: VecDeque::new(),
        last_frame_ts: 0,
        quality,
        last_cursor: None,
        idle_cancel: None,
        stop_token,
    };
    // First screencast start is fire-and-forget; frames begin whenever
    // the page produces them.
    let client = Arc::clone(&running.client);
    let q = running.quality.quality();
    let viewport = running.viewport;
    tokio::spawn(async move {
        start_screencast(&client, q, viewport).await;
    });
    running
}

/// Full stop: best-effort inspector teardown, then child shutdown with
/// grace. Every step runs even when earlier ones fail.
async fn stop_running(running: Running, events: &broadcast::Sender<BrowserEvent>, idle: bool) {
    if let Some(cancel) = running.idle_cancel {
        cancel.cancel();
    }
    if running.screencast_running {
        if let Err(e) = running.client.call("Page.stopScreencast", json!({})).await {
            debug!(err = %e, "stopScreencast during stop");
        }
    }
    if let Err(e) = running.client.call("Browser.close", json!({})).await {
        debug!(err = %e, "Browser.close during stop");
    }
    // Hands the child to the watcher's grace-then-SIGKILL path.
    running.stop_token.cancel();
    launch::remove_bridge_config();

    if idle {
        let _ = events.send(BrowserEvent::IdleShutdown);
    }
    let _ = events.send(BrowserEvent::Stopped);
    info!(project = %running.project_id, "browser stopped");
}

fn info_of(running: &Running) -> BrowserInfo {
    BrowserInfo {
        running: true,
        endpoint: Some(running.endpoint.clone()),
        viewport_width: running.viewport.0,
        viewport_height: running.viewport.1,
    }
}

fn scheme_allowed(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

async fn navigate(client: &Arc<CdpClient>, url: &str) -> Result<String, BrowserError> {
    if !scheme_allowed(url) {
        return Err(BrowserError::new(
            ErrorCode::NavigateFailed,
            format!("scheme not allowed: {url}"),
        ));
    }
    let result = client
        .call("Page.navigate", json!({ "url": url }))
        .await
        .map_err(|e| BrowserError::new(ErrorCode::NavigateFailed, e.to_string()))?;
    if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
        if !error_text.is_empty() {
            return Err(BrowserError::new(ErrorCode::NavigateFailed, error_text.to_owned()));
        }
    }
    Ok(url.to_owned())
}

async fn apply_viewport(client: &Arc<CdpClient>, viewport: (u32, u32)) -> anyhow::Result<()> {
    client
        .call(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": viewport.0,
                "height": viewport.1,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
        )
        .await?;
    Ok(())
}

async fn start_screencast(client: &Arc<CdpClient>, quality: u8, viewport: (u32, u32)) {
    let params = json!({
        "format": "jpeg",
        "quality": quality,
        "maxWidth": viewport.0,
        "maxHeight": viewport.1,
        "everyNthFrame": 1,
    });
    if let Err(e) = client.call("Page.startScreencast", params).await {
        warn!(err = %e, "startScreencast failed");
    }
}

async fn restart_screencast(running: &Running) {
    if let Err(e) = running.client.call("Page.stopScreencast", json!({})).await {
        debug!(err = %e, "stopScreencast before restart");
    }
    start_screencast(&running.client, running.quality.quality(), running.viewport).await;
}

/// One inspector screencast frame: ack it, stamp it, record it, emit it.
fn handle_frame(running: &mut Running, params: Value, events: &broadcast::Sender<BrowserEvent>) {
    if let Some(session_id) = params.get("sessionId").and_then(Value::as_i64) {
        running
            .client
            .call_detached("Page.screencastFrameAck", json!({ "sessionId": session_id }));
    }
    let Some(data) = params.get("data").and_then(Value::as_str) else { return };

    // Strictly increasing stamps even when frames land within one ms.
    let timestamp = now_ms().max(running.last_frame_ts + 1);
    running.last_frame_ts = timestamp;

    running.frame_sent.insert(timestamp, Instant::now());
    running.frame_order.push_back(timestamp);
    while running.frame_order.len() > MAX_FRAME_TIMESTAMPS {
        if let Some(evicted) = running.frame_order.pop_front() {
            running.frame_sent.remove(&evicted);
        }
    }

    let meta = params.get("metadata").cloned().unwrap_or(Value::Null);
    let metadata = FrameMetadata {
        device_width: meta.get("deviceWidth").and_then(Value::as_u64).unwrap_or(0) as u32,
        device_height: meta.get("deviceHeight").and_then(Value::as_u64).unwrap_or(0) as u32,
        page_scale_factor: meta.get("pageScaleFactor").and_then(Value::as_f64).unwrap_or(1.0),
        offset_top: meta.get("offsetTop").and_then(Value::as_f64).unwrap_or(0.0),
        scroll_offset_x: meta.get("scrollOffsetX").and_then(Value::as_f64).unwrap_or(0.0),
        scroll_offset_y: meta.get("scrollOffsetY").and_then(Value::as_f64).unwrap_or(0.0),
    };
    let _ = events.send(BrowserEvent::Frame { data: data.to_owned(), timestamp, metadata });
}

/// Record an ack RTT; restart the screencast when the controller moves.
async fn ack_frame(running: &mut Running, timestamp: i64) {
    let Some(sent_at) = running.frame_sent.remove(&timestamp) else { return };
    let rtt_ms = sent_at.elapsed().as_millis() as u64;
    if let Some(new_quality) = running.quality.record(rtt_ms) {
        debug!(quality = new_quality, rtt_ms, "screencast quality adjusted");
        if running.screencast_running {
            restart_screencast(running).await;
        }
    }
}

/// Forward an input event to the inspector, plus the cursor probe for
/// mouse moves.
fn dispatch_input(
    running: &Running,
    event: &BrowserInputEvent,
    internal_tx: &mpsc::UnboundedSender<Internal>,
) {
    let (width, height) = running.viewport;
    if let Some(call) = input::translate(event, width, height) {
        running.client.call_detached(call.method, call.params);
    }
    if input::wants_cursor_probe(event) {
        let (x, y) = input::clamp(
            event.x.unwrap_or(0.0),
            event.y.unwrap_or(0.0),
            width,
            height,
        );
        let client = Arc::clone(&running.client);
        let internal_tx = internal_tx.clone();
        tokio::spawn(async move {
            let expression = input::cursor_probe_expression(x, y);
            let params = json!({ "expression": expression, "returnByValue": true });
            match client.call("Runtime.evaluate", params).await {
                Ok(result) => {
                    if let Some(cursor) = result
                        .get("result")
                        .and_then(|r| r.get("value"))
                        .and_then(Value::as_str)
                    {
                        let _ = internal_tx
                            .send(Internal::CursorProbed { cursor: cursor.to_owned() });
                    }
                }
                Err(e) => debug!(err = %e, "cursor probe failed"),
            }
        });
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
