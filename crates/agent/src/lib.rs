// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! vibepilot agent: a host-side bridge exposing this workstation's
//! shells, filesystem, and an embedded headless browser to remote
//! browser clients over a multiplexed message protocol.

pub mod auth;
pub mod browser;
pub mod bus;
pub mod config;
pub mod delegate;
pub mod error;
pub mod fs;
pub mod image;
pub mod peer;
pub mod project;
pub mod pty;
pub mod registry;
pub mod replay;
pub mod session;
pub mod signaling;
pub mod state;
pub mod transport;
pub mod tunnel;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::{AuthProvider, StaticTokenProvider};
use crate::browser::spawn_browser_service;
use crate::bus::{Bus, NatsBus};
use crate::config::Config;
use crate::fs::Workspace;
use crate::peer::WebRtcPeerFactory;
use crate::project::ProjectStore;
use crate::pty::PtyManager;
use crate::registry::{AgentRegistration, FileRegistry, Registry};
use crate::session::SessionPersistence;
use crate::signaling::SignalingCoordinator;
use crate::state::AgentState;
use crate::transport::peer_client::spawn_peer_client;

/// Run the agent until shutdown. Returns once every subsystem has been
/// torn down.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    // Core session machinery.
    let (pty, exit_rx) = PtyManager::new(config.replay_capacity);
    let persistence = SessionPersistence::new(Arc::clone(&pty), config.session_ttl());
    tokio::spawn(Arc::clone(&persistence).run(exit_rx, shutdown.clone()));

    // Workspace root: explicit flag, then the persisted current project,
    // then the launch directory.
    let projects = Arc::new(ProjectStore::load(Config::state_dir().join("projects.json")));
    let root = match config.project_root.clone().or_else(|| projects.current_root()) {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let workspace = Arc::new(Workspace::new(root.clone()));

    let browser = spawn_browser_service(config.browser_idle(), shutdown.clone());
    let auth: Option<Arc<dyn AuthProvider>> = config
        .token
        .as_deref()
        .map(|token| Arc::new(StaticTokenProvider::new(token)) as Arc<dyn AuthProvider>);

    let state = AgentState::new(
        config.clone(),
        shutdown.clone(),
        pty,
        persistence,
        workspace,
        Arc::clone(&projects),
        browser,
        auth,
        Arc::new(WebRtcPeerFactory),
    );
    state.reroot_watcher(root);

    // Registry: best-effort presence advertisement.
    let mut registered: Option<(Arc<dyn Registry>, String)> = None;
    if let Some(ref path) = config.registry_path {
        let registry: Arc<dyn Registry> = Arc::new(FileRegistry::new(path.clone()));
        let registration = AgentRegistration {
            name: config.agent_name.clone().unwrap_or_else(|| "vibepilot-agent".to_owned()),
            public_url: config
                .public_url
                .clone()
                .unwrap_or_else(|| format!("http://{}:{}", config.host, config.port)),
            owner_id: config.owner_id.clone().unwrap_or_default(),
            version: Some(env!("CARGO_PKG_VERSION").to_owned()),
            platform: Some(std::env::consts::OS.to_owned()),
            metadata: serde_json::Value::Null,
        };
        match registry.register(registration).await {
            Ok(agent) => {
                info!(agent = %agent.id, "registered with registry");
                registry::spawn_heartbeat(Arc::clone(&registry), agent.id.clone(), shutdown.clone());
                registered = Some((registry, agent.id));
            }
            Err(e) => warn!(err = %e, "registry registration failed"),
        }
    }

    // Rendezvous bus: out-of-band peer signaling.
    if let (Some(bus_url), Some(owner_id)) = (config.bus_url.clone(), config.owner_id.clone()) {
        match NatsBus::connect(&bus_url, config.bus_key.as_deref()).await {
            Ok(bus) => {
                let agent_id = registered
                    .as_ref()
                    .map(|(_, id)| id.clone())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let (handoff_tx, mut handoff_rx) = mpsc::unbounded_channel();
                let coordinator = SignalingCoordinator::new(
                    Arc::new(bus) as Arc<dyn Bus>,
                    Arc::new(WebRtcPeerFactory),
                    agent_id,
                    owner_id,
                    handoff_tx,
                );
                tokio::spawn(coordinator.run(shutdown.clone()));

                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    while let Some(handoff) = handoff_rx.recv().await {
                        spawn_peer_client(Arc::clone(&state), handoff.peer);
                    }
                });
            }
            Err(e) => warn!(err = %e, "rendezvous bus connect failed"),
        }
    }

    // Reliable-stream transport. A port conflict surfaces here and takes
    // the process down with a nonzero exit.
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "vibepilot agent listening");
    let router = transport::build_router(Arc::clone(&state));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    // Teardown: browser first (child process), then shells, then the
    // registry entry.
    state.browser.stop().await;
    state.pty.destroy_all();
    if let Some((registry, agent_id)) = registered {
        if let Err(e) = registry.unregister(&agent_id).await {
            warn!(err = %e, "unregister failed");
        }
    }
    info!("agent shut down cleanly");
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(term) => term,
                Err(e) => {
                    warn!(err = %e, "SIGTERM handler unavailable");
                    let _ = ctrl_c.await;
                    shutdown.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received");
        shutdown.cancel();
    });
}
