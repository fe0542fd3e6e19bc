// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry capability: how a deployed agent advertises itself so
//! browser clients can find it. The JSON-file backend below is the
//! in-tree implementation; network-backed registries plug in through the
//! same trait.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fields supplied when registering an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub name: String,
    pub public_url: String,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

/// A registered agent as stored by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    #[serde(flatten)]
    pub registration: AgentRegistration,
    pub last_heartbeat_ms: i64,
}

/// Registry capability consumed by the agent core.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn register(&self, registration: AgentRegistration) -> anyhow::Result<AgentInfo>;
    async fn heartbeat(&self, id: &str) -> anyhow::Result<()>;
    async fn unregister(&self, id: &str) -> anyhow::Result<()>;
    async fn list_by_owner(&self, owner_id: &str) -> anyhow::Result<Vec<AgentInfo>>;
    async fn get(&self, id: &str) -> anyhow::Result<Option<AgentInfo>>;
}

/// JSON-file registry (`VP_REGISTRY_PATH`), suitable for a single host or
/// a shared filesystem.
pub struct FileRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path, lock: Mutex::new(()) }
    }

    fn read_all(&self) -> Vec<AgentInfo> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    fn write_all(&self, agents: &[AgentInfo]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(agents)?)?;
        Ok(())
    }
}

#[async_trait]
impl Registry for FileRegistry {
    async fn register(&self, registration: AgentRegistration) -> anyhow::Result<AgentInfo> {
        let _guard = self.lock.lock();
        let mut agents = self.read_all();
        let info = AgentInfo {
            id: uuid::Uuid::new_v4().to_string(),
            registration,
            last_heartbeat_ms: vibepilot_protocol::envelope::now_ms(),
        };
        // One entry per (owner, name): re-registration replaces.
        agents.retain(|a| {
            a.registration.owner_id != info.registration.owner_id
                || a.registration.name != info.registration.name
        });
        agents.push(info.clone());
        self.write_all(&agents)?;
        Ok(info)
    }

    async fn heartbeat(&self, id: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock();
        let mut agents = self.read_all();
        let Some(agent) = agents.iter_mut().find(|a| a.id == id) else {
            anyhow::bail!("agent {id} not registered");
        };
        agent.last_heartbeat_ms = vibepilot_protocol::envelope::now_ms();
        self.write_all(&agents)
    }

    async fn unregister(&self, id: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock();
        let mut agents = self.read_all();
        agents.retain(|a| a.id != id);
        self.write_all(&agents)
    }

    async fn list_by_owner(&self, owner_id: &str) -> anyhow::Result<Vec<AgentInfo>> {
        Ok(self
            .read_all()
            .into_iter()
            .filter(|a| a.registration.owner_id == owner_id)
            .collect())
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<AgentInfo>> {
        Ok(self.read_all().into_iter().find(|a| a.id == id))
    }
}

/// Heartbeat every 30 s until shutdown. Failures are logged and swallowed
/// — a missed beat must never take the agent down.
pub fn spawn_heartbeat(
    registry: std::sync::Arc<dyn Registry>,
    agent_id: String,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    match registry.heartbeat(&agent_id).await {
                        Ok(()) => debug!(agent = %agent_id, "heartbeat"),
                        Err(e) => warn!(agent = %agent_id, err = %e, "heartbeat failed"),
                    }
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
