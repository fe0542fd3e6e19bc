// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Host-side agent bridging a workstation to remote browser clients.
#[derive(Debug, Clone, Parser)]
#[command(name = "vibepilot", version, about)]
pub struct Config {
    /// TCP port for the reliable-stream transport.
    #[arg(long, env = "PORT", default_value = "9800")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "VP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bearer token clients must present on the WebSocket handshake.
    #[arg(long, env = "VP_TOKEN")]
    pub token: Option<String>,

    /// Human-readable agent name used for registry entries.
    #[arg(long, env = "VP_AGENT_NAME")]
    pub agent_name: Option<String>,

    /// Publicly reachable URL advertised to the registry.
    #[arg(long, env = "VP_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Path to the JSON-file agent registry.
    #[arg(long, env = "VP_REGISTRY_PATH")]
    pub registry_path: Option<PathBuf>,

    /// Rendezvous bus URL (NATS) for peer-to-peer signaling.
    #[arg(long, env = "VP_SUPABASE_URL")]
    pub bus_url: Option<String>,

    /// Rendezvous bus credential.
    #[arg(long, env = "VP_SUPABASE_KEY")]
    pub bus_key: Option<String>,

    /// Owner identity used for the presence channel name.
    #[arg(long, env = "VP_OWNER_ID")]
    pub owner_id: Option<String>,

    /// Orphaned-session TTL in seconds.
    #[arg(long, env = "SESSION_TIMEOUT", default_value = "300")]
    pub session_timeout: u64,

    /// Project root served by the file services until a project switch.
    #[arg(long, env = "VP_PROJECT_ROOT")]
    pub project_root: Option<PathBuf>,

    /// Replay buffer capacity per orphaned session, in bytes.
    #[arg(long, env = "VP_REPLAY_CAPACITY", default_value = "102400")]
    pub replay_capacity: usize,

    /// Browser idle shutdown after preview detach, in seconds.
    #[arg(long, env = "VP_BROWSER_IDLE_TIMEOUT", default_value = "600")]
    pub browser_idle_timeout: u64,

    /// Log format (json or text).
    #[arg(long, env = "VP_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "VP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_timeout)
    }

    pub fn browser_idle(&self) -> Duration {
        Duration::from_secs(self.browser_idle_timeout)
    }

    /// Reject nonsense combinations before startup.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.replay_capacity == 0 {
            anyhow::bail!("--replay-capacity must be positive");
        }
        if self.session_timeout == 0 {
            anyhow::bail!("--session-timeout must be positive");
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("--log-format must be json or text");
        }
        if self.bus_url.is_some() && self.owner_id.is_none() {
            anyhow::bail!("--owner-id is required when a bus URL is configured");
        }
        if let Some(ref root) = self.project_root {
            if !root.is_dir() {
                anyhow::bail!("project root {} is not a directory", root.display());
            }
        }
        Ok(())
    }

    /// The agent state directory (`~/.vibepilot`), created on demand.
    pub fn state_dir() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".vibepilot")
    }

    /// Per-project browser profile directory.
    pub fn browser_profile_dir(project_id: &str) -> PathBuf {
        Self::state_dir().join("browser-profiles").join(project_id)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
