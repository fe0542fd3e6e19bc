// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser child lifecycle: binary probing, per-project profiles, and
//! inspector endpoint discovery from the child's stderr.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ErrorCode;

/// How long the child has to announce its inspector endpoint.
const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(10);

/// Candidate binaries, most specific first.
#[cfg(target_os = "macos")]
const BINARY_CANDIDATES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(not(target_os = "macos"))]
const BINARY_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

/// Locate a usable browser binary, honoring `VP_BROWSER_PATH` first.
pub fn probe_binary() -> Result<PathBuf, ErrorCode> {
    if let Ok(path) = std::env::var("VP_BROWSER_PATH") {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
    }
    for candidate in BINARY_CANDIDATES {
        let path = Path::new(candidate);
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
    }
    Err(ErrorCode::BrowserBinaryNotFound)
}

/// Create (or reuse) a profile directory, clearing any stale singleton
/// lock left by a crashed child.
pub fn prepare_profile(dir: &Path) -> Result<PathBuf, ErrorCode> {
    std::fs::create_dir_all(dir).map_err(|_| ErrorCode::LaunchFailed)?;
    for lock in ["SingletonLock", "SingletonSocket", "SingletonCookie"] {
        let path = dir.join(lock);
        if path.exists() {
            let _ = std::fs::remove_file(&path);
            debug!(lock = %path.display(), "removed stale profile lock");
        }
    }
    Ok(dir.to_path_buf())
}

/// Pick a random inspector port in `[9222, 59222)`.
pub fn random_debug_port() -> u16 {
    rand::rng().random_range(9222..59222)
}

/// A launched browser child plus its discovered inspector endpoint.
pub struct LaunchedBrowser {
    pub child: Child,
    pub endpoint: String,
    pub port: u16,
    pub profile_dir: PathBuf,
}

/// Spawn the browser headless and scrape the DevTools endpoint from its
/// stderr.
pub async fn launch(
    binary: &Path,
    profile_dir: &Path,
    port: u16,
    width: u32,
    height: u32,
) -> Result<LaunchedBrowser, ErrorCode> {
    let mut child = Command::new(binary)
        .arg("--headless=new")
        .arg(format!("--remote-debugging-port={port}"))
        .arg(format!("--user-data-dir={}", profile_dir.display()))
        .arg(format!("--window-size={width},{height}"))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu")
        .arg("about:blank")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(false)
        .spawn()
        .map_err(|e| {
            warn!(err = %e, "browser spawn failed");
            ErrorCode::LaunchFailed
        })?;

    let stderr = child.stderr.take().ok_or(ErrorCode::LaunchFailed)?;
    let endpoint = match tokio::time::timeout(ENDPOINT_TIMEOUT, scrape_endpoint(stderr)).await {
        Ok(Some(endpoint)) => endpoint,
        Ok(None) => {
            let _ = child.start_kill();
            return Err(ErrorCode::LaunchFailed);
        }
        Err(_) => {
            let _ = child.start_kill();
            return Err(ErrorCode::InspectorTimeout);
        }
    };

    debug!(endpoint = %endpoint, port, "browser launched");
    Ok(LaunchedBrowser { child, endpoint, port, profile_dir: profile_dir.to_path_buf() })
}

/// Read stderr lines until the DevTools banner shows up.
async fn scrape_endpoint(stderr: tokio::process::ChildStderr) -> Option<String> {
    // The banner format is stable across Chrome/Chromium releases.
    let pattern = Regex::new(r"DevTools listening on (ws://\S+)").ok()?;
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(captures) = pattern.captures(&line) {
            return captures.get(1).map(|m| m.as_str().to_owned());
        }
    }
    None
}

/// The bridge config file other host tooling reads to find the running
/// browser. Written on start, removed on stop.
pub fn bridge_config_path() -> PathBuf {
    Config::state_dir().join("browser-bridge.json")
}

pub fn write_bridge_config(project_id: &str, endpoint: &str, port: u16) {
    let path = bridge_config_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let body = serde_json::json!({
        "projectId": project_id,
        "endpoint": endpoint,
        "port": port,
    });
    if let Err(e) = std::fs::write(&path, body.to_string()) {
        warn!(path = %path.display(), err = %e, "bridge config write failed");
    }
}

pub fn remove_bridge_config() {
    let _ = std::fs::remove_file(bridge_config_path());
}

#[cfg(test)]
#[path = "launch_tests.rs"]
mod tests;
