// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent project list. A project switch re-roots the file services
//! and restarts the watcher; the list itself lives in a JSON file under
//! the agent state directory.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use vibepilot_protocol::messages::Project;

use crate::error::ErrorCode;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProjectFile {
    projects: Vec<Project>,
    current_project_id: Option<String>,
}

/// The persistent project list.
pub struct ProjectStore {
    path: PathBuf,
    state: Mutex<ProjectFile>,
}

impl ProjectStore {
    /// Load the store from `path`, starting empty if the file is missing
    /// or unreadable.
    pub fn load(path: PathBuf) -> Self {
        let state = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self { path, state: Mutex::new(state) }
    }

    pub fn list(&self) -> (Vec<Project>, Option<String>) {
        let state = self.state.lock();
        (state.projects.clone(), state.current_project_id.clone())
    }

    /// Register a project root. The path must exist; the first project
    /// added becomes current.
    pub fn add(&self, name: &str, path: &str) -> Result<Project, ErrorCode> {
        let dir = Path::new(path);
        if !dir.is_dir() {
            return Err(ErrorCode::IoError);
        }
        let project = Project {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_owned(),
            path: path.to_owned(),
        };
        {
            let mut state = self.state.lock();
            if state.projects.iter().any(|p| p.path == path) {
                return Err(ErrorCode::BadRequest);
            }
            state.projects.push(project.clone());
            if state.current_project_id.is_none() {
                state.current_project_id = Some(project.id.clone());
            }
        }
        self.persist();
        Ok(project)
    }

    pub fn remove(&self, project_id: &str) -> Result<(), ErrorCode> {
        {
            let mut state = self.state.lock();
            let before = state.projects.len();
            state.projects.retain(|p| p.id != project_id);
            if state.projects.len() == before {
                return Err(ErrorCode::BadRequest);
            }
            if state.current_project_id.as_deref() == Some(project_id) {
                state.current_project_id = state.projects.first().map(|p| p.id.clone());
            }
        }
        self.persist();
        Ok(())
    }

    /// Apply a partial update (`name` and/or `path`).
    pub fn update(&self, project_id: &str, updates: &serde_json::Value) -> Result<Project, ErrorCode> {
        let updated = {
            let mut state = self.state.lock();
            let project = state
                .projects
                .iter_mut()
                .find(|p| p.id == project_id)
                .ok_or(ErrorCode::BadRequest)?;
            if let Some(name) = updates.get("name").and_then(|v| v.as_str()) {
                project.name = name.to_owned();
            }
            if let Some(path) = updates.get("path").and_then(|v| v.as_str()) {
                if !Path::new(path).is_dir() {
                    return Err(ErrorCode::IoError);
                }
                project.path = path.to_owned();
            }
            project.clone()
        };
        self.persist();
        Ok(updated)
    }

    /// Make a project current, returning its root for re-rooting the file
    /// services.
    pub fn switch(&self, project_id: &str) -> Result<PathBuf, ErrorCode> {
        let root = {
            let mut state = self.state.lock();
            let project = state
                .projects
                .iter()
                .find(|p| p.id == project_id)
                .ok_or(ErrorCode::BadRequest)?;
            let root = PathBuf::from(&project.path);
            state.current_project_id = Some(project_id.to_owned());
            root
        };
        if !root.is_dir() {
            return Err(ErrorCode::IoError);
        }
        self.persist();
        Ok(root)
    }

    pub fn current_root(&self) -> Option<PathBuf> {
        let state = self.state.lock();
        let id = state.current_project_id.as_deref()?;
        state.projects.iter().find(|p| p.id == id).map(|p| PathBuf::from(&p.path))
    }

    fn persist(&self) {
        let text = {
            let state = self.state.lock();
            serde_json::to_string_pretty(&*state).unwrap_or_default()
        };
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.path, text) {
            warn!(path = %self.path.display(), err = %e, "failed to persist project list");
        }
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
