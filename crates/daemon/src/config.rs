// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: TOML file plus environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default state directory under the platform state dir.
fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("agd")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Root for the WAL, snapshots, artifacts, and the IPC socket.
    pub state_dir: PathBuf,
    /// Webhook HTTP bind address; empty disables the listener.
    pub webhook_bind: String,
    /// Docker Engine socket; empty disables container isolation (harness
    /// processes run directly on the host, for development).
    pub docker_socket: PathBuf,
    pub scheduler_tick_secs: u64,
    pub alert_tick_secs: u64,
    pub proxy_sweep_secs: u64,
    pub prune_cadence_secs: u64,
    pub retention_days: u64,
    pub global_cap: usize,
    pub per_project_cap: usize,
    pub per_repo_cap: usize,
    pub per_task_cap: usize,
    /// Grace window for shutdown and container teardown.
    pub grace_secs: u64,
    pub desktop_notifications: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            webhook_bind: "127.0.0.1:8844".to_string(),
            docker_socket: PathBuf::from("/var/run/docker.sock"),
            scheduler_tick_secs: 10,
            alert_tick_secs: 30,
            proxy_sweep_secs: 60,
            prune_cadence_secs: 3_600,
            retention_days: 30,
            global_cap: 16,
            per_project_cap: 8,
            per_repo_cap: 1,
            per_task_cap: 1,
            grace_secs: 10,
            desktop_notifications: false,
        }
    }
}

impl DaemonConfig {
    /// Load from `~/.config/agd/config.toml` (or `AGD_CONFIG`), then apply
    /// environment overrides. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os("AGD_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join("agd/config.toml")));
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read { path: path.to_path_buf(), source: e })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("AGD_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Ok(bind) = std::env::var("AGD_WEBHOOK_BIND") {
            self.webhook_bind = bind;
        }
        if let Ok(socket) = std::env::var("AGD_DOCKER_SOCKET") {
            self.docker_socket = PathBuf::from(socket);
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("agdd.sock")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("agdd.lock")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.state_dir.join("store")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.state_dir.join("artifacts")
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.state_dir.join("workspaces")
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }

    pub fn containers_enabled(&self) -> bool {
        !self.docker_socket.as_os_str().is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("cannot parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
