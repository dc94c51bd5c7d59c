// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker Engine API implementation of the container manager.

use super::http;
use super::{
    ContainerError, ContainerManager, ContainerSpec, PlatformContainer, PLATFORM_LABEL,
    WORKSPACE_MOUNT,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_SOCKET: &str = "/var/run/docker.sock";
const API_PREFIX: &str = "/v1.41";

/// Container manager over the Docker Engine Unix socket.
pub struct DockerManager {
    socket: PathBuf,
}

impl Default for DockerManager {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_SOCKET))
    }
}

impl DockerManager {
    pub fn new(socket: PathBuf) -> Self {
        Self { socket }
    }

    /// Docker create-container body for a spec.
    ///
    /// Sandbox mapping: CPU limit → `NanoCpus`, memory → `Memory`,
    /// network-disabled → `NetworkMode: none`, read-only-root-fs →
    /// `ReadonlyRootfs`. The workspace binds read-write at
    /// [`WORKSPACE_MOUNT`].
    pub(crate) fn create_body(spec: &ContainerSpec) -> serde_json::Value {
        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut host_config = serde_json::json!({
            "NanoCpus": (spec.sandbox.cpu_limit * 1e9) as i64,
            "Memory": spec.sandbox.memory_bytes,
            "ReadonlyRootfs": spec.sandbox.read_only_rootfs,
            "Binds": [format!("{}:{}", spec.workspace_host_path.display(), WORKSPACE_MOUNT)],
        });
        if spec.sandbox.network_disabled {
            host_config["NetworkMode"] = serde_json::json!("none");
        }
        serde_json::json!({
            "Image": spec.image,
            "Cmd": spec.command,
            "Env": env,
            "Labels": spec.labels(),
            "WorkingDir": WORKSPACE_MOUNT,
            "HostConfig": host_config,
        })
    }
}

#[async_trait]
impl ContainerManager for DockerManager {
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, ContainerError> {
        let name = spec.container_name();
        let body = Self::create_body(spec).to_string();
        let response = http::post(
            &self.socket,
            &format!("{API_PREFIX}/containers/create?name={name}"),
            &body,
        )
        .await?;
        let id = serde_json::from_str::<serde_json::Value>(&response)
            .ok()
            .and_then(|v| v.get("Id").and_then(|id| id.as_str()).map(str::to_string))
            .unwrap_or_else(|| name.to_string());

        http::post(&self.socket, &format!("{API_PREFIX}/containers/{name}/start"), "").await?;
        info!(container = name, image = %spec.image, "container started");
        Ok(id)
    }

    async fn stop_and_remove(&self, name: &str, grace: Duration) -> Result<(), ContainerError> {
        // `stop` is SIGTERM, then SIGKILL after `t` seconds.
        let grace_secs = grace.as_secs().max(1);
        let stop =
            http::post(&self.socket, &format!("{API_PREFIX}/containers/{name}/stop?t={grace_secs}"), "")
                .await;
        match stop {
            Ok(_) => {}
            // 304 Not Modified (already stopped) surfaces as an Api error
            // string; 404 means it is already gone.
            Err(ContainerError::NotFound(_)) => return Ok(()),
            Err(e) => {
                warn!(container = name, error = %e, "stop failed, escalating to kill");
                let _ = http::post(
                    &self.socket,
                    &format!("{API_PREFIX}/containers/{name}/kill"),
                    "",
                )
                .await;
            }
        }

        match http::delete(&self.socket, &format!("{API_PREFIX}/containers/{name}?force=true")).await
        {
            Ok(_) | Err(ContainerError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_platform_containers(&self) -> Result<Vec<PlatformContainer>, ContainerError> {
        let filter = format!("{{\"label\":[\"{PLATFORM_LABEL}=1\"]}}");
        let path = format!(
            "{API_PREFIX}/containers/json?all=true&filters={}",
            http::encode_query(&filter)
        );
        let response = http::get(&self.socket, &path).await?;
        let rows: Vec<serde_json::Value> = serde_json::from_str(&response)
            .map_err(|e| ContainerError::Api(format!("malformed container list: {e}")))?;

        let mut containers = Vec::with_capacity(rows.len());
        for row in rows {
            let name = row
                .get("Names")
                .and_then(|n| n.as_array())
                .and_then(|n| n.first())
                .and_then(|n| n.as_str())
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default();
            let labels = row
                .get("Labels")
                .and_then(|l| l.as_object())
                .map(|l| {
                    l.iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            let running =
                row.get("State").and_then(|s| s.as_str()).map(|s| s == "running").unwrap_or(false);
            containers.push(PlatformContainer { name, labels, running });
        }
        Ok(containers)
    }
}
