// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container lifecycle management.
//!
//! Runs execute inside sandboxed containers named after their run id and
//! tagged with ownership labels, so a restarted daemon can always map a
//! container back to its run (or recognise it as an orphan).

mod docker;
mod http;

pub use docker::DockerManager;

use agd_core::{ProjectId, RepoId, RunId, SandboxProfile, TaskId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Label marking every container this platform owns.
pub const PLATFORM_LABEL: &str = "agd.platform";
pub const RUN_ID_LABEL: &str = "agd.run-id";
pub const TASK_ID_LABEL: &str = "agd.task-id";
pub const REPO_ID_LABEL: &str = "agd.repo-id";
pub const PROJECT_ID_LABEL: &str = "agd.project-id";

/// Mount point of the run workspace inside the container.
pub const WORKSPACE_MOUNT: &str = "/workspace";

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container api error: {0}")]
    Api(String),

    #[error("container {0:?} not found")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything needed to create one run container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub repo_id: RepoId,
    pub project_id: ProjectId,
    pub image: String,
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    /// Host path bind-mounted at [`WORKSPACE_MOUNT`].
    pub workspace_host_path: PathBuf,
    pub sandbox: SandboxProfile,
}

impl ContainerSpec {
    /// Container name: the run id itself, which already carries the `run-`
    /// prefix.
    pub fn container_name(&self) -> &str {
        self.run_id.as_str()
    }

    /// Mandatory ownership labels plus the platform marker.
    pub fn labels(&self) -> HashMap<String, String> {
        HashMap::from([
            (PLATFORM_LABEL.to_string(), "1".to_string()),
            (RUN_ID_LABEL.to_string(), self.run_id.to_string()),
            (TASK_ID_LABEL.to_string(), self.task_id.to_string()),
            (REPO_ID_LABEL.to_string(), self.repo_id.to_string()),
            (PROJECT_ID_LABEL.to_string(), self.project_id.to_string()),
        ])
    }
}

/// A container carrying the platform label, as seen by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformContainer {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub running: bool,
}

impl PlatformContainer {
    pub fn run_id(&self) -> Option<RunId> {
        self.labels.get(RUN_ID_LABEL).map(RunId::from_string)
    }
}

/// Container host operations used by the engine.
#[async_trait]
pub trait ContainerManager: Send + Sync {
    /// Create and start a run container. Returns the container id.
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, ContainerError>;

    /// Graceful teardown: SIGTERM, wait up to `grace`, SIGKILL, remove.
    async fn stop_and_remove(&self, name: &str, grace: Duration) -> Result<(), ContainerError>;

    /// Containers carrying the platform label, running or not.
    async fn list_platform_containers(&self) -> Result<Vec<PlatformContainer>, ContainerError>;
}

/// In-memory container manager for tests.
#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct FakeContainerManager {
        inner: Mutex<FakeState>,
    }

    #[derive(Default)]
    struct FakeState {
        containers: Vec<PlatformContainer>,
        started: Vec<String>,
        stopped: Vec<String>,
        fail_create: bool,
    }

    impl FakeContainerManager {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-seed a container, as if left over from a previous daemon.
        pub fn seed(&self, container: PlatformContainer) {
            self.inner.lock().containers.push(container);
        }

        pub fn fail_next_create(&self) {
            self.inner.lock().fail_create = true;
        }

        pub fn started(&self) -> Vec<String> {
            self.inner.lock().started.clone()
        }

        pub fn stopped(&self) -> Vec<String> {
            self.inner.lock().stopped.clone()
        }
    }

    #[async_trait]
    impl ContainerManager for FakeContainerManager {
        async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, ContainerError> {
            let mut state = self.inner.lock();
            if state.fail_create {
                state.fail_create = false;
                return Err(ContainerError::Api("injected create failure".to_string()));
            }
            let name = spec.container_name().to_string();
            state.started.push(name.clone());
            state.containers.push(PlatformContainer {
                name: name.clone(),
                labels: spec.labels(),
                running: true,
            });
            Ok(name)
        }

        async fn stop_and_remove(&self, name: &str, _grace: Duration) -> Result<(), ContainerError> {
            let mut state = self.inner.lock();
            state.stopped.push(name.to_string());
            state.containers.retain(|c| c.name != name);
            Ok(())
        }

        async fn list_platform_containers(
            &self,
        ) -> Result<Vec<PlatformContainer>, ContainerError> {
            Ok(self.inner.lock().containers.clone())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeContainerManager;

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            run_id: "run-abc".into(),
            task_id: "tsk-t".into(),
            repo_id: "rep-r".into(),
            project_id: "prj-p".into(),
            image: "harness:codex".to_string(),
            command: vec!["codex".to_string()],
            env: HashMap::new(),
            workspace_host_path: PathBuf::from("/srv/workspaces/run-abc"),
            sandbox: SandboxProfile::default(),
        }
    }

    #[test]
    fn container_name_is_the_run_id() {
        assert_eq!(spec().container_name(), "run-abc");
        assert!(spec().container_name().starts_with("run-"));
    }

    #[test]
    fn labels_carry_full_ownership() {
        let labels = spec().labels();
        assert_eq!(labels.get(PLATFORM_LABEL).map(String::as_str), Some("1"));
        assert_eq!(labels.get(RUN_ID_LABEL).map(String::as_str), Some("run-abc"));
        assert_eq!(labels.get(TASK_ID_LABEL).map(String::as_str), Some("tsk-t"));
        assert_eq!(labels.get(REPO_ID_LABEL).map(String::as_str), Some("rep-r"));
        assert_eq!(labels.get(PROJECT_ID_LABEL).map(String::as_str), Some("prj-p"));
    }

    #[tokio::test]
    async fn fake_manager_tracks_lifecycle() {
        let manager = FakeContainerManager::new();
        manager.create_and_start(&spec()).await.unwrap();
        assert_eq!(manager.list_platform_containers().await.unwrap().len(), 1);

        manager.stop_and_remove("run-abc", Duration::from_secs(1)).await.unwrap();
        assert!(manager.list_platform_containers().await.unwrap().is_empty());
        assert_eq!(manager.stopped(), vec!["run-abc"]);
    }
}
