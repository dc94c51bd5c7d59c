// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon assembly: lock file, store replay, recovery, loop spawning.

use crate::config::DaemonConfig;
use agd_core::SystemClock;
use agd_engine::alerts::AlertEvaluator;
use agd_engine::pruner::Pruner;
use agd_engine::webhook::WebhookDispatcher;
use agd_engine::workflow::WorkflowExecutor;
use agd_engine::{
    recovery, Dispatcher, DispatcherConfig, EventPipeline, ProxyRouteManager, RuntimeFactory,
    Scheduler,
};
use agd_harness::container::{ContainerManager, DockerManager};
use agd_storage::Store;
use fs2::FileExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("another daemon already holds {0}")]
    AlreadyRunning(std::path::PathBuf),

    #[error(transparent)]
    Storage(#[from] agd_storage::StorageError),

    #[error(transparent)]
    Engine(#[from] agd_engine::EngineError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fully assembled daemon state.
pub struct Daemon {
    pub config: DaemonConfig,
    pub store: Arc<Store>,
    pub dispatcher: Arc<Dispatcher<SystemClock>>,
    pub pipeline: Arc<EventPipeline<SystemClock>>,
    pub scheduler: Arc<Scheduler<SystemClock>>,
    pub webhooks: Arc<WebhookDispatcher<SystemClock>>,
    pub workflows: Arc<WorkflowExecutor<SystemClock>>,
    pub proxy: Arc<ProxyRouteManager<SystemClock>>,
    pub alerts: Arc<AlertEvaluator<SystemClock>>,
    pub pruner: Arc<Pruner<SystemClock>>,
    pub containers: Option<Arc<dyn ContainerManager>>,
    pub started_at: Instant,
    shutdown: CancellationToken,
    // Held for the process lifetime; the lock releases on drop.
    _lock_file: std::fs::File,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").finish_non_exhaustive()
    }
}

impl Daemon {
    /// Bootstrap: lock the state dir, replay the store, reconcile the
    /// container host, re-arm the scheduler.
    pub async fn bootstrap(config: DaemonConfig) -> Result<Self, DaemonError> {
        std::fs::create_dir_all(&config.state_dir)?;
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(config.lock_path())?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(DaemonError::AlreadyRunning(config.lock_path()));
        }

        let clock = SystemClock;
        let store = Arc::new(Store::open(&config.store_dir())?);

        let containers: Option<Arc<dyn ContainerManager>> = if config.containers_enabled() {
            Some(Arc::new(DockerManager::new(config.docker_socket.clone())))
        } else {
            info!("container isolation disabled, harnesses run on the host");
            None
        };

        let proxy = Arc::new(ProxyRouteManager::new(store.clone(), clock.clone()));
        let pipeline = Arc::new(EventPipeline::new(store.clone(), clock.clone()));
        let factory: RuntimeFactory = Arc::new(|harness| agd_harness::runtime_for(harness));
        let dispatcher_config = DispatcherConfig {
            global_cap: config.global_cap,
            per_project_cap: config.per_project_cap,
            per_repo_cap: config.per_repo_cap,
            per_task_cap: config.per_task_cap,
            container_grace: Duration::from_secs(config.grace_secs),
            workspace_root: config.workspace_dir(),
            artifact_root: config.artifact_dir(),
            ..DispatcherConfig::default()
        };
        let mut dispatcher = Dispatcher::new(
            store.clone(),
            pipeline.clone(),
            factory,
            clock.clone(),
            dispatcher_config,
        )
        .with_proxy(proxy.clone());
        if let Some(containers) = &containers {
            dispatcher = dispatcher.with_containers(containers.clone());
        }
        let dispatcher = Arc::new(dispatcher);

        let scheduler =
            Arc::new(Scheduler::new(store.clone(), dispatcher.clone(), clock.clone()));
        let webhooks =
            Arc::new(WebhookDispatcher::new(store.clone(), dispatcher.clone(), clock.clone()));
        let workflows =
            Arc::new(WorkflowExecutor::new(store.clone(), dispatcher.clone(), clock.clone()));
        let alerts = Arc::new(
            AlertEvaluator::new(store.clone(), clock.clone())
                .with_proxy(proxy.clone())
                .with_desktop_notifications(config.desktop_notifications),
        );
        let pruner = Arc::new(
            Pruner::new(store.clone(), clock.clone()).with_retention(config.retention()),
        );

        // Recovery before any loop starts: fail dead runs, sweep orphans.
        let report = recovery::reconcile(&store, containers.as_ref(), &clock).await?;
        info!(
            relinked = report.runs_relinked,
            failed = report.runs_failed,
            orphans = report.orphans_removed,
            "startup reconciliation"
        );
        let armed = scheduler.arm_cron_tasks()?;
        if armed > 0 {
            info!(armed, "cron tasks armed");
        }

        Ok(Self {
            config,
            store,
            dispatcher,
            pipeline,
            scheduler,
            webhooks,
            workflows,
            proxy,
            alerts,
            pruner,
            containers,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
            _lock_file: lock_file,
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Launch the periodic loops.
    pub fn spawn_loops(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        handles.push(tokio::spawn(self.scheduler.clone().run_loop(
            Duration::from_secs(self.config.scheduler_tick_secs),
            self.shutdown.clone(),
        )));
        handles.push(tokio::spawn(self.proxy.clone().run_sweeper(
            Duration::from_secs(self.config.proxy_sweep_secs),
            self.shutdown.clone(),
        )));
        handles.push(tokio::spawn(self.alerts.clone().run_loop(
            Duration::from_secs(self.config.alert_tick_secs),
            self.shutdown.clone(),
        )));
        handles.push(tokio::spawn(self.pruner.clone().run_loop(
            Duration::from_secs(self.config.prune_cadence_secs),
            self.shutdown.clone(),
        )));
        handles
    }

    /// Cancel every scope token.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.dispatcher.shutdown();
    }

    /// Final persistence work after the loops drain.
    pub fn finalize(&self) -> Result<(), DaemonError> {
        self.store.compact()?;
        let _ = std::fs::remove_file(self.config.socket_path());
        Ok(())
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
