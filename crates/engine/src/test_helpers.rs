// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::pipeline::EventPipeline;
use agd_core::{FakeClock, Project, ProjectId, Repository, Task};
use agd_harness::container::FakeContainerManager;
use agd_harness::HarnessRuntime;
use agd_storage::Store;
use std::sync::Arc;
use std::time::Duration;

pub struct TestEngine {
    pub store: Arc<Store>,
    pub dispatcher: Arc<Dispatcher<FakeClock>>,
    pub pipeline: Arc<EventPipeline<FakeClock>>,
    pub containers: Arc<FakeContainerManager>,
    pub clock: FakeClock,
}

/// Dispatcher config with short waits so deferral tests finish quickly.
pub fn fast_config() -> DispatcherConfig {
    DispatcherConfig {
        defer_delay: Duration::from_millis(25),
        jitter_ms: 10,
        container_grace: Duration::from_millis(50),
        ..DispatcherConfig::default()
    }
}

/// Engine wired to a fake container manager and the given runtime for
/// every harness tag.
pub fn engine_with_runtime(
    runtime: Arc<dyn HarnessRuntime>,
    config: DispatcherConfig,
) -> TestEngine {
    let store = Arc::new(Store::in_memory());
    let clock = FakeClock::new();
    let pipeline = Arc::new(EventPipeline::new(store.clone(), clock.clone()));
    let containers = Arc::new(FakeContainerManager::new());
    let factory: crate::dispatcher::RuntimeFactory = {
        let runtime = runtime.clone();
        Arc::new(move |_| runtime.clone())
    };
    let dispatcher = Arc::new(
        Dispatcher::new(store.clone(), pipeline.clone(), factory, clock.clone(), config)
            .with_containers(containers.clone()),
    );
    TestEngine { store, dispatcher, pipeline, containers, clock }
}

/// Seed a project + repository and return the repository.
pub fn seed_repo(store: &Store) -> Repository {
    let project = Project {
        id: ProjectId::from_string("prj-test0001"),
        name: "test project".to_string(),
        created_at_ms: 1,
    };
    store.upsert_project(project).unwrap();
    let repo = Repository::builder().build();
    store.upsert_repository(repo.clone()).unwrap();
    repo
}

/// Seed a repository plus the given task.
pub fn seed_task(store: &Store, task: Task) -> Task {
    seed_repo(store);
    store.upsert_task(task.clone()).unwrap();
    task
}

/// Await a run reaching a terminal state, with a wall-clock guard.
pub async fn wait_terminal(store: &Store, run_id: &agd_core::RunId) -> agd_core::Run {
    for _ in 0..400 {
        if let Some(run) = store.get_run(run_id) {
            if run.is_terminal() {
                return run;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} did not reach a terminal state");
}
