// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level scenarios: the end-to-end behaviours the platform
//! guarantees, exercised in-process against fake container and harness
//! adapters and a controllable clock.

use agd_core::{
    ExecutionMode, FakeClock, Project, ProjectId, Repository, RouteOwnership, RunState, Task,
    TaskKind,
};
use agd_engine::pruner::Pruner;
use agd_engine::{
    DispatchOutcome, Dispatcher, DispatcherConfig, EventPipeline, ProxyRouteManager,
    RuntimeFactory, Scheduler,
};
use agd_harness::container::FakeContainerManager;
use agd_harness::{HarnessRuntime, ScriptedRuntime};
use agd_storage::Store;
use std::sync::Arc;
use std::time::Duration;

struct World {
    store: Arc<Store>,
    dispatcher: Arc<Dispatcher<FakeClock>>,
    containers: Arc<FakeContainerManager>,
    clock: FakeClock,
}

fn world(runtime: Arc<dyn HarnessRuntime>, config: DispatcherConfig) -> World {
    let store = Arc::new(Store::in_memory());
    let clock = FakeClock::new();
    let pipeline = Arc::new(EventPipeline::new(store.clone(), clock.clone()));
    let containers = Arc::new(FakeContainerManager::new());
    let factory: RuntimeFactory = Arc::new(move |_| runtime.clone());
    let dispatcher = Arc::new(
        Dispatcher::new(store.clone(), pipeline, factory, clock.clone(), config)
            .with_containers(containers.clone()),
    );
    World { store, dispatcher, containers, clock }
}

fn fast_config() -> DispatcherConfig {
    DispatcherConfig {
        defer_delay: Duration::from_millis(25),
        jitter_ms: 10,
        ..DispatcherConfig::default()
    }
}

fn seed_repo(store: &Store) -> Repository {
    store
        .upsert_project(Project {
            id: ProjectId::from_string("prj-test0001"),
            name: "specs".to_string(),
            created_at_ms: 1,
        })
        .unwrap();
    let repo = Repository::builder().build();
    store.upsert_repository(repo.clone()).unwrap();
    repo
}

async fn wait_terminal(store: &Store, run_id: &agd_core::RunId) -> agd_core::Run {
    for _ in 0..500 {
        if let Some(run) = store.get_run(run_id) {
            if run.is_terminal() {
                return run;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} never reached a terminal state");
}

/// Scenario 1: a manually triggered one-shot task runs queued → running →
/// succeeded with a matching completion event and no retries.
#[tokio::test]
async fn one_shot_happy_path() {
    let world = world(
        Arc::new(ScriptedRuntime::succeeding(
            vec![
                agd_wire::WireEvent::new(1, "reasoning_delta", "about to echo").to_line(),
                agd_wire::WireEvent::new(2, "run_completed", "{\"summary\":\"hi\"}").to_line(),
            ],
            "hi",
        )),
        fast_config(),
    );
    seed_repo(&world.store);
    let task = Task::builder().prompt("echo hi").command("/bin/echo hi").harness("codex").build();
    world.store.upsert_task(task.clone()).unwrap();

    let DispatchOutcome::Started(run_id) =
        world.dispatcher.dispatch(task.id, None, 1).await.unwrap()
    else {
        panic!("expected an immediate start");
    };

    let run = wait_terminal(&world.store, &run_id).await;
    assert_eq!(run.state, RunState::Succeeded);
    assert_eq!(run.summary.as_deref(), Some("hi"));
    assert!(run.envelope.is_some());

    let events = world.store.structured_events(&run_id, 0);
    let completed: Vec<_> = events
        .iter()
        .filter(|e| e.category == agd_core::EventCategory::RunCompleted)
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].payload["summary"], "hi");

    // Sequence monotonicity.
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    let mut sorted = sequences.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sequences, sorted);

    // No retries: exactly one run.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(world.store.list_runs(Some(&task.id), 0).len(), 1);
}

/// Scenario 2: cron fires stay on exact minute boundaries even when the
/// scheduler observes them late.
#[tokio::test]
async fn cron_fires_are_drift_free() {
    const T0: u64 = 1_709_287_200_000; // 2024-03-01T10:00:00Z
    let world = world(
        Arc::new(ScriptedRuntime::succeeding(Vec::new(), "tick")),
        fast_config(),
    );
    world.clock.set_epoch_ms(T0);
    seed_repo(&world.store);
    let task = Task::builder()
        .id("tsk-cron")
        .kind(TaskKind::Cron)
        .cron_expr("*/1 * * * *")
        .build();
    world.store.upsert_task(task.clone()).unwrap();

    let scheduler =
        Scheduler::new(world.store.clone(), world.dispatcher.clone(), world.clock.clone());
    // First fire armed at T0 itself.
    world.store.set_task_schedule(task.id, Some(T0)).unwrap();

    // Ticks at T+0, T+61s, T+122s.
    assert_eq!(scheduler.tick().await, 1);
    world.clock.set_epoch_ms(T0 + 61_000);
    assert_eq!(scheduler.tick().await, 1);
    world.clock.set_epoch_ms(T0 + 122_000);
    assert_eq!(scheduler.tick().await, 1);

    // Exactly three dispatches; every fire chained from its predecessor,
    // so the next one sits on the T+180s boundary despite the late ticks.
    let next = world.store.get_task(&task.id).unwrap().next_scheduled_at_ms.unwrap();
    assert_eq!(next, T0 + 180_000);
    assert_eq!(world.store.list_runs(Some(&task.id), 0).len(), 3);
}

/// Scenario 3: per-repo cap 1 admits one of five dispatches; the rest
/// defer and eventually all five succeed.
#[tokio::test]
async fn concurrency_cap_defers_and_drains() {
    let world = world(
        Arc::new(ScriptedRuntime {
            chunks: vec!["working".to_string()],
            outcome: ScriptedRuntime::succeeding(Vec::new(), "done").outcome,
            chunk_delay: Duration::from_millis(100),
        }),
        fast_config(),
    );
    seed_repo(&world.store);
    let mut task_ids = Vec::new();
    for i in 0..5 {
        let task = Task::builder().id(format!("tsk-cap{i}")).build();
        world.store.upsert_task(task.clone()).unwrap();
        task_ids.push(task.id);
    }

    let mut started = 0;
    let mut deferred = 0;
    for task_id in &task_ids {
        match world.dispatcher.dispatch(*task_id, None, 1).await.unwrap() {
            DispatchOutcome::Started(_) => started += 1,
            DispatchOutcome::Deferred { .. } => deferred += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(deferred, 4);

    for _ in 0..800 {
        let runs = world.store.list_runs(None, 0);
        if runs.len() == 5 && runs.iter().all(|r| r.state == RunState::Succeeded) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let runs = world.store.list_runs(None, 0);
    assert_eq!(runs.len(), 5);
    assert!(runs.iter().all(|r| r.state == RunState::Succeeded));

    // The cap was obeyed throughout: every run got its own container and
    // each was torn down before the next began.
    assert_eq!(world.containers.started().len(), 5);
    assert_eq!(world.containers.stopped().len(), 5);
}

/// Scenario 4: plan mode prepends the read-only directive and denies the
/// mutating tools; the workspace is untouched.
#[tokio::test]
async fn plan_mode_denies_writes() {
    use agd_harness::{policy_for, READ_ONLY_DIRECTIVE};

    let workspace = tempfile::tempdir().unwrap();
    std::fs::write(workspace.path().join("before.txt"), "untouched").unwrap();

    // Policy layer: plan denies edit and bash.
    let policy = policy_for(ExecutionMode::Plan, "codex", &std::collections::HashMap::new());
    assert!(policy.denies("edit"));
    assert!(policy.denies("bash"));
    assert_eq!(policy.system_prompt_prefix.as_deref(), Some(READ_ONLY_DIRECTIVE));

    // End to end through the real subprocess runtime: the harness sees the
    // directive ahead of the prompt.
    use agd_harness::{RunRequest, SubprocessRuntime};
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    let request = RunRequest {
        run_id: "run-plan".into(),
        harness: "zai".to_string(),
        prompt: "describe the repo".to_string(),
        command: "/bin/echo".to_string(),
        custom_args: Vec::new(),
        mode: ExecutionMode::Plan,
        env: std::collections::HashMap::new(),
        workspace: workspace.path().to_path_buf(),
        timeout: Duration::from_secs(5),
        endpoint: None,
    };
    let outcome = SubprocessRuntime
        .run(request, tx, tokio_util::sync::CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.envelope.is_success());
    let echoed = rx.recv().await.unwrap();
    assert!(echoed.starts_with("Do not modify files."));
    assert!(echoed.ends_with("describe the repo"));

    // Nothing in the workspace changed.
    assert_eq!(
        std::fs::read_to_string(workspace.path().join("before.txt")).unwrap(),
        "untouched"
    );
    assert_eq!(std::fs::read_dir(workspace.path()).unwrap().count(), 1);
}

/// Scenario 5: a run-owned route with a 5s TTL is gone after 10s, and its
/// hits left audit records.
#[tokio::test]
async fn proxy_ttl_evicts_and_audits() {
    let store = Arc::new(Store::in_memory());
    let clock = FakeClock::new();
    let proxy = ProxyRouteManager::new(store.clone(), clock.clone());

    proxy
        .upsert(
            "run-ABC",
            "/runs/ABC/*",
            "http://127.0.0.1:4020",
            Some(Duration::from_secs(5)),
            RouteOwnership::for_run("run-ABC".into(), "tsk-t".into(), "rep-r".into()),
        )
        .unwrap();
    proxy.record_hit("run-ABC", "/runs/ABC/live", Duration::from_millis(7));

    clock.advance(Duration::from_secs(10));
    proxy.sweep();

    let (snapshot, _) = proxy.snapshot();
    assert!(snapshot.get("run-ABC").is_none());
    assert!(snapshot.match_path("/runs/ABC/live").is_none());

    let audits = store.proxy_audits();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].route_id, "run-ABC");
}

/// Scenario 6: the pruner deletes the terminal run's structured rows and
/// preserves the active run's, even with a far-future cutoff.
#[tokio::test]
async fn retention_excludes_active_runs() {
    let store = Arc::new(Store::in_memory());
    let clock = FakeClock::new();
    clock.set_epoch_ms(10_000_000);

    let mut old = agd_core::Run::builder().id("run-done").task_id("tsk-t1").build();
    old.transition(RunState::Running, 1_000).unwrap();
    old.transition(RunState::Succeeded, 2_000).unwrap();
    store.create_run(old).unwrap();

    let mut live = agd_core::Run::builder().id("run-live").task_id("tsk-t1").build();
    live.transition(RunState::Running, 9_000_000).unwrap();
    store.create_run(live).unwrap();

    for id in ["run-done", "run-live"] {
        store
            .append_structured(agd_core::StructuredEvent {
                run_id: id.into(),
                sequence: 1,
                event_type: "structured".into(),
                category: agd_core::EventCategory::Structured,
                payload: serde_json::json!({}),
                schema_version: agd_core::STRUCTURED_SCHEMA_VERSION,
                at_ms: 1,
            })
            .unwrap();
    }

    // Cutoff a day in the future: only the terminal run is prunable.
    let pruner = Pruner::new(store.clone(), clock.clone()).with_retention(Duration::ZERO);
    clock.advance(Duration::from_secs(24 * 60 * 60));
    let report = pruner.run_once().unwrap();

    assert_eq!(report.runs_pruned, 1);
    assert!(store.structured_events(&"run-done".into(), 0).is_empty());
    assert_eq!(store.structured_events(&"run-live".into(), 0).len(), 1);
}
