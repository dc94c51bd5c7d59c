// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for due discovery and cron rescheduling.

use crate::scheduler::Scheduler;
use crate::test_helpers::{engine_with_runtime, fast_config, seed_task};
use agd_core::{Task, TaskKind};
use agd_harness::ScriptedRuntime;
use std::sync::Arc;
use std::time::Duration;

const MINUTE_MS: u64 = 60_000;

/// Epoch ms for 2024-03-01T10:00:00Z, a minute boundary.
const T0: u64 = 1_709_287_200_000;

fn scheduler_fixture() -> (Scheduler<agd_core::FakeClock>, crate::test_helpers::TestEngine) {
    let engine = engine_with_runtime(
        Arc::new(ScriptedRuntime::succeeding(Vec::new(), "ok")),
        fast_config(),
    );
    engine.clock.set_epoch_ms(T0);
    let scheduler =
        Scheduler::new(engine.store.clone(), engine.dispatcher.clone(), engine.clock.clone());
    (scheduler, engine)
}

#[tokio::test]
async fn one_shot_dispatches_exactly_once() {
    let (scheduler, engine) = scheduler_fixture();
    let task = seed_task(
        &engine.store,
        Task::builder().next_scheduled_at_ms(T0 - 1_000).build(),
    );

    assert_eq!(scheduler.tick().await, 1);
    // Schedule consumed: further ticks never re-fire.
    assert_eq!(scheduler.tick().await, 0);
    engine.clock.advance(Duration::from_secs(3600));
    assert_eq!(scheduler.tick().await, 0);

    assert_eq!(engine.store.get_task(&task.id).unwrap().next_scheduled_at_ms, None);
    assert_eq!(engine.store.list_runs(Some(&task.id), 0).len(), 1);
}

#[tokio::test]
async fn cron_fires_are_drift_free() {
    let (scheduler, engine) = scheduler_fixture();
    let task = seed_task(
        &engine.store,
        Task::builder()
            .id("tsk-cron")
            .kind(TaskKind::Cron)
            .cron_expr("*/1 * * * *")
            .build(),
    );

    // Arm: first fire lands on the next minute boundary.
    scheduler.arm_cron_tasks().unwrap();
    let first = engine.store.get_task(&task.id).unwrap().next_scheduled_at_ms.unwrap();
    assert_eq!(first, T0 + MINUTE_MS);

    // Ticks arrive late (61s, then 122s after T0) yet fires stay on exact
    // minute boundaries computed from the previous fire.
    engine.clock.set_epoch_ms(T0 + 61_000);
    assert_eq!(scheduler.tick().await, 1);
    let second = engine.store.get_task(&task.id).unwrap().next_scheduled_at_ms.unwrap();
    assert_eq!(second, T0 + 2 * MINUTE_MS);

    engine.clock.set_epoch_ms(T0 + 122_000);
    assert_eq!(scheduler.tick().await, 1);
    let third = engine.store.get_task(&task.id).unwrap().next_scheduled_at_ms.unwrap();
    assert_eq!(third, T0 + 3 * MINUTE_MS);
}

#[tokio::test]
async fn event_driven_tasks_are_never_due() {
    let (scheduler, engine) = scheduler_fixture();
    seed_task(
        &engine.store,
        Task::builder()
            .kind(TaskKind::EventDriven)
            .next_scheduled_at_ms(T0 - 1_000)
            .build(),
    );
    assert_eq!(scheduler.tick().await, 0);
    assert!(engine.store.list_runs(None, 0).is_empty());
}

#[tokio::test]
async fn disabled_tasks_are_never_due() {
    let (scheduler, engine) = scheduler_fixture();
    seed_task(
        &engine.store,
        Task::builder().enabled(false).next_scheduled_at_ms(T0 - 1_000).build(),
    );
    assert_eq!(scheduler.tick().await, 0);
}

#[tokio::test]
async fn arm_skips_armed_and_non_cron_tasks() {
    let (scheduler, engine) = scheduler_fixture();
    seed_task(&engine.store, Task::builder().id("tsk-oneshot").build());
    engine
        .store
        .upsert_task(
            Task::builder()
                .id("tsk-armed")
                .kind(TaskKind::Cron)
                .cron_expr("0 * * * *")
                .next_scheduled_at_ms(T0 + 5_000)
                .build(),
        )
        .unwrap();
    engine
        .store
        .upsert_task(
            Task::builder().id("tsk-fresh").kind(TaskKind::Cron).cron_expr("0 * * * *").build(),
        )
        .unwrap();

    assert_eq!(scheduler.arm_cron_tasks().unwrap(), 1);
    assert_eq!(
        engine.store.get_task(&"tsk-armed".into()).unwrap().next_scheduled_at_ms,
        Some(T0 + 5_000)
    );
    assert!(engine.store.get_task(&"tsk-oneshot".into()).unwrap().next_scheduled_at_ms.is_none());
}

#[tokio::test]
async fn dispatch_failure_does_not_stall_the_cron_schedule() {
    let (scheduler, engine) = scheduler_fixture();
    // Task is due but its repository is missing, so dispatch errors.
    let task = Task::builder()
        .id("tsk-lonely")
        .repo_id("rep-ghost")
        .kind(TaskKind::Cron)
        .cron_expr("*/1 * * * *")
        .next_scheduled_at_ms(T0 - 1_000)
        .build();
    engine.store.upsert_task(task.clone()).unwrap();

    assert_eq!(scheduler.tick().await, 0);
    // Rescheduled regardless of the dispatch failure.
    let next = engine.store.get_task(&task.id).unwrap().next_scheduled_at_ms.unwrap();
    assert!(next > T0 - 1_000);
}
