// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for the store facade.

use crate::error::StorageError;
use crate::store::Store;
use agd_core::{
    DiffSnapshot, EventCategory, QuestionRequest, QuestionStatus, Run, RunState, StructuredEvent,
    Task, TaskKind, Worker, STRUCTURED_SCHEMA_VERSION,
};

fn event(run_id: &str, sequence: u64) -> StructuredEvent {
    StructuredEvent {
        run_id: run_id.into(),
        sequence,
        event_type: "reasoning_delta".into(),
        category: EventCategory::ReasoningDelta,
        payload: serde_json::json!({}),
        schema_version: STRUCTURED_SCHEMA_VERSION,
        at_ms: 1,
    }
}

fn diff(run_id: &str, sequence: u64, summary: &str) -> DiffSnapshot {
    DiffSnapshot {
        run_id: run_id.into(),
        sequence,
        summary: summary.to_string(),
        diff_stat: String::new(),
        diff_patch: String::new(),
        schema_version: STRUCTURED_SCHEMA_VERSION,
        at_ms: 1,
    }
}

#[test]
fn run_transition_first_writer_wins() {
    let store = Store::in_memory();
    store.create_run(Run::builder().id("run-a").build()).unwrap();

    store.transition_run(&"run-a".into(), RunState::Running, 10, None).unwrap();
    store.transition_run(&"run-a".into(), RunState::Succeeded, 20, None).unwrap();

    // The losing writer observes InvalidTransition.
    let err = store.transition_run(&"run-a".into(), RunState::Failed, 21, None).unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition(_)));

    let run = store.get_run(&"run-a".into()).unwrap();
    assert_eq!(run.state, RunState::Succeeded);
}

#[test]
fn transition_of_unknown_run_is_not_found() {
    let store = Store::in_memory();
    let err = store.transition_run(&"run-ghost".into(), RunState::Running, 1, None).unwrap_err();
    assert!(matches!(err, StorageError::NotFound { kind: "run", .. }));
}

#[test]
fn structured_sequence_must_strictly_increase() {
    let store = Store::in_memory();
    store.append_structured(event("run-a", 1)).unwrap();
    store.append_structured(event("run-a", 2)).unwrap();

    let err = store.append_structured(event("run-a", 2)).unwrap_err();
    assert!(matches!(err, StorageError::SequenceRegression { have: 2, got: 2, .. }));
    let err = store.append_structured(event("run-a", 1)).unwrap_err();
    assert!(matches!(err, StorageError::SequenceRegression { .. }));

    // Other runs are unaffected.
    store.append_structured(event("run-b", 1)).unwrap();

    let rows = store.structured_events(&"run-a".into(), 0);
    let sequences: Vec<u64> = rows.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);
}

#[test]
fn structured_events_since_sequence_filters() {
    let store = Store::in_memory();
    for seq in 1..=5 {
        store.append_structured(event("run-a", seq)).unwrap();
    }
    let rows = store.structured_events(&"run-a".into(), 3);
    let sequences: Vec<u64> = rows.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![4, 5]);
}

#[test]
fn diff_snapshot_is_latest_wins() {
    let store = Store::in_memory();
    store.upsert_diff(diff("run-a", 5, "five")).unwrap();
    store.upsert_diff(diff("run-a", 3, "three")).unwrap();
    assert_eq!(store.diff_snapshot(&"run-a".into()).unwrap().summary, "five");

    store.upsert_diff(diff("run-a", 9, "nine")).unwrap();
    assert_eq!(store.diff_snapshot(&"run-a".into()).unwrap().summary, "nine");
}

#[test]
fn question_answered_exactly_once() {
    let store = Store::in_memory();
    store.create_question(QuestionRequest::builder().id("qst-1").build()).unwrap();

    store
        .answer_question("qst-1", vec![("q1".to_string(), "yes".to_string())], Some("run-f".into()), 5)
        .unwrap();

    let q = store.get_question("qst-1").unwrap();
    assert_eq!(q.status, QuestionStatus::Answered);
    assert_eq!(q.answered_run_id, Some("run-f".into()));

    let err = store.answer_question("qst-1", vec![], None, 6).unwrap_err();
    assert!(matches!(err, StorageError::QuestionNotPending(_)));
}

#[test]
fn expired_question_rejects_answers() {
    let store = Store::in_memory();
    store.create_question(QuestionRequest::builder().id("qst-1").build()).unwrap();
    store.expire_question("qst-1").unwrap();
    let err = store.answer_question("qst-1", vec![], None, 1).unwrap_err();
    assert!(matches!(err, StorageError::QuestionNotPending(_)));
}

#[test]
fn due_tasks_respects_kind_and_enabled_flag() {
    let store = Store::in_memory();
    store
        .upsert_task(Task::builder().id("tsk-due").next_scheduled_at_ms(500u64).build())
        .unwrap();
    store
        .upsert_task(Task::builder().id("tsk-later").next_scheduled_at_ms(5_000u64).build())
        .unwrap();
    store
        .upsert_task(
            Task::builder().id("tsk-off").enabled(false).next_scheduled_at_ms(500u64).build(),
        )
        .unwrap();
    store
        .upsert_task(
            Task::builder()
                .id("tsk-hook")
                .kind(TaskKind::EventDriven)
                .next_scheduled_at_ms(500u64)
                .build(),
        )
        .unwrap();

    let due = store.due_tasks(1_000);
    let ids: Vec<&str> = due.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["tsk-due"]);
}

#[test]
fn one_shot_consumed_exactly_once() {
    let store = Store::in_memory();
    store
        .upsert_task(Task::builder().id("tsk-once").next_scheduled_at_ms(100u64).build())
        .unwrap();

    assert!(store.consume_one_shot(&"tsk-once".into()).unwrap());
    assert!(!store.consume_one_shot(&"tsk-once".into()).unwrap());
    assert!(store.due_tasks(u64::MAX / 2).is_empty());
}

#[test]
fn cron_task_upsert_requires_valid_expression() {
    let store = Store::in_memory();
    let err = store
        .upsert_task(Task::builder().id("tsk-cron").kind(TaskKind::Cron).build())
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidTask(_)));

    store
        .upsert_task(
            Task::builder().id("tsk-cron").kind(TaskKind::Cron).cron_expr("*/1 * * * *").build(),
        )
        .unwrap();
}

#[test]
fn active_counts_track_cap_dimensions() {
    let store = Store::in_memory();
    let probe = Run::builder().id("run-probe").build();

    store.create_run(Run::builder().id("run-1").build()).unwrap();
    store.create_run(Run::builder().id("run-2").task_id("tsk-other").build()).unwrap();
    store.create_run(Run::builder().id("run-3").repo_id("rep-other").task_id("tsk-x").build()).unwrap();
    // Terminal runs do not count.
    store.create_run(Run::builder().id("run-4").state(RunState::Succeeded).build()).unwrap();

    let counts = store.active_run_counts(&probe);
    assert_eq!(counts.global, 3);
    assert_eq!(counts.repo, 2);
    assert_eq!(counts.task, 1);
}

#[test]
fn selectable_workers_ordering() {
    let store = Store::in_memory();
    let now = 1_000_000;
    store
        .worker_heartbeat(
            Worker::builder().id("w-busy").active_slots(3).last_heartbeat_ms(now).build(),
        )
        .unwrap();
    store
        .worker_heartbeat(
            Worker::builder().id("w-idle-b").active_slots(0).last_heartbeat_ms(now).build(),
        )
        .unwrap();
    store
        .worker_heartbeat(
            Worker::builder().id("w-idle-a").active_slots(0).last_heartbeat_ms(now).build(),
        )
        .unwrap();
    store
        .worker_heartbeat(
            Worker::builder().id("w-dead").active_slots(0).last_heartbeat_ms(1).build(),
        )
        .unwrap();
    store
        .worker_heartbeat(
            Worker::builder()
                .id("w-full")
                .active_slots(4)
                .max_slots(4)
                .last_heartbeat_ms(now)
                .build(),
        )
        .unwrap();

    let workers = store.selectable_workers(now, 30_000);
    let ids: Vec<&str> = workers.iter().map(|w| w.id.as_str()).collect();
    // Dead and full workers excluded; idle ones first, tie broken by id.
    assert_eq!(ids, vec!["w-idle-a", "w-idle-b", "w-busy"]);
}

#[test]
fn worker_assignment_breaks_future_ties() {
    let store = Store::in_memory();
    let now = 1_000_000;
    for id in ["w-1", "w-2"] {
        store
            .worker_heartbeat(Worker::builder().id(id).last_heartbeat_ms(now).build())
            .unwrap();
    }
    store.create_run(Run::builder().id("run-a").build()).unwrap();
    store.assign_worker(&"run-a".into(), &"w-1".into(), now).unwrap();

    let workers = store.selectable_workers(now, 30_000);
    assert_eq!(workers[0].id.as_str(), "w-2");
    assert_eq!(store.get_run(&"run-a".into()).unwrap().worker_id, Some("w-1".into()));
}

#[test]
fn persistence_roundtrip_through_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Store::open(dir.path()).unwrap();
        store.upsert_task(Task::builder().id("tsk-p").build()).unwrap();
        store.create_run(Run::builder().id("run-p").build()).unwrap();
        store.transition_run(&"run-p".into(), RunState::Running, 10, None).unwrap();
        store.append_structured(event("run-p", 1)).unwrap();
    }
    {
        let store = Store::open(dir.path()).unwrap();
        assert!(store.get_task(&"tsk-p".into()).is_some());
        let run = store.get_run(&"run-p".into()).unwrap();
        assert_eq!(run.state, RunState::Running);
        assert_eq!(store.structured_events(&"run-p".into(), 0).len(), 1);
    }
}

#[test]
fn compaction_preserves_state() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Store::open(dir.path()).unwrap();
        store.create_run(Run::builder().id("run-c").build()).unwrap();
        store.compact().unwrap();
        store.create_run(Run::builder().id("run-d").build()).unwrap();
    }
    {
        let store = Store::open(dir.path()).unwrap();
        assert!(store.get_run(&"run-c".into()).is_some());
        assert!(store.get_run(&"run-d".into()).is_some());
    }
}

#[test]
fn prune_deletes_terminal_rows_only() {
    let store = Store::in_memory();

    // Terminal old run with structured rows.
    let mut old = Run::builder().id("run-old").build();
    old.transition(RunState::Running, 10).unwrap();
    old.transition(RunState::Succeeded, 20).unwrap();
    store.create_run(old).unwrap();
    store.append_structured(event("run-old", 1)).unwrap();
    store.upsert_diff(diff("run-old", 1, "s")).unwrap();

    // Active run with structured rows.
    let mut active = Run::builder().id("run-live").build();
    active.transition(RunState::Running, 10).unwrap();
    store.create_run(active).unwrap();
    store.append_structured(event("run-live", 1)).unwrap();

    let report = store.prune_structured(u64::MAX / 2, 0, &[]).unwrap();
    assert_eq!(report.runs_pruned, 1);
    assert_eq!(report.events_deleted, 1);
    assert_eq!(report.snapshots_deleted, 1);

    assert!(store.structured_events(&"run-old".into(), 0).is_empty());
    assert_eq!(store.structured_events(&"run-live".into(), 0).len(), 1);

    // Idempotent second pass.
    let report = store.prune_structured(u64::MAX / 2, 0, &[]).unwrap();
    assert_eq!(report.runs_pruned, 0);
}

#[test]
fn prune_honours_exclusions_and_cutoff() {
    let store = Store::in_memory();
    let mut done = Run::builder().id("run-x").task_id("tsk-keep").build();
    done.transition(RunState::Running, 10).unwrap();
    done.transition(RunState::Failed, 20).unwrap();
    store.create_run(done).unwrap();
    store.append_structured(event("run-x", 1)).unwrap();

    // Excluded task: nothing deleted.
    let report = store.prune_structured(u64::MAX / 2, 0, &["tsk-keep".into()]).unwrap();
    assert_eq!(report.runs_pruned, 0);

    // Cutoff before the run ended: nothing deleted.
    let report = store.prune_structured(5, 0, &[]).unwrap();
    assert_eq!(report.runs_pruned, 0);

    // Otherwise deleted.
    let report = store.prune_structured(u64::MAX / 2, 0, &[]).unwrap();
    assert_eq!(report.runs_pruned, 1);
}
