// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for materialized-state apply idempotency.

use crate::record::Record;
use crate::state::MaterializedState;
use agd_core::{
    DiffSnapshot, EventCategory, QuestionRequest, QuestionStatus, Run, RunState, StructuredEvent,
    STRUCTURED_SCHEMA_VERSION,
};

fn apply_twice(state: &mut MaterializedState, record: Record) {
    state.apply(&record);
    state.apply(&record);
}

fn event(run_id: &str, sequence: u64) -> StructuredEvent {
    StructuredEvent {
        run_id: run_id.into(),
        sequence,
        event_type: "structured".into(),
        category: EventCategory::Structured,
        payload: serde_json::json!({}),
        schema_version: STRUCTURED_SCHEMA_VERSION,
        at_ms: 1,
    }
}

#[test]
fn run_created_is_idempotent() {
    let mut state = MaterializedState::default();
    let run = Run::builder().id("run-a").build();
    state.apply(&Record::RunCreated { run: run.clone() });

    // The run advances; a replayed creation must not reset it.
    state.apply(&Record::RunTransitioned {
        run_id: "run-a".into(),
        to: RunState::Running,
        at_ms: 5,
        reason: None,
    });
    state.apply(&Record::RunCreated { run });
    assert_eq!(state.runs["run-a"].state, RunState::Running);
}

#[test]
fn run_transition_replay_is_skipped() {
    let mut state = MaterializedState::default();
    state.apply(&Record::RunCreated { run: Run::builder().id("run-a").build() });
    let transition = Record::RunTransitioned {
        run_id: "run-a".into(),
        to: RunState::Running,
        at_ms: 5,
        reason: None,
    };
    apply_twice(&mut state, transition);
    assert_eq!(state.runs["run-a"].state, RunState::Running);
    assert_eq!(state.runs["run-a"].started_at_ms, Some(5));
}

#[test]
fn structured_append_deduplicates_by_sequence() {
    let mut state = MaterializedState::default();
    apply_twice(&mut state, Record::StructuredAppended { event: event("run-a", 1) });
    apply_twice(&mut state, Record::StructuredAppended { event: event("run-a", 2) });
    let sequences: Vec<u64> =
        state.structured_events["run-a"].iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);
}

#[test]
fn diff_upsert_keeps_highest_sequence() {
    let mut state = MaterializedState::default();
    let newer = DiffSnapshot {
        run_id: "run-a".into(),
        sequence: 7,
        summary: "newer".to_string(),
        diff_stat: String::new(),
        diff_patch: String::new(),
        schema_version: STRUCTURED_SCHEMA_VERSION,
        at_ms: 1,
    };
    let older = DiffSnapshot { sequence: 3, summary: "older".to_string(), ..newer.clone() };
    state.apply(&Record::DiffUpserted { snapshot: newer.clone() });
    state.apply(&Record::DiffUpserted { snapshot: older });
    assert_eq!(state.diff_snapshots["run-a"].summary, "newer");
}

#[test]
fn question_answer_replay_preserves_first_answer() {
    let mut state = MaterializedState::default();
    state.apply(&Record::QuestionCreated {
        question: QuestionRequest::builder().id("qst-1").build(),
    });
    state.apply(&Record::QuestionAnswered {
        question_id: "qst-1".to_string(),
        answers: vec![("q".to_string(), "first".to_string())],
        answered_run_id: None,
        at_ms: 1,
    });
    // A later (bogus) answer record must not overwrite.
    state.apply(&Record::QuestionAnswered {
        question_id: "qst-1".to_string(),
        answers: vec![("q".to_string(), "second".to_string())],
        answered_run_id: None,
        at_ms: 2,
    });
    let q = &state.question_requests["qst-1"];
    assert_eq!(q.status, QuestionStatus::Answered);
    assert_eq!(q.answers[0].1, "first");
}

#[test]
fn structured_pruned_clears_all_three_families() {
    let mut state = MaterializedState::default();
    state.apply(&Record::StructuredAppended { event: event("run-a", 1) });
    state.apply(&Record::DiffUpserted {
        snapshot: DiffSnapshot {
            run_id: "run-a".into(),
            sequence: 1,
            summary: String::new(),
            diff_stat: String::new(),
            diff_patch: String::new(),
            schema_version: STRUCTURED_SCHEMA_VERSION,
            at_ms: 1,
        },
    });
    apply_twice(&mut state, Record::StructuredPruned { run_id: "run-a".into() });
    assert!(state.structured_events.get("run-a").is_none());
    assert!(state.diff_snapshots.get("run-a").is_none());
    assert!(state.tool_projections.get("run-a").is_none());
}

#[test]
fn snapshot_roundtrips_serde() {
    let mut state = MaterializedState::default();
    state.apply(&Record::RunCreated { run: Run::builder().id("run-a").build() });
    state.apply(&Record::StructuredAppended { event: event("run-a", 1) });

    let json = serde_json::to_string(&state).unwrap();
    let back: MaterializedState = serde_json::from_str(&json).unwrap();
    assert!(back.runs.contains_key("run-a"));
    assert_eq!(back.structured_events["run-a"].len(), 1);
}
