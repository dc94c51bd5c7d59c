// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for the structured event pipeline.

use crate::pipeline::EventPipeline;
use agd_core::{
    EventCategory, FakeClock, QuestionStatus, Redactor, Run, RunId, ToolState,
};
use agd_storage::Store;
use agd_wire::{WireEvent, EVENT_MARKER};
use std::sync::Arc;

fn pipeline() -> (EventPipeline<FakeClock>, Arc<Store>) {
    let store = Arc::new(Store::in_memory());
    store.create_run(Run::builder().id("run-p").build()).unwrap();
    (EventPipeline::new(store.clone(), FakeClock::new()), store)
}

fn run_id() -> RunId {
    "run-p".into()
}

fn wire_line(sequence: u64, event_type: &str, content: &str) -> String {
    WireEvent::new(sequence, event_type, content).to_line()
}

#[test]
fn raw_lines_become_log_events() {
    let (pipeline, store) = pipeline();
    let redactor = Redactor::new();

    pipeline.ingest(run_id(), "plain build output", &redactor).unwrap();

    let events = store.structured_events(&run_id(), 0);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].category, EventCategory::Log);
    assert_eq!(events[0].payload["line"], "plain build output");
    assert_eq!(events[0].sequence, 1);
}

#[test]
fn chunks_are_redacted_before_anything_else() {
    let (pipeline, store) = pipeline();
    let mut redactor = Redactor::new();
    redactor.add_value("sk-secret-token");

    pipeline.ingest(run_id(), "key=sk-secret-token output", &redactor).unwrap();
    pipeline
        .ingest(run_id(), &wire_line(1, "reasoning_delta", "using sk-secret-token here"), &redactor)
        .unwrap();

    for event in store.structured_events(&run_id(), 0) {
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("sk-secret-token"), "secret leaked: {json}");
    }
}

#[test]
fn reasoning_events_canonicalise() {
    let (pipeline, store) = pipeline();
    pipeline
        .ingest(run_id(), &wire_line(1, "thinking", "pondering the diff"), &Redactor::new())
        .unwrap();

    let events = store.structured_events(&run_id(), 0);
    assert_eq!(events[0].category, EventCategory::ReasoningDelta);
    assert_eq!(events[0].payload["thinking"], "pondering the diff");
    assert_eq!(events[0].payload["content"], "pondering the diff");
}

#[test]
fn sequences_are_strictly_increasing_regardless_of_wire_sequence() {
    let (pipeline, store) = pipeline();
    let redactor = Redactor::new();
    // Wire sequences repeat; the pipeline allocates its own.
    pipeline.ingest(run_id(), &wire_line(7, "structured", "a"), &redactor).unwrap();
    pipeline.ingest(run_id(), &wire_line(7, "structured", "b"), &redactor).unwrap();
    pipeline.ingest(run_id(), "raw", &redactor).unwrap();

    let sequences: Vec<u64> =
        store.structured_events(&run_id(), 0).iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[test]
fn tool_lifecycle_maintains_projection() {
    let (pipeline, store) = pipeline();
    let redactor = Redactor::new();

    let start = serde_json::json!({
        "tool_call_id": "call-9", "tool_name": "bash", "state": "running",
        "input": {"command": "ls"},
    });
    pipeline.ingest(run_id(), &wire_line(1, "tool.start", &start.to_string()), &redactor).unwrap();

    let projections = store.tool_projections(&run_id());
    assert_eq!(projections.len(), 1);
    assert_eq!(projections[0].state, ToolState::Running);
    assert_eq!(projections[0].tool_name, "bash");
    assert!(projections[0].ended_at_ms.is_none());

    let finish = serde_json::json!({
        "tool_call_id": "call-9", "tool_name": "bash", "state": "completed",
        "output": {"stdout": "README.md"},
    });
    pipeline.ingest(run_id(), &wire_line(2, "tool.end", &finish.to_string()), &redactor).unwrap();

    let projections = store.tool_projections(&run_id());
    assert_eq!(projections.len(), 1);
    assert_eq!(projections[0].state, ToolState::Completed);
    assert!(projections[0].ended_at_ms.is_some());
    assert_eq!(projections[0].output.as_ref().unwrap()["stdout"], "README.md");

    let events = store.structured_events(&run_id(), 0);
    assert!(events.iter().all(|e| e.category == EventCategory::ToolLifecycle));
}

#[test]
fn diff_events_upsert_latest_wins() {
    let (pipeline, store) = pipeline();
    let redactor = Redactor::new();

    let first = serde_json::json!({"summary": "1 file", "stat": "+1 -0", "patch": "@@"});
    pipeline
        .ingest(run_id(), &wire_line(1, "diff.updated", &first.to_string()), &redactor)
        .unwrap();
    let second = serde_json::json!({"summary": "2 files", "stat": "+9 -2", "patch": "@@@"});
    pipeline
        .ingest(run_id(), &wire_line(2, "diff.updated", &second.to_string()), &redactor)
        .unwrap();

    let snapshot = store.diff_snapshot(&run_id()).unwrap();
    assert_eq!(snapshot.summary, "2 files");
    assert_eq!(snapshot.diff_stat, "+9 -2");
    assert_eq!(snapshot.sequence, 2);
}

#[test]
fn question_tool_creates_pending_request() {
    let (pipeline, store) = pipeline();
    let payload = serde_json::json!({
        "tool_call_id": "call-q", "tool_name": "request_user_input", "state": "running",
        "input": {"questions": [
            {"id": "q1", "header": "Branch", "prompt": "Which branch?",
             "options": [{"value": "main", "label": "main"}, {"value": "dev", "label": "dev"}]}
        ]},
    });
    pipeline
        .ingest(run_id(), &wire_line(1, "tool.start", &payload.to_string()), &Redactor::new())
        .unwrap();

    let questions = store.pending_questions();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].status, QuestionStatus::Pending);
    assert_eq!(questions[0].run_id, run_id());
    assert_eq!(questions[0].questions[0].id, "q1");
    assert_eq!(questions[0].questions[0].options.len(), 2);
    assert_eq!(questions[0].source_tool_name.as_deref(), Some("request_user_input"));

    let events = store.structured_events(&run_id(), 0);
    assert_eq!(events[0].category, EventCategory::QuestionRequested);
}

#[test]
fn completion_event_returns_info() {
    let (pipeline, _store) = pipeline();
    let payload = serde_json::json!({"summary": "fixed it", "exit_code": 0});
    let info = pipeline
        .ingest(run_id(), &wire_line(9, "run_completed", &payload.to_string()), &Redactor::new())
        .unwrap()
        .unwrap();
    assert_eq!(info.summary.as_deref(), Some("fixed it"));
    assert_eq!(info.exit_code, Some(0));
    assert_eq!(info.error, None);
}

#[test]
fn nested_projection_overrides_outer_event() {
    let (pipeline, store) = pipeline();
    let nested = serde_json::json!({
        "type": "custom.metric",
        "schemaVersion": 4,
        "properties": {"tokens": 1234},
    });
    pipeline
        .ingest(run_id(), &wire_line(1, "structured", &nested.to_string()), &Redactor::new())
        .unwrap();

    let events = store.structured_events(&run_id(), 0);
    assert_eq!(events[0].event_type, "custom.metric");
    assert_eq!(events[0].schema_version, 4);
    assert_eq!(events[0].payload["tokens"], 1234);
    assert_eq!(events[0].category, EventCategory::Structured);
}

#[test]
fn unknown_types_fall_back_to_structured() {
    let (pipeline, store) = pipeline();
    pipeline
        .ingest(run_id(), &wire_line(1, "telemetry.blob", "{}"), &Redactor::new())
        .unwrap();
    assert_eq!(store.structured_events(&run_id(), 0)[0].category, EventCategory::Structured);
}

#[test]
fn subscribers_receive_events_live() {
    let (pipeline, _store) = pipeline();
    let mut rx = pipeline.subscribe();
    pipeline.ingest(run_id(), "hello", &Redactor::new()).unwrap();
    let event = rx.try_recv().unwrap();
    assert_eq!(event.category, EventCategory::Log);
    assert_eq!(event.sequence, 1);
}
