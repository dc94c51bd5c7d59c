// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for canonical event types.

use crate::event::{EventCategory, StructuredEvent, STRUCTURED_SCHEMA_VERSION};
use yare::parameterized;

#[parameterized(
    reasoning = { EventCategory::ReasoningDelta, "reasoning.delta" },
    tool = { EventCategory::ToolLifecycle, "tool.lifecycle" },
    diff = { EventCategory::DiffUpdated, "diff.updated" },
    completed = { EventCategory::RunCompleted, "run.completed" },
    question = { EventCategory::QuestionRequested, "question.requested" },
    structured = { EventCategory::Structured, "structured" },
    log = { EventCategory::Log, "log" },
)]
fn category_display_is_dotted(category: EventCategory, expected: &str) {
    assert_eq!(category.to_string(), expected);
}

#[test]
fn structured_event_roundtrips_serde() {
    let event = StructuredEvent {
        run_id: "run-evt".into(),
        sequence: 42,
        event_type: "reasoning_delta".into(),
        category: EventCategory::ReasoningDelta,
        payload: serde_json::json!({"thinking": "…"}),
        schema_version: STRUCTURED_SCHEMA_VERSION,
        at_ms: 123,
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: StructuredEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}
