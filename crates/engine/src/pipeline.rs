// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The structured event pipeline.
//!
//! Chunks arrive as raw lines from a harness runtime. Each is redacted,
//! parsed against the wire marker, mapped to a canonical category,
//! persisted with a per-run monotonic sequence, and broadcast to live
//! subscribers. Side tables (diff snapshots, tool projections, question
//! requests) are maintained as the stream flows through.

use crate::error::EngineError;
use agd_core::{
    Clock, DiffSnapshot, EventCategory, QuestionEntry, QuestionId, QuestionOption,
    QuestionRequest, QuestionStatus, Redactor, RunId, StructuredEvent, ToolProjection, ToolState,
    STRUCTURED_SCHEMA_VERSION,
};
use agd_storage::Store;
use agd_wire::WireEvent;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

const BROADCAST_CAPACITY: usize = 4096;

/// Completion details surfaced by a `run.completed` event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionInfo {
    pub summary: Option<String>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
}

pub struct EventPipeline<C: Clock> {
    store: Arc<Store>,
    clock: C,
    broadcast: broadcast::Sender<StructuredEvent>,
    /// Next sequence per run, seeded from the store on first contact.
    sequences: Mutex<HashMap<RunId, u64>>,
}

impl<C: Clock> EventPipeline<C> {
    pub fn new(store: Arc<Store>, clock: C) -> Self {
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { store, clock, broadcast, sequences: Mutex::new(HashMap::new()) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StructuredEvent> {
        self.broadcast.subscribe()
    }

    /// Ingest one chunk line for a run.
    ///
    /// Returns completion info when the chunk announces the end of the run;
    /// the caller attaches it to the run record.
    pub fn ingest(
        &self,
        run_id: RunId,
        chunk: &str,
        redactor: &Redactor,
    ) -> Result<Option<CompletionInfo>, EngineError> {
        let redacted = redactor.redact(chunk, &[]);

        let Some(wire) = WireEvent::parse(&redacted) else {
            // Raw log line.
            self.persist(
                run_id,
                "log".into(),
                EventCategory::Log,
                serde_json::json!({ "line": redacted }),
                STRUCTURED_SCHEMA_VERSION,
            )?;
            return Ok(None);
        };

        let mut event_type: SmolStr = wire.event_type.as_str().into();
        let mut payload = wire
            .content_json()
            .unwrap_or_else(|| serde_json::json!({ "content": wire.content }));
        let mut schema_version = STRUCTURED_SCHEMA_VERSION;

        // A nested structured projection overrides the outer event and
        // keeps its own schema version.
        if let Some((nested_type, nested_version, properties)) = nested_projection(&payload) {
            event_type = nested_type.into();
            schema_version = nested_version;
            payload = properties;
        }

        let category = categorize(&event_type);
        match category {
            EventCategory::ReasoningDelta => {
                payload = reasoning_payload(&payload, &wire.content);
            }
            EventCategory::ToolLifecycle => {
                self.project_tool(run_id, &payload)?;
                if is_question_tool(&payload) {
                    self.raise_question(run_id, &payload)?;
                    // The canonical category for a user-input request is the
                    // question, not the tool call that carried it.
                    self.persist(
                        run_id,
                        event_type,
                        EventCategory::QuestionRequested,
                        payload,
                        schema_version,
                    )?;
                    return Ok(None);
                }
            }
            EventCategory::DiffUpdated => {
                self.upsert_diff(run_id, &payload)?;
            }
            EventCategory::QuestionRequested => {
                self.raise_question(run_id, &payload)?;
            }
            _ => {}
        }

        self.persist(run_id, event_type, category, payload.clone(), schema_version)?;

        if category == EventCategory::RunCompleted {
            return Ok(Some(completion_info(&payload, &wire.metadata)));
        }
        Ok(None)
    }

    fn persist(
        &self,
        run_id: RunId,
        event_type: SmolStr,
        category: EventCategory,
        payload: serde_json::Value,
        schema_version: u32,
    ) -> Result<(), EngineError> {
        let sequence = self.next_sequence(run_id);
        let event = StructuredEvent {
            run_id,
            sequence,
            event_type,
            category,
            payload,
            schema_version,
            at_ms: self.clock.epoch_ms(),
        };
        self.store.append_structured(event.clone())?;
        let _ = self.broadcast.send(event);
        Ok(())
    }

    /// Allocate the next sequence for a run, seeding from persisted rows so
    /// a resumed run continues its stream instead of restarting it.
    fn next_sequence(&self, run_id: RunId) -> u64 {
        let mut sequences = self.sequences.lock();
        let next = sequences.entry(run_id).or_insert_with(|| Self::seed(&self.store, &run_id));
        let allocated = *next;
        *next += 1;
        allocated
    }

    /// The sequence the next persisted event will get, without consuming it.
    fn peek_sequence(&self, run_id: RunId) -> u64 {
        let mut sequences = self.sequences.lock();
        *sequences.entry(run_id).or_insert_with(|| Self::seed(&self.store, &run_id))
    }

    fn seed(store: &Store, run_id: &RunId) -> u64 {
        store.structured_events(run_id, 0).last().map(|e| e.sequence + 1).unwrap_or(1)
    }

    fn project_tool(&self, run_id: RunId, payload: &serde_json::Value) -> Result<(), EngineError> {
        let tool_call_id = string_field(payload, &["tool_call_id", "id", "call_id"])
            .unwrap_or_else(|| format!("call-{}", self.clock.epoch_ms()));
        let tool_name =
            string_field(payload, &["tool_name", "tool", "name"]).unwrap_or_default();
        let state = tool_state(payload);

        let existing = self
            .store
            .tool_projections(&run_id)
            .into_iter()
            .find(|p| p.tool_call_id == tool_call_id);
        let now = self.clock.epoch_ms();
        let projection = match existing {
            Some(mut p) => {
                p.state = state;
                if let Some(output) = payload.get("output") {
                    p.output = Some(output.clone());
                }
                if state != ToolState::Running && p.ended_at_ms.is_none() {
                    p.ended_at_ms = Some(now);
                }
                p
            }
            None => ToolProjection {
                run_id,
                tool_call_id,
                tool_name,
                state,
                input: payload.get("input").cloned(),
                output: payload.get("output").cloned(),
                started_at_ms: now,
                ended_at_ms: (state != ToolState::Running).then_some(now),
            },
        };
        self.store.upsert_tool(projection)?;
        Ok(())
    }

    fn upsert_diff(&self, run_id: RunId, payload: &serde_json::Value) -> Result<(), EngineError> {
        let sequence = self.peek_sequence(run_id);
        let snapshot = DiffSnapshot {
            run_id,
            sequence,
            summary: string_field(payload, &["summary"]).unwrap_or_default(),
            diff_stat: string_field(payload, &["diff_stat", "diffStat", "stat"])
                .unwrap_or_default(),
            diff_patch: string_field(payload, &["diff_patch", "diffPatch", "patch", "diff"])
                .unwrap_or_default(),
            schema_version: STRUCTURED_SCHEMA_VERSION,
            at_ms: self.clock.epoch_ms(),
        };
        self.store.upsert_diff(snapshot)?;
        Ok(())
    }

    fn raise_question(&self, run_id: RunId, payload: &serde_json::Value) -> Result<(), EngineError> {
        let Some(run) = self.store.get_run(&run_id) else {
            warn!(%run_id, "question event for unknown run dropped");
            return Ok(());
        };
        let questions = parse_questions(payload);
        let question = QuestionRequest {
            id: QuestionId::new(),
            run_id,
            task_id: run.task_id,
            questions,
            status: QuestionStatus::Pending,
            answers: Vec::new(),
            answered_run_id: None,
            source_tool_name: string_field(payload, &["tool_name", "tool", "name"]),
            created_at_ms: self.clock.epoch_ms(),
        };
        self.store.create_question(question)?;
        Ok(())
    }
}

/// Map a wire event type onto its canonical category.
fn categorize(event_type: &str) -> EventCategory {
    let t = event_type.to_ascii_lowercase();
    if t.contains("reasoning") || t.contains("thinking") {
        EventCategory::ReasoningDelta
    } else if t.starts_with("tool.") || t.starts_with("tool_") || t == "tool" {
        EventCategory::ToolLifecycle
    } else if t == "completion" || t == "run_completed" || t == "run.completed" {
        EventCategory::RunCompleted
    } else if t.starts_with("diff.") || t.starts_with("diff_") || t == "session.diff" {
        EventCategory::DiffUpdated
    } else if t == "request_user_input" || t == "question.requested" {
        EventCategory::QuestionRequested
    } else {
        EventCategory::Structured
    }
}

/// `{type, schemaVersion, properties}` nested inside a payload overrides
/// the outer event.
fn nested_projection(payload: &serde_json::Value) -> Option<(String, u32, serde_json::Value)> {
    let object = payload.as_object()?;
    let nested_type = object.get("type")?.as_str()?.to_string();
    let version = object.get("schemaVersion")?.as_u64()? as u32;
    let properties = object.get("properties")?.clone();
    Some((nested_type, version, properties))
}

fn reasoning_payload(payload: &serde_json::Value, raw_content: &str) -> serde_json::Value {
    let text = string_field(payload, &["thinking", "reasoning", "content", "text"])
        .unwrap_or_else(|| raw_content.to_string());
    serde_json::json!({ "thinking": text, "reasoning": text, "content": text })
}

fn completion_info(
    payload: &serde_json::Value,
    metadata: &HashMap<String, String>,
) -> CompletionInfo {
    CompletionInfo {
        summary: string_field(payload, &["summary", "content", "message"])
            .or_else(|| metadata.get("summary").cloned()),
        error: string_field(payload, &["error"]).filter(|e| !e.is_empty()),
        exit_code: payload
            .get("exit_code")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .or_else(|| metadata.get("exit_code").and_then(|v| v.parse().ok())),
    }
}

fn is_question_tool(payload: &serde_json::Value) -> bool {
    string_field(payload, &["tool_name", "tool", "name"])
        .map(|name| name == "request_user_input")
        .unwrap_or(false)
}

fn tool_state(payload: &serde_json::Value) -> ToolState {
    match string_field(payload, &["state", "status"]).as_deref() {
        Some("completed") | Some("success") | Some("succeeded") | Some("done") => {
            ToolState::Completed
        }
        Some("failed") | Some("error") => ToolState::Failed,
        _ => ToolState::Running,
    }
}

fn parse_questions(payload: &serde_json::Value) -> Vec<QuestionEntry> {
    let source = payload
        .get("questions")
        .or_else(|| payload.get("input").and_then(|i| i.get("questions")));
    let Some(rows) = source.and_then(|q| q.as_array()) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| QuestionEntry {
            id: string_field(row, &["id"]).unwrap_or_default(),
            header: string_field(row, &["header", "title"]).unwrap_or_default(),
            prompt: string_field(row, &["prompt", "question", "text"]).unwrap_or_default(),
            options: row
                .get("options")
                .and_then(|o| o.as_array())
                .map(|options| {
                    options
                        .iter()
                        .map(|option| QuestionOption {
                            value: string_field(option, &["value"]).unwrap_or_default(),
                            label: string_field(option, &["label"]).unwrap_or_default(),
                            description: string_field(option, &["description"]),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

fn string_field(value: &serde_json::Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| value.get(name).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
