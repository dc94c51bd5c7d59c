// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical structured events, diff snapshots, and tool projections.
//!
//! These are the persisted rows produced by the event pipeline. The wire
//! format a harness emits lives in `agd-wire`; this module holds the
//! canonicalised shape every consumer (UI, pruner, alerts) reads.

use crate::run::RunId;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Schema version stamped on canonical events produced by this build.
pub const STRUCTURED_SCHEMA_VERSION: u32 = 1;

/// Canonical category of a structured event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    ReasoningDelta,
    ToolLifecycle,
    DiffUpdated,
    RunCompleted,
    QuestionRequested,
    Structured,
    Log,
}

crate::simple_display! {
    EventCategory {
        ReasoningDelta => "reasoning.delta",
        ToolLifecycle => "tool.lifecycle",
        DiffUpdated => "diff.updated",
        RunCompleted => "run.completed",
        QuestionRequested => "question.requested",
        Structured => "structured",
        Log => "log",
    }
}

/// A sequenced, typed record streamed during a run.
///
/// Per run the sequence is strictly increasing; events for different runs
/// carry no cross-ordering guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredEvent {
    pub run_id: RunId,
    pub sequence: u64,
    /// Raw type tag from the harness (e.g. "reasoning_delta", "tool.start").
    pub event_type: SmolStr,
    pub category: EventCategory,
    pub payload: serde_json::Value,
    pub schema_version: u32,
    pub at_ms: u64,
}

/// Latest-wins summary of the run's workspace diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSnapshot {
    pub run_id: RunId,
    pub sequence: u64,
    pub summary: String,
    pub diff_stat: String,
    pub diff_patch: String,
    pub schema_version: u32,
    pub at_ms: u64,
}

/// Lifecycle state of one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolState {
    Running,
    Completed,
    Failed,
}

crate::simple_display! {
    ToolState {
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Projection of one tool call, keyed by `tool_call_id` per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProjection {
    pub run_id: RunId,
    pub tool_call_id: String,
    pub tool_name: String,
    pub state: ToolState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
