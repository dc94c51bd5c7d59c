// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Responses and summary DTOs returned over the daemon socket.

use agd_core::{
    EventCategory, ExecutionMode, FindingState, RepoId, RunId, RunState, Severity, TaskId,
    TaskKind, WorkerId,
};
use serde::{Deserialize, Serialize};

/// Compact task listing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub repo_id: RepoId,
    pub kind: TaskKind,
    pub harness: String,
    pub mode: ExecutionMode,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scheduled_at_ms: Option<u64>,
}

/// Compact run listing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,
    pub task_id: TaskId,
    pub state: RunState,
    pub attempt: u32,
    pub mode: ExecutionMode,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Full run detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub summary: RunSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<serde_json::Value>,
    #[serde(default)]
    pub artifact_count: usize,
}

/// One structured event row for CLI/UI backfill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub sequence: u64,
    pub category: EventCategory,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub at_ms: u64,
}

/// Compact finding listing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingSummary {
    pub id: String,
    pub repo_id: RepoId,
    pub state: FindingState,
    pub severity: Severity,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
}

/// Pending question shown to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub id: String,
    pub run_id: RunId,
    pub task_id: TaskId,
    pub header: String,
    pub question_count: usize,
}

/// Worker health row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub endpoint: String,
    pub active_slots: u32,
    pub max_slots: u32,
    pub healthy: bool,
    pub last_heartbeat_ms: u64,
}

/// Outcome of an orphan-container reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReconcileReport {
    pub containers_seen: usize,
    pub orphans_removed: usize,
    pub runs_relinked: usize,
    pub runs_failed: usize,
}

/// Responses over the daemon socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Error { class: String, message: String },
    RunStarted { run_id: RunId },
    RunDeferred { reason: String },
    Tasks { tasks: Vec<TaskSummary> },
    Runs { runs: Vec<RunSummary> },
    Run { run: Box<RunDetail> },
    Events { events: Vec<EventRow> },
    Findings { findings: Vec<FindingSummary> },
    Questions { questions: Vec<QuestionSummary> },
    Workers { workers: Vec<WorkerSummary> },
    ExecutionStarted { workflow_id: String },
    Reconciled { report: ReconcileReport },
    Status {
        version: String,
        uptime_secs: u64,
        queued_runs: usize,
        active_runs: usize,
        workers: usize,
    },
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
