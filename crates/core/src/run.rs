// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run record and state machine.

use crate::mode::ExecutionMode;
use crate::repo::{ProjectId, RepoId};
use crate::task::TaskId;
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for one execution of a task.
    ///
    /// Also the prefix for every container name and run-owned proxy route
    /// created on the run's behalf.
    pub struct RunId("run-");
}

/// Lifecycle state of a run.
///
/// `Succeeded`, `Failed`, and `Cancelled` are terminal; any attempt to
/// leave them is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    PendingApproval,
    Succeeded,
    Failed,
    Cancelled,
}

crate::simple_display! {
    RunState {
        Queued => "queued",
        Running => "running",
        PendingApproval => "pending_approval",
        Succeeded => "succeeded",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed | RunState::Cancelled)
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition(&self, to: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, to),
            (Queued, Running)
                | (Queued, PendingApproval)
                | (Queued, Cancelled)
                | (PendingApproval, Running)
                | (PendingApproval, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

/// Rejected run-state update.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal run transition {from} -> {to}")]
pub struct TransitionError {
    pub from: RunState,
    pub to: RunState,
}

/// Configuration for creating a new run record.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub id: RunId,
    pub task_id: TaskId,
    pub repo_id: RepoId,
    pub project_id: ProjectId,
    pub attempt: u32,
    pub mode: ExecutionMode,
    pub initial_state: RunState,
}

/// One execution of a task.
///
/// Navigation to the owning task/repository/project is store-mediated:
/// the run holds identifiers only, which keeps the entity graph acyclic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub task_id: TaskId,
    pub repo_id: RepoId,
    pub project_id: ProjectId,
    pub state: RunState,
    /// 1-based attempt counter; retries create new runs with higher attempts.
    pub attempt: u32,
    pub mode: ExecutionMode,
    /// Structured event protocol version negotiated with the harness.
    pub protocol_version: u32,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Classification of the final failure, when `state == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_class: Option<crate::error::ErrorClass>,
    /// Human-readable reason for a terminal state reached outside the
    /// envelope path (e.g. "process-restart", "stage timeout").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The final envelope, stored verbatim after redaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<serde_json::Value>,
}

impl Run {
    pub fn new(config: RunConfig, created_at_ms: u64) -> Self {
        Self {
            id: config.id,
            task_id: config.task_id,
            repo_id: config.repo_id,
            project_id: config.project_id,
            state: config.initial_state,
            attempt: config.attempt.max(1),
            mode: config.mode,
            protocol_version: 1,
            created_at_ms,
            started_at_ms: None,
            ended_at_ms: None,
            worker_id: None,
            summary: None,
            error: None,
            failure_class: None,
            reason: None,
            envelope: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply a state transition, stamping start/end timestamps.
    ///
    /// Illegal transitions leave the record untouched and return
    /// [`TransitionError`]. `ended_at_ms` is clamped so it never precedes
    /// `started_at_ms`.
    pub fn transition(&mut self, to: RunState, at_ms: u64) -> Result<(), TransitionError> {
        if !self.state.can_transition(to) {
            return Err(TransitionError { from: self.state, to });
        }
        self.state = to;
        match to {
            RunState::Running => {
                if self.started_at_ms.is_none() {
                    self.started_at_ms = Some(at_ms);
                }
            }
            RunState::Succeeded | RunState::Failed | RunState::Cancelled => {
                let floor = self.started_at_ms.unwrap_or(at_ms);
                self.ended_at_ms = Some(at_ms.max(floor));
            }
            _ => {}
        }
        Ok(())
    }

    /// Wall-clock duration of the run, when both endpoints are known.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at_ms, self.ended_at_ms) {
            (Some(s), Some(e)) => Some(e.saturating_sub(s)),
            _ => None,
        }
    }
}

crate::builder! {
    pub struct RunBuilder => Run {
        into {
            id: RunId = "run-test0001",
            task_id: TaskId = "tsk-test0001",
            repo_id: RepoId = "rep-test0001",
            project_id: ProjectId = "prj-test0001",
        }
        set {
            state: RunState = RunState::Queued,
            attempt: u32 = 1,
            mode: ExecutionMode = ExecutionMode::Default,
            protocol_version: u32 = 1,
            created_at_ms: u64 = 1_000_000,
        }
        option {
            started_at_ms: u64 = None,
            ended_at_ms: u64 = None,
            worker_id: WorkerId = None,
            summary: String = None,
            error: String = None,
            failure_class: crate::error::ErrorClass = None,
            reason: String = None,
            envelope: serde_json::Value = None,
        }
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
