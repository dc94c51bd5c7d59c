// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Requests accepted by the daemon IPC socket and the runtime-host RPC.

use agd_core::{ExecutionMode, FindingState, RepoId, RunId, SandboxProfile, TaskId, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameters of a dispatch handed to a runtime host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchJob {
    pub run_id: RunId,
    pub repo_id: RepoId,
    pub task_id: TaskId,
    pub harness: String,
    pub image_tag: String,
    pub clone_url: String,
    /// Decorated prompt handed to the harness.
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_args: Vec<String>,
    pub timeout_seconds: u64,
    pub sandbox: SandboxProfile,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub container_labels: HashMap<String, String>,
}

/// Requests over the daemon socket.
///
/// Serializes with `{"type": "...", ...fields}` so foreign clients can
/// speak the protocol without this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    // -- control plane ↔ runtime host --
    DispatchJob(DispatchJob),
    CancelJob { run_id: RunId },
    SubscribeEvents { run_id: RunId },
    Heartbeat { worker_id: WorkerId, endpoint: String, active_slots: u32, max_slots: u32 },
    KillContainer { run_id: RunId },
    ReconcileOrphanedContainers,

    // -- operator CLI --
    TriggerTask {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<ExecutionMode>,
    },
    CancelRun { run_id: RunId },
    ApproveRun { run_id: RunId, approve: bool },
    ListQuestions,
    AnswerQuestion {
        question_id: String,
        /// question id → chosen value.
        answers: Vec<(String, String)>,
    },
    ListTasks {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repo_id: Option<RepoId>,
    },
    ListRuns {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<TaskId>,
        #[serde(default)]
        limit: usize,
    },
    GetRun { run_id: RunId },
    GetRunEvents { run_id: RunId, since_sequence: u64 },
    ListFindings {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repo_id: Option<RepoId>,
    },
    ResolveFinding { finding_id: String, state: FindingState },
    ListWorkers,
    RunWorkflow { workflow_id: String },
    ResolveWorkflowApproval { execution_id: String, approve: bool },
    DaemonStatus,
    Shutdown,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
