// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL records: one entry per durable mutation.
//!
//! Serializes with `{"op": "...", ...fields}`. Unknown tags deserialize to
//! `Unknown` and are skipped during replay, so an older daemon can read a
//! newer WAL without dying mid-recovery.

use agd_core::{
    AlertEvent, AlertRule, Artifact, DiffSnapshot, ErrorClass, Finding, FindingState, Project,
    ProviderSecret, ProxyAudit, QuestionRequest, RepoId, Repository, Run, RunId, RunState,
    StructuredEvent, Task, TaskId, ToolProjection, Worker, WorkerId, WorkflowDef,
    WorkflowExecution,
};
use serde::{Deserialize, Serialize};

/// Audit row for one received webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub repo_id: RepoId,
    pub at_ms: u64,
    pub matched_tasks: Vec<TaskId>,
    pub accepted: bool,
}

/// One durable mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Record {
    ProjectUpserted { project: Project },
    RepositoryUpserted { repository: Repository },

    TaskUpserted { task: Task },
    TaskDeleted { task_id: TaskId },
    /// Arm or clear a task's next fire time.
    TaskScheduled {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_at_ms: Option<u64>,
    },

    RunCreated { run: Run },
    RunTransitioned {
        run_id: RunId,
        to: RunState,
        at_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    RunWorkerAssigned { run_id: RunId, worker_id: WorkerId, at_ms: u64 },
    /// Attach envelope-derived fields after a terminal transition.
    RunFinalized {
        run_id: RunId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure_class: Option<ErrorClass>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        envelope: Option<serde_json::Value>,
    },

    StructuredAppended { event: StructuredEvent },
    DiffUpserted { snapshot: DiffSnapshot },
    ToolUpserted { projection: ToolProjection },
    /// Retention: drop all structured rows of one terminal run.
    StructuredPruned { run_id: RunId },

    QuestionCreated { question: QuestionRequest },
    QuestionAnswered {
        question_id: String,
        answers: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answered_run_id: Option<RunId>,
        at_ms: u64,
    },
    QuestionExpired { question_id: String },

    FindingCreated { finding: Finding },
    FindingStateChanged { finding_id: String, state: FindingState },

    WorkerHeartbeat { worker: Worker },
    WorkerAssigned { worker_id: WorkerId, at_ms: u64 },

    ArtifactsAdded { run_id: RunId, artifacts: Vec<Artifact> },

    SecretPut { secret: ProviderSecret },
    WebhookRecorded { delivery: WebhookDelivery },
    ProxyAuditAppended { audit: ProxyAudit },

    WorkflowUpserted { workflow: WorkflowDef },
    ExecutionUpserted { execution: WorkflowExecution },

    AlertRuleUpserted { rule: AlertRule },
    AlertEventAppended { event: AlertEvent },

    InstructionPut { repo_id: RepoId, name: String, content: String },
    SettingPut { key: String, value: String },

    /// Forward compatibility: unknown ops replay as no-ops.
    #[serde(other)]
    Unknown,
}
