// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay.

mod findings;
mod misc;
mod runs;
mod structured;
mod tasks;
mod workers;

use crate::record::{Record, WebhookDelivery};
use agd_core::{
    AlertEvent, AlertRule, Artifact, DiffSnapshot, Finding, Project, ProviderSecret, ProxyAudit,
    QuestionRequest, Repository, Run, StructuredEvent, Task, ToolProjection, Worker, WorkflowDef,
    WorkflowExecution,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Composite key `repo_id/provider` or `repo_id/name`.
pub fn scoped_key(repo: &str, name: &str) -> String {
    format!("{repo}/{name}")
}

/// Materialized state built from WAL replay.
///
/// # Idempotency requirement
///
/// **All record handlers MUST be idempotent.** A record may be applied
/// twice: once on the live mutation path and again during replay after an
/// unclean shutdown. Guidelines:
/// - assignment over mutation (`=` not `+=`),
/// - guard inserts with existence checks,
/// - guard transitions with legality checks and skip the illegal re-apply.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub projects: HashMap<String, Project>,
    pub repositories: HashMap<String, Repository>,
    pub tasks: HashMap<String, Task>,
    pub runs: HashMap<String, Run>,
    /// run id → rows in ascending sequence order.
    #[serde(default)]
    pub structured_events: HashMap<String, Vec<StructuredEvent>>,
    /// run id → latest snapshot (latest-wins by sequence).
    #[serde(default)]
    pub diff_snapshots: HashMap<String, DiffSnapshot>,
    /// run id → tool call id → projection.
    #[serde(default)]
    pub tool_projections: HashMap<String, HashMap<String, ToolProjection>>,
    #[serde(default)]
    pub question_requests: HashMap<String, QuestionRequest>,
    #[serde(default)]
    pub findings: HashMap<String, Finding>,
    /// run id → extracted artifacts.
    #[serde(default)]
    pub artifacts: HashMap<String, Vec<Artifact>>,
    #[serde(default)]
    pub workers: HashMap<String, Worker>,
    #[serde(default)]
    pub webhook_deliveries: Vec<WebhookDelivery>,
    #[serde(default)]
    pub proxy_audits: Vec<ProxyAudit>,
    /// `repo_id/provider` → secret.
    #[serde(default)]
    pub provider_secrets: HashMap<String, ProviderSecret>,
    #[serde(default)]
    pub workflows: HashMap<String, WorkflowDef>,
    #[serde(default)]
    pub workflow_executions: HashMap<String, WorkflowExecution>,
    #[serde(default)]
    pub alert_rules: HashMap<String, AlertRule>,
    #[serde(default)]
    pub alert_events: Vec<AlertEvent>,
    /// `repo_id/name` → instruction document.
    #[serde(default)]
    pub instructions: HashMap<String, String>,
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

impl MaterializedState {
    /// Apply one record. Never fails: invalid records (e.g. an illegal
    /// transition re-applied during replay) are skipped, keeping replay
    /// convergent.
    pub fn apply(&mut self, record: &Record) {
        match record {
            Record::RunCreated { .. }
            | Record::RunTransitioned { .. }
            | Record::RunWorkerAssigned { .. }
            | Record::RunFinalized { .. } => runs::apply(self, record),

            Record::TaskUpserted { .. }
            | Record::TaskDeleted { .. }
            | Record::TaskScheduled { .. } => tasks::apply(self, record),

            Record::StructuredAppended { .. }
            | Record::DiffUpserted { .. }
            | Record::ToolUpserted { .. }
            | Record::StructuredPruned { .. }
            | Record::QuestionCreated { .. }
            | Record::QuestionAnswered { .. }
            | Record::QuestionExpired { .. } => structured::apply(self, record),

            Record::FindingCreated { .. } | Record::FindingStateChanged { .. } => {
                findings::apply(self, record)
            }

            Record::WorkerHeartbeat { .. } | Record::WorkerAssigned { .. } => {
                workers::apply(self, record)
            }

            Record::ProjectUpserted { .. }
            | Record::RepositoryUpserted { .. }
            | Record::ArtifactsAdded { .. }
            | Record::SecretPut { .. }
            | Record::WebhookRecorded { .. }
            | Record::ProxyAuditAppended { .. }
            | Record::WorkflowUpserted { .. }
            | Record::ExecutionUpserted { .. }
            | Record::AlertRuleUpserted { .. }
            | Record::AlertEventAppended { .. }
            | Record::InstructionPut { .. }
            | Record::SettingPut { .. } => misc::apply(self, record),

            Record::Unknown => {}
        }
    }

    pub fn get_run(&self, id: &str) -> Option<&Run> {
        self.runs.get(id)
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Non-terminal runs, optionally filtered.
    pub fn active_runs(&self) -> impl Iterator<Item = &Run> {
        self.runs.values().filter(|r| !r.is_terminal())
    }
}

#[cfg(test)]
#[path = "../state_tests/mod.rs"]
mod tests;
