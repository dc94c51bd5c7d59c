// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task records: runnable templates owned by a repository.

use crate::mode::ExecutionMode;
use crate::repo::RepoId;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a task.
    pub struct TaskId("tsk-");
}

/// How a task is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Runs once when `next_scheduled_at_ms` elapses, then never again
    /// unless re-armed by an operator.
    #[default]
    OneShot,
    /// Fires on a cron expression, next fire computed from the previous one.
    Cron,
    /// Fires only from webhook fan-out; the scheduler never considers it due.
    EventDriven,
}

crate::simple_display! {
    TaskKind {
        OneShot => "one_shot",
        Cron => "cron",
        EventDriven => "event_driven",
    }
}

/// Stage and idle deadlines, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub stage_total_secs: u64,
    pub idle_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { stage_total_secs: 600, idle_secs: 120 }
    }
}

/// Container limits applied at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxProfile {
    pub cpu_limit: f64,
    pub memory_bytes: u64,
    pub network_disabled: bool,
    pub read_only_rootfs: bool,
}

impl Default for SandboxProfile {
    fn default() -> Self {
        Self {
            cpu_limit: 1.5,
            memory_bytes: 2 * 1024 * 1024 * 1024,
            network_disabled: false,
            read_only_rootfs: false,
        }
    }
}

/// Extraction caps and optional allowlist override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPolicy {
    pub max_artifacts: usize,
    pub max_total_bytes: u64,
    /// When set, replaces the default allowlist glob set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<String>>,
}

impl Default for ArtifactPolicy {
    fn default() -> Self {
        Self { max_artifacts: 100, max_total_bytes: 256 * 1024 * 1024, patterns: None }
    }
}

/// Human gate before a queued run may start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ApprovalProfile {
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_role: Option<String>,
}

/// A runnable template owned by a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub repo_id: RepoId,
    pub kind: TaskKind,
    /// Harness tag selecting the runtime strategy (e.g. "codex", "opencode").
    pub harness: String,
    pub mode: ExecutionMode,
    pub prompt: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expr: Option<String>,
    pub auto_pr: bool,
    pub enabled: bool,
    /// Epoch ms of the next scheduled fire. For one-shot tasks this is
    /// consumed exactly once; for cron tasks it is recomputed after each
    /// fire from the previous fire time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scheduled_at_ms: Option<u64>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub sandbox: SandboxProfile,
    #[serde(default)]
    pub artifacts: ArtifactPolicy,
    #[serde(default)]
    pub approval: ApprovalProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_profile: Option<String>,
    pub created_at_ms: u64,
}

impl Task {
    /// Invariant check used by the store before accepting an upsert.
    ///
    /// A cron task must carry a parseable cron expression; other kinds
    /// ignore the field.
    pub fn validate(&self) -> Result<(), String> {
        if self.kind == TaskKind::Cron {
            let expr = self.cron_expr.as_deref().unwrap_or("");
            if expr.is_empty() {
                return Err("cron task requires a cron expression".to_string());
            }
            crate::cron::CronSchedule::parse(expr).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Effective mode for a dispatch: the override wins over the task default.
    pub fn effective_mode(&self, override_mode: Option<ExecutionMode>) -> ExecutionMode {
        override_mode.unwrap_or(self.mode)
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            id: TaskId = "tsk-test0001",
            repo_id: RepoId = "rep-test0001",
            harness: String = "codex",
            prompt: String = "echo hi",
            command: String = "/bin/echo hi",
        }
        set {
            kind: TaskKind = TaskKind::OneShot,
            mode: ExecutionMode = ExecutionMode::Default,
            auto_pr: bool = false,
            enabled: bool = true,
            retry: RetryPolicy = RetryPolicy::default(),
            timeouts: Timeouts = Timeouts::default(),
            sandbox: SandboxProfile = SandboxProfile::default(),
            artifacts: ArtifactPolicy = ArtifactPolicy::default(),
            approval: ApprovalProfile = ApprovalProfile::default(),
            created_at_ms: u64 = 1_000_000,
        }
        option {
            cron_expr: String = None,
            next_scheduled_at_ms: u64 = None,
            session_profile: String = None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
