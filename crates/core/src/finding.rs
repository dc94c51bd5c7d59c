// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Findings: triage records created from failed or flagged runs.

use crate::repo::RepoId;
use crate::run::RunId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a finding.
    pub struct FindingId("fnd-");
}

/// Triage lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FindingState {
    #[default]
    New,
    Acknowledged,
    InProgress,
    Resolved,
    Ignored,
}

crate::simple_display! {
    FindingState {
        New => "new",
        Acknowledged => "acknowledged",
        InProgress => "in_progress",
        Resolved => "resolved",
        Ignored => "ignored",
    }
}

impl FindingState {
    /// Open findings block retention pruning of their task's runs.
    pub fn is_open(&self) -> bool {
        !matches!(self, FindingState::Resolved | FindingState::Ignored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

crate::simple_display! {
    Severity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

/// A triage item owned by a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    pub repo_id: RepoId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub state: FindingState,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub created_at_ms: u64,
}

crate::builder! {
    pub struct FindingBuilder => Finding {
        into {
            id: FindingId = "fnd-test0001",
            repo_id: RepoId = "rep-test0001",
            title: String = "run failed",
            description: String = "",
        }
        set {
            state: FindingState = FindingState::New,
            severity: Severity = Severity::Medium,
            created_at_ms: u64 = 1_000_000,
        }
        option {
            run_id: RunId = None,
            assignee: String = None,
        }
    }
}
