// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project and repository records.

use crate::mode::ExecutionMode;
use crate::task::TaskKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a project.
    pub struct ProjectId("prj-");
}

crate::define_id! {
    /// Unique identifier for a repository.
    pub struct RepoId("rep-");
}

/// Top-level grouping of repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub created_at_ms: u64,
}

/// Defaults applied to tasks created under a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskDefaults {
    #[serde(default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub harness: String,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expr: Option<String>,
    #[serde(default)]
    pub auto_pr: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_profile: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// A source repository under a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepoId,
    pub project_id: ProjectId,
    pub remote_url: String,
    /// Local checkout the run workspaces are cloned from.
    pub checkout_path: PathBuf,
    pub default_branch: String,
    #[serde(default)]
    pub task_defaults: TaskDefaults,
    pub created_at_ms: u64,
}

crate::builder! {
    pub struct RepositoryBuilder => Repository {
        into {
            id: RepoId = "rep-test0001",
            project_id: ProjectId = "prj-test0001",
            remote_url: String = "https://example.test/repo.git",
            checkout_path: PathBuf = "/srv/checkouts/repo",
            default_branch: String = "main",
        }
        set {
            task_defaults: TaskDefaults = TaskDefaults::default(),
            created_at_ms: u64 = 1_000_000,
        }
    }
}
