// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for tests across the workspace.
//!
//! Available to other crates through the `test-support` feature.

use crate::repo::{Project, ProjectId, RepoId, Repository};
use crate::run::{Run, RunConfig, RunId, RunState};
use crate::task::{Task, TaskId};
use crate::ExecutionMode;

/// A project/repository pair with fixed test ids.
pub fn project_and_repo() -> (Project, Repository) {
    let project = Project {
        id: ProjectId::from_string("prj-test0001"),
        name: "test project".to_string(),
        created_at_ms: 1_000_000,
    };
    let repo = Repository::builder().build();
    (project, repo)
}

/// A queued run belonging to the given task.
pub fn queued_run(id: &str, task: &Task) -> Run {
    Run::new(
        RunConfig {
            id: RunId::from_string(id),
            task_id: task.id,
            repo_id: task.repo_id,
            project_id: ProjectId::from_string("prj-test0001"),
            attempt: 1,
            mode: ExecutionMode::Default,
            initial_state: RunState::Queued,
        },
        1_000_000,
    )
}

/// A minimal enabled one-shot task for the default test repo.
pub fn one_shot_task(id: &str) -> Task {
    Task::builder().id(TaskId::from_string(id)).build()
}
