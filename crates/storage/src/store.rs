// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store facade: typed mutators over the materialized state.
//!
//! One mutex guards state + WAL, which serializes every mutation — in
//! particular run-state transitions per run id, where the first writer wins
//! and losers get `InvalidTransition`. Reads clone out of the snapshot
//! under a short-held lock.

use crate::error::StorageError;
use crate::record::{Record, WebhookDelivery};
use crate::snapshot;
use crate::state::{scoped_key, MaterializedState};
use crate::wal::Wal;
use agd_core::{
    AlertEvent, AlertRule, Artifact, DiffSnapshot, ErrorClass, Finding, FindingState, Project,
    ProviderSecret, ProxyAudit, QuestionRequest, QuestionStatus, RepoId, Repository, Run, RunId,
    RunState, StructuredEvent, Task, TaskId, TaskKind, ToolProjection, Worker, WorkerId,
    WorkflowDef, WorkflowExecution,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Counts reported by a retention pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneReport {
    pub runs_scanned: usize,
    pub runs_pruned: usize,
    pub events_deleted: usize,
    pub snapshots_deleted: usize,
    pub projections_deleted: usize,
}

struct Inner {
    state: MaterializedState,
    wal: Option<Wal>,
}

/// Durable state facade shared across the engine.
pub struct Store {
    inner: Mutex<Inner>,
    dir: Option<PathBuf>,
}

impl Store {
    /// Open a store under `dir`: load the snapshot, replay the WAL.
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        let mut state = snapshot::load(dir)?.unwrap_or_default();
        let replayed = Wal::replay(dir, |record| state.apply(&record))?;
        if replayed > 0 {
            tracing::info!(replayed, "WAL replay complete");
        }
        let wal = Wal::open(dir)?;
        Ok(Self {
            inner: Mutex::new(Inner { state, wal: Some(wal) }),
            dir: Some(dir.to_path_buf()),
        })
    }

    /// Volatile store for tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner { state: MaterializedState::default(), wal: None }),
            dir: None,
        }
    }

    /// Write a snapshot and truncate the WAL.
    pub fn compact(&self) -> Result<(), StorageError> {
        let Some(dir) = &self.dir else { return Ok(()) };
        let mut inner = self.inner.lock();
        snapshot::save(dir, &inner.state)?;
        if let Some(wal) = inner.wal.as_mut() {
            wal.truncate()?;
        }
        Ok(())
    }

    /// Run a closure against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&MaterializedState) -> R) -> R {
        f(&self.inner.lock().state)
    }

    fn commit(&self, record: Record) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        Self::commit_locked(&mut inner, record)
    }

    fn commit_locked(inner: &mut Inner, record: Record) -> Result<(), StorageError> {
        if let Some(wal) = inner.wal.as_mut() {
            wal.append(&record)?;
        }
        inner.state.apply(&record);
        Ok(())
    }

    // ---- projects / repositories ----

    pub fn upsert_project(&self, project: Project) -> Result<(), StorageError> {
        self.commit(Record::ProjectUpserted { project })
    }

    pub fn upsert_repository(&self, repository: Repository) -> Result<(), StorageError> {
        self.commit(Record::RepositoryUpserted { repository })
    }

    pub fn get_repository(&self, id: &RepoId) -> Option<Repository> {
        self.read(|s| s.repositories.get(id.as_str()).cloned())
    }

    // ---- tasks ----

    pub fn upsert_task(&self, task: Task) -> Result<(), StorageError> {
        task.validate().map_err(StorageError::InvalidTask)?;
        self.commit(Record::TaskUpserted { task })
    }

    pub fn delete_task(&self, task_id: TaskId) -> Result<(), StorageError> {
        self.commit(Record::TaskDeleted { task_id })
    }

    pub fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.read(|s| s.tasks.get(id.as_str()).cloned())
    }

    pub fn list_tasks(&self, repo_id: Option<&RepoId>) -> Vec<Task> {
        self.read(|s| {
            let mut tasks: Vec<Task> = s
                .tasks
                .values()
                .filter(|t| repo_id.map(|r| t.repo_id == *r).unwrap_or(true))
                .cloned()
                .collect();
            tasks.sort_by_key(|t| std::cmp::Reverse(t.created_at_ms));
            tasks
        })
    }

    /// Arm or clear a task's next fire time.
    pub fn set_task_schedule(
        &self,
        task_id: TaskId,
        next_at_ms: Option<u64>,
    ) -> Result<(), StorageError> {
        self.commit(Record::TaskScheduled { task_id, next_at_ms })
    }

    /// Tasks due at `now_ms`: enabled, armed, and not event-driven.
    ///
    /// One-shot and cron tasks alike are due when their armed
    /// `next_scheduled_at_ms` has elapsed; event-driven tasks are never
    /// returned regardless of stored schedule.
    pub fn due_tasks(&self, now_ms: u64) -> Vec<Task> {
        self.read(|s| {
            let mut due: Vec<Task> = s
                .tasks
                .values()
                .filter(|t| t.enabled && t.kind != TaskKind::EventDriven)
                .filter(|t| matches!(t.next_scheduled_at_ms, Some(at) if at <= now_ms))
                .cloned()
                .collect();
            due.sort_by_key(|t| t.next_scheduled_at_ms);
            due
        })
    }

    /// Consume a one-shot task's schedule. Returns false when it was
    /// already consumed — the caller must not dispatch again.
    pub fn consume_one_shot(&self, task_id: &TaskId) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock();
        let armed = inner
            .state
            .tasks
            .get(task_id.as_str())
            .and_then(|t| t.next_scheduled_at_ms)
            .is_some();
        if !armed {
            return Ok(false);
        }
        Self::commit_locked(&mut inner, Record::TaskScheduled { task_id: *task_id, next_at_ms: None })?;
        Ok(true)
    }

    /// Enabled event-driven tasks on a repository, for webhook fan-out.
    pub fn event_driven_tasks(&self, repo_id: &RepoId) -> Vec<Task> {
        self.read(|s| {
            s.tasks
                .values()
                .filter(|t| t.repo_id == *repo_id && t.kind == TaskKind::EventDriven && t.enabled)
                .cloned()
                .collect()
        })
    }

    // ---- runs ----

    pub fn create_run(&self, run: Run) -> Result<(), StorageError> {
        self.commit(Record::RunCreated { run })
    }

    pub fn get_run(&self, id: &RunId) -> Option<Run> {
        self.read(|s| s.runs.get(id.as_str()).cloned())
    }

    pub fn list_runs(&self, task_id: Option<&TaskId>, limit: usize) -> Vec<Run> {
        self.read(|s| {
            let mut runs: Vec<Run> = s
                .runs
                .values()
                .filter(|r| task_id.map(|t| r.task_id == *t).unwrap_or(true))
                .cloned()
                .collect();
            runs.sort_by_key(|r| std::cmp::Reverse(r.created_at_ms));
            if limit > 0 {
                runs.truncate(limit);
            }
            runs
        })
    }

    /// Serialized run transition: the legality check and the commit happen
    /// under one lock, so concurrent writers observe first-writer-wins.
    pub fn transition_run(
        &self,
        run_id: &RunId,
        to: RunState,
        at_ms: u64,
        reason: Option<String>,
    ) -> Result<Run, StorageError> {
        let mut inner = self.inner.lock();
        let run = inner
            .state
            .runs
            .get(run_id.as_str())
            .ok_or_else(|| StorageError::not_found("run", run_id.as_str()))?;
        if !run.state.can_transition(to) {
            return Err(agd_core::TransitionError { from: run.state, to }.into());
        }
        Self::commit_locked(
            &mut inner,
            Record::RunTransitioned { run_id: *run_id, to, at_ms, reason },
        )?;
        if to.is_terminal() {
            if let Some(wal) = inner.wal.as_mut() {
                wal.sync()?;
            }
        }
        inner
            .state
            .runs
            .get(run_id.as_str())
            .cloned()
            .ok_or_else(|| StorageError::not_found("run", run_id.as_str()))
    }

    pub fn assign_worker(
        &self,
        run_id: &RunId,
        worker_id: &WorkerId,
        at_ms: u64,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        Self::commit_locked(
            &mut inner,
            Record::RunWorkerAssigned { run_id: *run_id, worker_id: worker_id.clone(), at_ms },
        )?;
        Self::commit_locked(
            &mut inner,
            Record::WorkerAssigned { worker_id: worker_id.clone(), at_ms },
        )
    }

    pub fn finalize_run(
        &self,
        run_id: &RunId,
        summary: Option<String>,
        error: Option<String>,
        failure_class: Option<ErrorClass>,
        envelope: Option<serde_json::Value>,
    ) -> Result<(), StorageError> {
        self.commit(Record::RunFinalized { run_id: *run_id, summary, error, failure_class, envelope })
    }

    /// Concurrency counters over non-terminal runs, excluding `run` itself
    /// so an already-persisted run can be re-admitted (approval grants,
    /// recovery) without counting against its own caps.
    pub fn active_run_counts(&self, run: &Run) -> ActiveCounts {
        self.read(|s| {
            let mut counts = ActiveCounts::default();
            for r in s.active_runs().filter(|r| r.id != run.id) {
                counts.global += 1;
                if r.project_id == run.project_id {
                    counts.project += 1;
                }
                if r.repo_id == run.repo_id {
                    counts.repo += 1;
                }
                if r.task_id == run.task_id {
                    counts.task += 1;
                }
            }
            counts
        })
    }

    pub fn queued_run_count(&self) -> usize {
        self.read(|s| s.runs.values().filter(|r| r.state == RunState::Queued).count())
    }

    pub fn active_runs(&self) -> Vec<Run> {
        self.read(|s| s.active_runs().cloned().collect())
    }

    // ---- structured rows ----

    /// Append a structured event, enforcing strictly increasing sequence
    /// numbers per run.
    pub fn append_structured(&self, event: StructuredEvent) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let tail = inner
            .state
            .structured_events
            .get(event.run_id.as_str())
            .and_then(|rows| rows.last().map(|r| r.sequence));
        if let Some(have) = tail {
            if event.sequence <= have {
                return Err(StorageError::SequenceRegression {
                    run_id: event.run_id,
                    have,
                    got: event.sequence,
                });
            }
        }
        Self::commit_locked(&mut inner, Record::StructuredAppended { event })
    }

    pub fn structured_events(&self, run_id: &RunId, since_sequence: u64) -> Vec<StructuredEvent> {
        self.read(|s| {
            s.structured_events
                .get(run_id.as_str())
                .map(|rows| {
                    rows.iter().filter(|r| r.sequence > since_sequence).cloned().collect()
                })
                .unwrap_or_default()
        })
    }

    pub fn upsert_diff(&self, snapshot: DiffSnapshot) -> Result<(), StorageError> {
        self.commit(Record::DiffUpserted { snapshot })
    }

    pub fn diff_snapshot(&self, run_id: &RunId) -> Option<DiffSnapshot> {
        self.read(|s| s.diff_snapshots.get(run_id.as_str()).cloned())
    }

    pub fn upsert_tool(&self, projection: ToolProjection) -> Result<(), StorageError> {
        self.commit(Record::ToolUpserted { projection })
    }

    pub fn tool_projections(&self, run_id: &RunId) -> Vec<ToolProjection> {
        self.read(|s| {
            s.tool_projections
                .get(run_id.as_str())
                .map(|m| m.values().cloned().collect())
                .unwrap_or_default()
        })
    }

    // ---- questions ----

    pub fn create_question(&self, question: QuestionRequest) -> Result<(), StorageError> {
        self.commit(Record::QuestionCreated { question })
    }

    pub fn get_question(&self, id: &str) -> Option<QuestionRequest> {
        self.read(|s| s.question_requests.get(id).cloned())
    }

    pub fn pending_questions(&self) -> Vec<QuestionRequest> {
        self.read(|s| {
            s.question_requests
                .values()
                .filter(|q| q.status == QuestionStatus::Pending)
                .cloned()
                .collect()
        })
    }

    /// Atomic pending → answered transition. A second answer, or an answer
    /// to an expired question, is rejected.
    pub fn answer_question(
        &self,
        question_id: &str,
        answers: Vec<(String, String)>,
        answered_run_id: Option<RunId>,
        at_ms: u64,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let status = inner
            .state
            .question_requests
            .get(question_id)
            .map(|q| q.status)
            .ok_or_else(|| StorageError::not_found("question", question_id))?;
        if status != QuestionStatus::Pending {
            return Err(StorageError::QuestionNotPending(question_id.to_string()));
        }
        Self::commit_locked(
            &mut inner,
            Record::QuestionAnswered {
                question_id: question_id.to_string(),
                answers,
                answered_run_id,
                at_ms,
            },
        )
    }

    pub fn expire_question(&self, question_id: &str) -> Result<(), StorageError> {
        self.commit(Record::QuestionExpired { question_id: question_id.to_string() })
    }

    // ---- findings ----

    pub fn create_finding(&self, finding: Finding) -> Result<(), StorageError> {
        self.commit(Record::FindingCreated { finding })
    }

    pub fn set_finding_state(
        &self,
        finding_id: &str,
        state: FindingState,
    ) -> Result<(), StorageError> {
        let exists = self.read(|s| s.findings.contains_key(finding_id));
        if !exists {
            return Err(StorageError::not_found("finding", finding_id));
        }
        self.commit(Record::FindingStateChanged { finding_id: finding_id.to_string(), state })
    }

    pub fn list_findings(&self, repo_id: Option<&RepoId>) -> Vec<Finding> {
        self.read(|s| {
            let mut findings: Vec<Finding> = s
                .findings
                .values()
                .filter(|f| repo_id.map(|r| f.repo_id == *r).unwrap_or(true))
                .cloned()
                .collect();
            findings.sort_by_key(|f| std::cmp::Reverse(f.created_at_ms));
            findings
        })
    }

    /// Task ids with at least one open finding (for pruner exclusion).
    pub fn tasks_with_open_findings(&self) -> Vec<TaskId> {
        self.read(|s| {
            let mut ids: Vec<TaskId> = s
                .findings
                .values()
                .filter(|f| f.state.is_open())
                .filter_map(|f| {
                    f.run_id.and_then(|rid| s.runs.get(rid.as_str())).map(|r| r.task_id)
                })
                .collect();
            ids.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));
            ids.dedup();
            ids
        })
    }

    // ---- workers ----

    pub fn worker_heartbeat(&self, worker: Worker) -> Result<(), StorageError> {
        self.commit(Record::WorkerHeartbeat { worker })
    }

    pub fn list_workers(&self) -> Vec<Worker> {
        self.read(|s| s.workers.values().cloned().collect())
    }

    /// Healthy workers with spare capacity, ordered for selection: fewest
    /// active slots, then least-recently-assigned, then id.
    pub fn selectable_workers(&self, now_ms: u64, heartbeat_timeout_ms: u64) -> Vec<Worker> {
        self.read(|s| {
            let mut workers: Vec<Worker> = s
                .workers
                .values()
                .filter(|w| w.is_healthy(now_ms, heartbeat_timeout_ms) && w.has_capacity())
                .cloned()
                .collect();
            workers.sort_by(|a, b| {
                a.active_slots
                    .cmp(&b.active_slots)
                    .then(a.last_assigned_ms.cmp(&b.last_assigned_ms))
                    .then(a.id.as_str().cmp(b.id.as_str()))
            });
            workers
        })
    }

    // ---- artifacts ----

    pub fn add_artifacts(&self, run_id: &RunId, artifacts: Vec<Artifact>) -> Result<(), StorageError> {
        if artifacts.is_empty() {
            return Ok(());
        }
        self.commit(Record::ArtifactsAdded { run_id: *run_id, artifacts })
    }

    pub fn artifacts_for(&self, run_id: &RunId) -> Vec<Artifact> {
        self.read(|s| s.artifacts.get(run_id.as_str()).cloned().unwrap_or_default())
    }

    // ---- secrets / webhooks / audits ----

    pub fn put_secret(&self, secret: ProviderSecret) -> Result<(), StorageError> {
        self.commit(Record::SecretPut { secret })
    }

    pub fn get_secret(&self, repo_id: &RepoId, provider: &str) -> Option<ProviderSecret> {
        self.read(|s| s.provider_secrets.get(&scoped_key(repo_id.as_str(), provider)).cloned())
    }

    pub fn record_webhook(&self, delivery: WebhookDelivery) -> Result<(), StorageError> {
        self.commit(Record::WebhookRecorded { delivery })
    }

    pub fn append_proxy_audit(&self, audit: ProxyAudit) -> Result<(), StorageError> {
        self.commit(Record::ProxyAuditAppended { audit })
    }

    pub fn proxy_audits(&self) -> Vec<ProxyAudit> {
        self.read(|s| s.proxy_audits.clone())
    }

    // ---- workflows ----

    pub fn upsert_workflow(&self, workflow: WorkflowDef) -> Result<(), StorageError> {
        self.commit(Record::WorkflowUpserted { workflow })
    }

    pub fn get_workflow(&self, id: &str) -> Option<WorkflowDef> {
        self.read(|s| s.workflows.get(id).cloned())
    }

    pub fn upsert_execution(&self, execution: WorkflowExecution) -> Result<(), StorageError> {
        self.commit(Record::ExecutionUpserted { execution })
    }

    pub fn get_execution(&self, id: &str) -> Option<WorkflowExecution> {
        self.read(|s| s.workflow_executions.get(id).cloned())
    }

    /// Task ids referenced by any workflow, enabled or not (conservative
    /// pruner exclusion).
    pub fn tasks_referenced_by_workflows(&self) -> Vec<TaskId> {
        self.read(|s| {
            let mut ids: Vec<TaskId> =
                s.workflows.values().flat_map(|w| w.referenced_tasks()).collect();
            ids.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));
            ids.dedup();
            ids
        })
    }

    // ---- alerts ----

    pub fn upsert_alert_rule(&self, rule: AlertRule) -> Result<(), StorageError> {
        self.commit(Record::AlertRuleUpserted { rule })
    }

    pub fn alert_rules(&self) -> Vec<AlertRule> {
        self.read(|s| s.alert_rules.values().cloned().collect())
    }

    pub fn append_alert_event(&self, event: AlertEvent) -> Result<(), StorageError> {
        self.commit(Record::AlertEventAppended { event })
    }

    pub fn alert_events(&self) -> Vec<AlertEvent> {
        self.read(|s| s.alert_events.clone())
    }

    // ---- instructions / settings ----

    pub fn put_instruction(
        &self,
        repo_id: &RepoId,
        name: &str,
        content: &str,
    ) -> Result<(), StorageError> {
        self.commit(Record::InstructionPut {
            repo_id: *repo_id,
            name: name.to_string(),
            content: content.to_string(),
        })
    }

    pub fn get_instruction(&self, repo_id: &RepoId, name: &str) -> Option<String> {
        self.read(|s| s.instructions.get(&scoped_key(repo_id.as_str(), name)).cloned())
    }

    pub fn put_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.commit(Record::SettingPut { key: key.to_string(), value: value.to_string() })
    }

    pub fn get_setting(&self, key: &str) -> Option<String> {
        self.read(|s| s.settings.get(key).cloned())
    }

    // ---- retention ----

    /// Delete structured rows of terminal runs older than `cutoff_ms`,
    /// skipping runs whose task id is excluded. Never touches active runs.
    /// Idempotent: a second pass over the same inputs deletes nothing.
    pub fn prune_structured(
        &self,
        cutoff_ms: u64,
        max_runs: usize,
        excluded_tasks: &[TaskId],
    ) -> Result<PruneReport, StorageError> {
        let mut report = PruneReport::default();
        let candidates: Vec<RunId> = self.read(|s| {
            let mut runs: Vec<&Run> = s
                .runs
                .values()
                .filter(|r| r.is_terminal())
                .filter(|r| r.ended_at_ms.unwrap_or(r.created_at_ms) < cutoff_ms)
                .collect();
            report.runs_scanned = runs.len();
            runs.sort_by_key(|r| r.ended_at_ms.unwrap_or(r.created_at_ms));
            runs.iter()
                .filter(|r| !excluded_tasks.contains(&r.task_id))
                // Only runs that still have rows to delete.
                .filter(|r| {
                    s.structured_events.contains_key(r.id.as_str())
                        || s.diff_snapshots.contains_key(r.id.as_str())
                        || s.tool_projections.contains_key(r.id.as_str())
                })
                .take(if max_runs == 0 { usize::MAX } else { max_runs })
                .map(|r| r.id)
                .collect()
        });

        for run_id in candidates {
            let (events, snapshots, projections) = self.read(|s| {
                (
                    s.structured_events.get(run_id.as_str()).map(Vec::len).unwrap_or(0),
                    usize::from(s.diff_snapshots.contains_key(run_id.as_str())),
                    s.tool_projections.get(run_id.as_str()).map(|m| m.len()).unwrap_or(0),
                )
            });
            self.commit(Record::StructuredPruned { run_id })?;
            report.runs_pruned += 1;
            report.events_deleted += events;
            report.snapshots_deleted += snapshots;
            report.projections_deleted += projections;
        }
        Ok(report)
    }
}

/// Non-terminal run counts along each cap dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActiveCounts {
    pub global: usize,
    pub project: usize,
    pub repo: usize,
    pub task: usize,
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
