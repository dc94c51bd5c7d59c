// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run dispatch: admission, execution, and retries.
//!
//! Admission order is fixed: concurrency caps (global → project →
//! repository → task), then worker selection, then the durable run record.
//! Saturation defers the dispatch with jittered backoff instead of failing
//! it. Execution drives the container, the harness runtime, and the event
//! pipeline to a terminal state, then extracts artifacts and consults the
//! retry policy.

use crate::artifacts;
use crate::error::EngineError;
use crate::pipeline::{CompletionInfo, EventPipeline};
use crate::proxy::ProxyRouteManager;
use crate::signal::RunSignals;
use agd_core::{
    backoff_jitter_ms, classify_failure, Clock, ErrorClass, ExecutionMode, Finding, FindingId,
    FindingState, Redactor, Repository, Run, RunConfig, RunId, RunState, Severity, Task, TaskId,
    WorkerId, DEFAULT_HEARTBEAT_TIMEOUT_MS,
};
use agd_harness::container::{ContainerManager, ContainerSpec};
use agd_harness::{HarnessError, HarnessOutcome, HarnessRuntime, RunRequest, Transport};
use agd_storage::Store;
use agd_wire::EnvelopeStatus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

/// Produces the runtime for a harness tag. Tests inject scripted runtimes.
pub type RuntimeFactory = Arc<dyn Fn(&str) -> Arc<dyn HarnessRuntime> + Send + Sync>;

/// Worker id used when no remote workers are registered: the daemon host
/// itself runs the harness.
pub const LOCAL_WORKER: &str = "local";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub global_cap: usize,
    pub per_project_cap: usize,
    /// Default 1: the per-repository working tree is single-writer.
    pub per_repo_cap: usize,
    pub per_task_cap: usize,
    pub heartbeat_timeout_ms: u64,
    /// Base delay before a deferred dispatch is re-attempted.
    pub defer_delay: Duration,
    /// Jitter spread added to deferrals and retries.
    pub jitter_ms: u64,
    /// Grace window between SIGTERM and SIGKILL at teardown.
    pub container_grace: Duration,
    /// Harness image prefix; the tag is the harness name.
    pub image_prefix: String,
    /// Fallback workspace root for repositories without a local checkout.
    pub workspace_root: PathBuf,
    pub artifact_root: PathBuf,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            global_cap: 16,
            per_project_cap: 8,
            per_repo_cap: 1,
            per_task_cap: 1,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
            defer_delay: Duration::from_secs(3),
            jitter_ms: 1_000,
            container_grace: Duration::from_secs(10),
            image_prefix: "agd-harness".to_string(),
            workspace_root: PathBuf::from("/var/lib/agd/workspaces"),
            artifact_root: PathBuf::from("/var/lib/agd/artifacts"),
        }
    }
}

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Run admitted and executing.
    Started(RunId),
    /// Run persisted, awaiting a human approval.
    PendingApproval(RunId),
    /// Soft refusal: re-enqueued with backoff, not failed.
    Deferred { reason: String },
}

pub struct Dispatcher<C: Clock> {
    store: Arc<Store>,
    pipeline: Arc<EventPipeline<C>>,
    containers: Option<Arc<dyn ContainerManager>>,
    runtime_factory: RuntimeFactory,
    proxy: Option<Arc<ProxyRouteManager<C>>>,
    signals: RunSignals,
    clock: C,
    config: DispatcherConfig,
    run_cancels: Mutex<HashMap<RunId, CancellationToken>>,
    shutdown: CancellationToken,
}

impl<C: Clock> Dispatcher<C> {
    pub fn new(
        store: Arc<Store>,
        pipeline: Arc<EventPipeline<C>>,
        runtime_factory: RuntimeFactory,
        clock: C,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            containers: None,
            runtime_factory,
            proxy: None,
            signals: RunSignals::new(),
            clock,
            config,
            run_cancels: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_containers(mut self, containers: Arc<dyn ContainerManager>) -> Self {
        self.containers = Some(containers);
        self
    }

    pub fn with_proxy(mut self, proxy: Arc<ProxyRouteManager<C>>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn signals(&self) -> &RunSignals {
        &self.signals
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Cancel every in-flight run token and stop re-enqueue timers.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        for (_, token) in self.run_cancels.lock().iter() {
            token.cancel();
        }
    }

    /// Dispatch a task: admission, durable run record, execution handoff.
    pub async fn dispatch(
        self: &Arc<Self>,
        task_id: TaskId,
        mode_override: Option<ExecutionMode>,
        attempt: u32,
    ) -> Result<DispatchOutcome, EngineError> {
        let task = self
            .store
            .get_task(&task_id)
            .ok_or_else(|| EngineError::not_found("task", task_id.as_str()))?;
        if !task.enabled {
            return Err(EngineError::TaskDisabled(task_id.to_string()));
        }
        let repo = self
            .store
            .get_repository(&task.repo_id)
            .ok_or_else(|| EngineError::not_found("repository", task.repo_id.as_str()))?;

        let mode = task.effective_mode(mode_override);
        let run = Run::new(
            RunConfig {
                id: RunId::new(),
                task_id,
                repo_id: task.repo_id,
                project_id: repo.project_id,
                attempt,
                mode,
                initial_state: RunState::Queued,
            },
            self.clock.epoch_ms(),
        );

        // Admission before the record exists: a deferred dispatch leaves no
        // queued ghost behind.
        if let Some(reason) = self.admission_refusal(&run) {
            self.requeue_dispatch(task_id, mode_override, attempt, &reason);
            return Ok(DispatchOutcome::Deferred { reason });
        }

        if task.approval.required {
            let mut pending = run;
            pending.state = RunState::PendingApproval;
            let run_id = pending.id;
            self.store.create_run(pending)?;
            self.signals.publish(run_id, RunState::PendingApproval);
            info!(run_id = %run_id, task_id = %task_id, "run awaiting approval");
            return Ok(DispatchOutcome::PendingApproval(run_id));
        }

        // Durable dispatch intent: the queued record hits the WAL before
        // any container exists.
        let run_id = run.id;
        self.store.create_run(run.clone())?;
        self.signals.publish(run_id, RunState::Queued);
        self.start(run, task, repo).await?;
        Ok(DispatchOutcome::Started(run_id))
    }

    /// Resolve an approval gate.
    pub fn approve(
        self: &Arc<Self>,
        run_id: RunId,
        approve: bool,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), EngineError>> + Send>> {
        let this = Arc::clone(self);
        Box::pin(async move {
            let run = this
                .store
                .get_run(&run_id)
                .ok_or_else(|| EngineError::not_found("run", run_id.as_str()))?;
            if !approve {
                let run =
                    this.store.transition_run(&run_id, RunState::Cancelled, this.clock.epoch_ms(), Some("approval rejected".to_string()))?;
                this.signals.publish(run_id, run.state);
                return Ok(());
            }

            if let Some(reason) = this.admission_refusal(&run) {
                // Stay pending; try again shortly.
                let that = Arc::clone(&this);
                let delay = this.defer_delay(run_id.as_str(), 1);
                let shutdown = this.shutdown.clone();
                info!(%run_id, reason = %reason, "approved run deferred");
                tokio::spawn(async move {
                    tokio::select! {
                        () = shutdown.cancelled() => {}
                        () = tokio::time::sleep(delay) => {
                            if let Err(e) = that.approve(run_id, true).await {
                                warn!(%run_id, error = %e, "deferred approval start failed");
                            }
                        }
                    }
                });
                return Ok(());
            }

            let task = this
                .store
                .get_task(&run.task_id)
                .ok_or_else(|| EngineError::not_found("task", run.task_id.as_str()))?;
            let repo = this
                .store
                .get_repository(&run.repo_id)
                .ok_or_else(|| EngineError::not_found("repository", run.repo_id.as_str()))?;
            this.start(run, task, repo).await
        })
    }

    /// Cancel a run in any non-terminal state.
    pub async fn cancel(&self, run_id: RunId, reason: &str) -> Result<(), EngineError> {
        let run = self
            .store
            .get_run(&run_id)
            .ok_or_else(|| EngineError::not_found("run", run_id.as_str()))?;
        match run.state {
            RunState::Queued | RunState::PendingApproval => {
                let run = self.store.transition_run(
                    &run_id,
                    RunState::Cancelled,
                    self.clock.epoch_ms(),
                    Some(reason.to_string()),
                )?;
                self.signals.publish(run_id, run.state);
                Ok(())
            }
            RunState::Running => {
                // The structured cancel: close the runtime's stream, then
                // the execution path tears down the container and records
                // the cancelled state.
                let token = self.run_cancels.lock().get(&run_id).cloned();
                match token {
                    Some(token) => token.cancel(),
                    None => {
                        // No local execution (e.g. recovered foreign run):
                        // terminate directly.
                        if let Some(containers) = &self.containers {
                            let _ = containers
                                .stop_and_remove(run_id.as_str(), self.config.container_grace)
                                .await;
                        }
                        let run = self.store.transition_run(
                            &run_id,
                            RunState::Cancelled,
                            self.clock.epoch_ms(),
                            Some(reason.to_string()),
                        )?;
                        self.signals.publish(run_id, run.state);
                    }
                }
                Ok(())
            }
            _ => Err(agd_storage::StorageError::InvalidTransition(agd_core::TransitionError {
                from: run.state,
                to: RunState::Cancelled,
            })
            .into()),
        }
    }

    /// First saturated cap or missing worker, if any.
    fn admission_refusal(&self, run: &Run) -> Option<String> {
        let counts = self.store.active_run_counts(run);
        let caps = [
            (counts.global, self.config.global_cap, "global"),
            (counts.project, self.config.per_project_cap, "project"),
            (counts.repo, self.config.per_repo_cap, "repository"),
            (counts.task, self.config.per_task_cap, "task"),
        ];
        for (active, cap, scope) in caps {
            if cap > 0 && active >= cap {
                return Some(format!("{scope} concurrency cap reached ({active}/{cap})"));
            }
        }
        if self.select_worker().is_none() {
            return Some("no healthy worker".to_string());
        }
        None
    }

    /// Healthy worker with the fewest active slots; ties break toward the
    /// least-recently-assigned, then the smaller id. With no workers
    /// registered at all, the daemon host itself serves as the implicit
    /// local worker.
    fn select_worker(&self) -> Option<WorkerId> {
        let now = self.clock.epoch_ms();
        if self.store.list_workers().is_empty() {
            return Some(WorkerId::new(LOCAL_WORKER));
        }
        self.store
            .selectable_workers(now, self.config.heartbeat_timeout_ms)
            .first()
            .map(|w| w.id.clone())
    }

    async fn start(self: &Arc<Self>, run: Run, task: Task, repo: Repository) -> Result<(), EngineError> {
        let run_id = run.id;
        let worker_id = self
            .select_worker()
            .ok_or_else(|| EngineError::Internal("worker vanished after admission".to_string()))?;

        let now = self.clock.epoch_ms();
        self.store.transition_run(&run_id, RunState::Running, now, None)?;
        self.store.assign_worker(&run_id, &worker_id, now)?;
        self.signals.publish(run_id, RunState::Running);

        let token = CancellationToken::new();
        self.run_cancels.lock().insert(run_id, token.clone());

        let this = Arc::clone(self);
        let span = tracing::info_span!("run.execute", run_id = %run_id, task_id = %task.id, harness = %task.harness);
        tokio::spawn(
            async move {
                let started = std::time::Instant::now();
                let result = this.execute(&run, &task, &repo, token).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                this.run_cancels.lock().remove(&run_id);
                match result {
                    Ok(state) => info!(%run_id, %state, elapsed_ms, "run finished"),
                    Err(e) => {
                        error!(%run_id, elapsed_ms, error = %e, "run execution failed internally");
                        this.record_internal_failure(&run, &e).await;
                    }
                }
            }
            .instrument(span),
        );
        Ok(())
    }

    /// Drive one admitted run to a terminal state.
    async fn execute(
        self: &Arc<Self>,
        run: &Run,
        task: &Task,
        repo: &Repository,
        cancel: CancellationToken,
    ) -> Result<RunState, EngineError> {
        let run_id = run.id;
        let workspace = if repo.checkout_path.as_os_str().is_empty() {
            self.config.workspace_root.join(run_id.as_str())
        } else {
            repo.checkout_path.clone()
        };

        let mut env: HashMap<String, String> = HashMap::new();
        env.insert("AGD_RUN_ID".to_string(), run_id.to_string());
        env.insert("TASK_MODE".to_string(), run.mode.to_string());
        let mut redactor = Redactor::with_env(&env);
        // Secrets decrypt at dispatch time; their plaintext registers with
        // the redactor before anything can echo it.
        for provider in ["openai", "anthropic", "opencode", "zai"] {
            if let Some(secret) = self.store.get_secret(&repo.id, provider) {
                redactor.add_value(secret.encrypted_value);
            }
        }

        // With containers enabled, SSE harnesses run their embedded server
        // as the container command; stdio/subprocess harnesses get a
        // keepalive container and are driven through `docker exec`, so the
        // runtime's pipes reach the sandboxed process.
        let transport = Transport::for_harness(&task.harness);
        let container_name = if let Some(containers) = &self.containers {
            let command = match transport {
                Transport::Sse => {
                    task.command.split_whitespace().map(str::to_string).collect()
                }
                _ => vec!["sleep".to_string(), "infinity".to_string()],
            };
            let spec = ContainerSpec {
                run_id,
                task_id: task.id,
                repo_id: repo.id,
                project_id: repo.project_id,
                image: format!("{}:{}", self.config.image_prefix, task.harness),
                command,
                env: env.clone(),
                workspace_host_path: workspace.clone(),
                sandbox: task.sandbox.clone(),
            };
            containers.create_and_start(&spec).await?;
            Some(spec.container_name().to_string())
        } else {
            None
        };

        let command = match (&container_name, transport) {
            (Some(name), Transport::Stdio | Transport::Subprocess) => {
                format!("docker exec -i -w /workspace {name} {}", task.command)
            }
            _ => task.command.clone(),
        };
        let request = RunRequest {
            run_id,
            harness: task.harness.clone(),
            prompt: task.prompt.clone(),
            command,
            custom_args: Vec::new(),
            mode: run.mode,
            env,
            workspace: workspace.clone(),
            timeout: Duration::from_secs(task.timeouts.stage_total_secs),
            endpoint: self.store.get_setting(&format!("harness.{}.endpoint", task.harness)),
        };

        let runtime = (self.runtime_factory)(&task.harness);
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(256);

        // Single consumer per run keeps sequence allocation ordered.
        let pipeline = Arc::clone(&self.pipeline);
        let ingest_redactor = redactor.clone();
        let ingest_task = tokio::spawn(async move {
            let mut completion: Option<CompletionInfo> = None;
            while let Some(chunk) = chunk_rx.recv().await {
                match pipeline.ingest(run_id, &chunk, &ingest_redactor) {
                    Ok(Some(info)) => completion = Some(info),
                    Ok(None) => {}
                    Err(e) => warn!(%run_id, error = %e, "chunk ingest failed"),
                }
            }
            completion
        });

        let outcome = runtime.run(request, chunk_tx, cancel.clone()).await;
        let completion = ingest_task.await.unwrap_or_default();

        // Teardown before finalisation so a crash here at worst leaks a
        // labelled container the reconciler will sweep.
        if let (Some(containers), Some(name)) = (&self.containers, &container_name) {
            if let Err(e) = containers.stop_and_remove(name, self.config.container_grace).await {
                warn!(%run_id, error = %e, "container teardown failed");
            }
        }
        if let Some(proxy) = &self.proxy {
            proxy.remove_run_routes(&run_id);
        }

        let state = self.finalize(run, task, &redactor, outcome, completion).await?;
        Ok(state)
    }

    /// Map the runtime outcome onto a terminal state, persist envelope
    /// fields, extract artifacts, and schedule a retry when warranted.
    async fn finalize(
        self: &Arc<Self>,
        run: &Run,
        task: &Task,
        redactor: &Redactor,
        outcome: Result<HarnessOutcome, HarnessError>,
        completion: Option<CompletionInfo>,
    ) -> Result<RunState, EngineError> {
        let run_id = run.id;
        let now = self.clock.epoch_ms();

        let (state, summary, error_text, class, envelope_json) = match outcome {
            Ok(outcome) => {
                let envelope = &outcome.envelope;
                let exit_ok = outcome.exit_code.unwrap_or(0) == 0;
                let state = match envelope.status {
                    EnvelopeStatus::Succeeded if exit_ok => RunState::Succeeded,
                    EnvelopeStatus::Cancelled => RunState::Cancelled,
                    _ => RunState::Failed,
                };
                let summary = completion
                    .as_ref()
                    .and_then(|c| c.summary.clone())
                    .or_else(|| (!envelope.summary.is_empty()).then(|| envelope.summary.clone()));
                let error_text = (!envelope.error.is_empty()).then(|| envelope.error.clone());
                let class = (state == RunState::Failed).then(|| {
                    classify_failure(envelope.error.as_str(), outcome.exit_code)
                });
                let envelope_json = serde_json::to_value(envelope).ok().map(|v| {
                    // Belt and braces: the envelope came from harness output
                    // that already passed the runtime unredacted.
                    let text = redactor.redact(&v.to_string(), &[]);
                    serde_json::from_str(&text).unwrap_or(v)
                });
                (state, summary, error_text, class, envelope_json)
            }
            Err(HarnessError::Cancelled) => {
                (RunState::Cancelled, None, None, None, None)
            }
            Err(e) => {
                let class = e.class();
                (RunState::Failed, None, Some(e.to_string()), Some(class), None)
            }
        };

        let reason = match state {
            RunState::Cancelled => Some("cancelled".to_string()),
            RunState::Failed if class == Some(ErrorClass::Timeout) => Some("Timeout".to_string()),
            _ => None,
        };
        self.store.transition_run(&run_id, state, now, reason)?;
        self.store.finalize_run(
            &run_id,
            summary.map(|s| redactor.redact(&s, &[])),
            error_text.map(|e| redactor.redact(&e, &[])),
            class,
            envelope_json,
        )?;
        self.signals.publish(run_id, state);

        // Artifacts are extracted for every completed run, success or not.
        let workspace = self
            .store
            .get_repository(&run.repo_id)
            .map(|r| r.checkout_path)
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| self.config.workspace_root.join(run_id.as_str()));
        let extracted = artifacts::extract(
            run_id,
            &workspace,
            &task.artifacts,
            &self.config.artifact_root,
        );
        self.store.add_artifacts(&run_id, extracted)?;

        if state == RunState::Failed {
            self.maybe_retry(task, run, class);
        }
        Ok(state)
    }

    /// Schedule a retry when the failure class allows it and attempts
    /// remain. Delay is `base × multiplier^(attempt-1)` capped, raised to
    /// the class backoff hint, plus jitter.
    fn maybe_retry(self: &Arc<Self>, task: &Task, run: &Run, class: Option<ErrorClass>) {
        let Some(class) = class else { return };
        if !class.is_retryable() || !task.retry.attempts_remaining(run.attempt) {
            return;
        }
        let next_attempt = run.attempt + 1;
        let delay = task.retry.delay_with_hint(next_attempt, class.backoff_hint());
        let jitter =
            Duration::from_millis(backoff_jitter_ms(run.id.as_str(), next_attempt, self.config.jitter_ms));
        let task_id = task.id;
        let this = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        info!(run_id = %run.id, %class, next_attempt, delay_ms = delay.as_millis() as u64, "scheduling retry");
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(delay + jitter) => {
                    if let Err(e) = this.dispatch(task_id, None, next_attempt).await {
                        warn!(%task_id, error = %e, "retry dispatch failed");
                    }
                }
            }
        });
    }

    /// Soft deferral: try the same dispatch again after a jittered delay.
    fn requeue_dispatch(
        self: &Arc<Self>,
        task_id: TaskId,
        mode_override: Option<ExecutionMode>,
        attempt: u32,
        reason: &str,
    ) {
        let delay = self.defer_delay(task_id.as_str(), attempt);
        let this = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        info!(%task_id, reason, delay_ms = delay.as_millis() as u64, "dispatch deferred");
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if let Err(e) = this.dispatch(task_id, mode_override, attempt).await {
                        warn!(%task_id, error = %e, "re-enqueued dispatch failed");
                    }
                }
            }
        });
    }

    fn defer_delay(&self, seed: &str, attempt: u32) -> Duration {
        self.config.defer_delay
            + Duration::from_millis(backoff_jitter_ms(seed, attempt, self.config.jitter_ms))
    }

    /// An engine-internal failure creates a high-severity finding on the
    /// owning repository so silent breakage surfaces in triage.
    async fn record_internal_failure(&self, run: &Run, error: &EngineError) {
        let _ = self.store.transition_run(
            &run.id,
            RunState::Failed,
            self.clock.epoch_ms(),
            Some(format!("internal: {error}")),
        );
        self.signals.publish(run.id, RunState::Failed);
        let finding = Finding {
            id: FindingId::new(),
            repo_id: run.repo_id,
            run_id: Some(run.id),
            state: FindingState::New,
            severity: Severity::High,
            title: "run engine internal error".to_string(),
            description: error.to_string(),
            assignee: None,
            created_at_ms: self.clock.epoch_ms(),
        };
        if let Err(e) = self.store.create_finding(finding) {
            error!(run_id = %run.id, error = %e, "failed to record internal-error finding");
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
