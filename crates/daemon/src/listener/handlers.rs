// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request handlers behind the IPC listener.

use super::Ctx;
use agd_core::{RunId, Worker};
use agd_engine::{DispatchOutcome, EngineError};
use agd_wire::{
    write_message, EventRow, FindingSummary, FramingError, Request, Response, RunDetail,
    RunSummary, TaskSummary, WorkerSummary,
};
use tokio::net::UnixStream;
use tracing::warn;

fn epoch_ms_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn error_response(e: &EngineError) -> Response {
    Response::Error { class: e.class().to_string(), message: e.to_string() }
}

fn storage_error_response(e: agd_storage::StorageError) -> Response {
    error_response(&EngineError::from(e))
}

pub(super) async fn handle(ctx: &Ctx, request: Request) -> Response {
    match request {
        Request::TriggerTask { task_id, mode } => {
            match ctx.dispatcher.dispatch(task_id, mode, 1).await {
                Ok(DispatchOutcome::Started(run_id))
                | Ok(DispatchOutcome::PendingApproval(run_id)) => Response::RunStarted { run_id },
                Ok(DispatchOutcome::Deferred { reason }) => Response::RunDeferred { reason },
                Err(e) => error_response(&e),
            }
        }

        Request::CancelRun { run_id } => match ctx.dispatcher.cancel(run_id, "operator cancel").await
        {
            Ok(()) => Response::Ok,
            Err(e) => error_response(&e),
        },

        // The control-plane spelling of a cancel, as sent to runtime hosts.
        Request::CancelJob { run_id } => {
            match ctx.dispatcher.cancel(run_id, "control-plane cancel").await {
                Ok(()) => Response::Ok,
                Err(e) => error_response(&e),
            }
        }

        Request::ApproveRun { run_id, approve } => {
            match ctx.dispatcher.approve(run_id, approve).await {
                Ok(()) => Response::Ok,
                Err(e) => error_response(&e),
            }
        }

        Request::ListQuestions => {
            let questions = ctx
                .store
                .pending_questions()
                .into_iter()
                .map(|q| agd_wire::QuestionSummary {
                    id: q.id.to_string(),
                    run_id: q.run_id,
                    task_id: q.task_id,
                    header: q
                        .questions
                        .first()
                        .map(|entry| entry.header.clone())
                        .unwrap_or_default(),
                    question_count: q.questions.len(),
                })
                .collect();
            Response::Questions { questions }
        }

        Request::AnswerQuestion { question_id, answers } => {
            match ctx.store.answer_question(&question_id, answers, None, epoch_ms_now()) {
                Ok(()) => Response::Ok,
                Err(e) => storage_error_response(e),
            }
        }

        Request::ListTasks { repo_id } => {
            let tasks = ctx
                .store
                .list_tasks(repo_id.as_ref())
                .into_iter()
                .map(|t| TaskSummary {
                    id: t.id,
                    repo_id: t.repo_id,
                    kind: t.kind,
                    harness: t.harness,
                    mode: t.mode,
                    enabled: t.enabled,
                    cron_expr: t.cron_expr,
                    next_scheduled_at_ms: t.next_scheduled_at_ms,
                })
                .collect();
            Response::Tasks { tasks }
        }

        Request::ListRuns { task_id, limit } => {
            let runs = ctx
                .store
                .list_runs(task_id.as_ref(), if limit == 0 { 50 } else { limit })
                .into_iter()
                .map(run_summary)
                .collect();
            Response::Runs { runs }
        }

        Request::GetRun { run_id } => match ctx.store.get_run(&run_id) {
            Some(run) => {
                let artifact_count = ctx.store.artifacts_for(&run_id).len();
                Response::Run {
                    run: Box::new(RunDetail {
                        summary: run_summary(run.clone()),
                        worker_id: run.worker_id,
                        error: run.error,
                        reason: run.reason,
                        envelope: run.envelope,
                        artifact_count,
                    }),
                }
            }
            None => error_response(&EngineError::not_found("run", run_id.as_str())),
        },

        Request::GetRunEvents { run_id, since_sequence } => {
            let events = ctx
                .store
                .structured_events(&run_id, since_sequence)
                .into_iter()
                .map(event_row)
                .collect();
            Response::Events { events }
        }

        Request::ListFindings { repo_id } => {
            let findings = ctx
                .store
                .list_findings(repo_id.as_ref())
                .into_iter()
                .map(|f| FindingSummary {
                    id: f.id.to_string(),
                    repo_id: f.repo_id,
                    state: f.state,
                    severity: f.severity,
                    title: f.title,
                    run_id: f.run_id,
                })
                .collect();
            Response::Findings { findings }
        }

        Request::ResolveFinding { finding_id, state } => {
            match ctx.store.set_finding_state(&finding_id, state) {
                Ok(()) => Response::Ok,
                Err(e) => storage_error_response(e),
            }
        }

        Request::ListWorkers => {
            let now = epoch_ms_now();
            let workers = ctx
                .store
                .list_workers()
                .into_iter()
                .map(|w| WorkerSummary {
                    healthy: w.is_healthy(now, ctx.heartbeat_timeout_ms),
                    id: w.id,
                    endpoint: w.endpoint,
                    active_slots: w.active_slots,
                    max_slots: w.max_slots,
                    last_heartbeat_ms: w.last_heartbeat_ms,
                })
                .collect();
            Response::Workers { workers }
        }

        Request::Heartbeat { worker_id, endpoint, active_slots, max_slots } => {
            let now = epoch_ms_now();
            let worker = Worker {
                id: worker_id,
                endpoint,
                active_slots,
                max_slots,
                last_heartbeat_ms: now,
                last_assigned_ms: 0,
            };
            match ctx.store.worker_heartbeat(worker) {
                Ok(()) => Response::Ok,
                Err(e) => storage_error_response(e),
            }
        }

        Request::KillContainer { run_id } => match &ctx.containers {
            Some(containers) => {
                match containers
                    .stop_and_remove(run_id.as_str(), std::time::Duration::from_secs(5))
                    .await
                {
                    Ok(()) => Response::Ok,
                    Err(e) => Response::Error {
                        class: "internal_error".to_string(),
                        message: e.to_string(),
                    },
                }
            }
            None => Response::Error {
                class: "configuration_error".to_string(),
                message: "container isolation disabled".to_string(),
            },
        },

        Request::ReconcileOrphanedContainers => {
            match agd_engine::recovery::reconcile(
                &ctx.store,
                ctx.containers.as_ref(),
                &agd_core::SystemClock,
            )
            .await
            {
                Ok(report) => Response::Reconciled { report },
                Err(e) => error_response(&e),
            }
        }

        Request::RunWorkflow { workflow_id } => {
            let id = agd_core::WorkflowId::from_string(&workflow_id);
            if ctx.store.get_workflow(id.as_str()).is_none() {
                return error_response(&EngineError::not_found("workflow", workflow_id));
            }
            let workflows = ctx.workflows.clone();
            let cancel = ctx.shutdown.child_token();
            tokio::spawn(async move {
                if let Err(e) = workflows.execute(id, cancel).await {
                    warn!(workflow_id = %id, error = %e, "workflow execution failed");
                }
            });
            Response::ExecutionStarted { workflow_id }
        }

        Request::ResolveWorkflowApproval { execution_id, approve } => {
            if ctx.workflows.resolve_approval(&execution_id, approve) {
                Response::Ok
            } else {
                error_response(&EngineError::not_found("pending approval", execution_id))
            }
        }

        Request::DaemonStatus => Response::Status {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: ctx.started_at.elapsed().as_secs(),
            queued_runs: ctx.store.queued_run_count(),
            active_runs: ctx.store.active_runs().len(),
            workers: ctx.store.list_workers().len(),
        },

        Request::DispatchJob(_) => Response::Error {
            class: "invalid_input".to_string(),
            message: "dispatch_job is sent by the control plane, not received".to_string(),
        },

        // Handled by the connection loop before reaching here.
        Request::SubscribeEvents { .. } | Request::Shutdown => Response::Ok,
    }
}

fn run_summary(run: agd_core::Run) -> RunSummary {
    RunSummary {
        id: run.id,
        task_id: run.task_id,
        state: run.state,
        attempt: run.attempt,
        mode: run.mode,
        created_at_ms: run.created_at_ms,
        ended_at_ms: run.ended_at_ms,
        summary: run.summary,
    }
}

fn event_row(event: agd_core::StructuredEvent) -> EventRow {
    EventRow {
        sequence: event.sequence,
        category: event.category,
        event_type: event.event_type.to_string(),
        payload: event.payload,
        at_ms: event.at_ms,
    }
}

/// Backfill persisted events, then stream live ones until the client
/// hangs up or the run's stream goes quiet at a terminal state.
pub(super) async fn stream_events(
    stream: &mut UnixStream,
    ctx: &Ctx,
    run_id: RunId,
) -> Result<(), FramingError> {
    let mut live = ctx.pipeline.subscribe();
    let backfill = ctx.store.structured_events(&run_id, 0);
    let mut last_sequence = backfill.last().map(|e| e.sequence).unwrap_or(0);
    write_message(
        stream,
        &Response::Events { events: backfill.into_iter().map(event_row).collect() },
    )
    .await?;

    loop {
        let event = tokio::select! {
            () = ctx.shutdown.cancelled() => return Ok(()),
            event = live.recv() => event,
        };
        match event {
            Ok(event) if event.run_id == run_id => {
                if event.sequence <= last_sequence {
                    continue;
                }
                last_sequence = event.sequence;
                write_message(stream, &Response::Events { events: vec![event_row(event)] })
                    .await?;
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                warn!(%run_id, missed, "event subscriber lagged, resyncing from store");
                let resync = ctx.store.structured_events(&run_id, last_sequence);
                if let Some(tail) = resync.last() {
                    last_sequence = tail.sequence;
                }
                write_message(
                    stream,
                    &Response::Events { events: resync.into_iter().map(event_row).collect() },
                )
                .await?;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}
