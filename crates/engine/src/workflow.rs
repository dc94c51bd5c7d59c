// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow DAG execution.
//!
//! Nodes run in topological order with bounded parallelism. Task nodes
//! dispatch a run and wait for its terminal state, delay nodes sleep,
//! approval nodes park the execution until an operator resolves them.
//! Failure of any node not marked `continue_on_error` fails the execution.

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::EngineError;
use agd_core::{
    Clock, ExecutionId, ExecutionState, NodeKind, RunId, RunState, WorkflowDef,
    WorkflowExecution, WorkflowId, WorkflowNode,
};
use agd_storage::Store;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Node completion record.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeOutcome {
    Succeeded,
    Failed(String),
    Skipped,
}

impl NodeOutcome {
    fn label(&self) -> String {
        match self {
            NodeOutcome::Succeeded => "succeeded".to_string(),
            NodeOutcome::Failed(reason) => format!("failed: {reason}"),
            NodeOutcome::Skipped => "skipped".to_string(),
        }
    }
}

pub struct WorkflowExecutor<C: Clock> {
    store: Arc<Store>,
    dispatcher: Arc<Dispatcher<C>>,
    clock: C,
    approvals: Mutex<HashMap<String, oneshot::Sender<bool>>>,
    /// Poll fallback when waiting on run terminal states.
    poll_interval: Duration,
}

impl<C: Clock> WorkflowExecutor<C> {
    pub fn new(store: Arc<Store>, dispatcher: Arc<Dispatcher<C>>, clock: C) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            approvals: Mutex::new(HashMap::new()),
            poll_interval: Duration::from_millis(200),
        }
    }

    /// Resolve a parked approval node. Returns false when nothing waits
    /// under that execution id.
    pub fn resolve_approval(&self, execution_id: &str, approve: bool) -> bool {
        match self.approvals.lock().remove(execution_id) {
            Some(sender) => sender.send(approve).is_ok(),
            None => false,
        }
    }

    /// Execute a workflow to completion.
    pub async fn execute(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
        cancel: CancellationToken,
    ) -> Result<WorkflowExecution, EngineError> {
        let def = self
            .store
            .get_workflow(workflow_id.as_str())
            .ok_or_else(|| EngineError::not_found("workflow", workflow_id.as_str()))?;
        def.validate()?;
        for task_id in def.referenced_tasks() {
            if self.store.get_task(&task_id).is_none() {
                return Err(EngineError::not_found("task", task_id.as_str()));
            }
        }

        let mut execution = WorkflowExecution {
            id: ExecutionId::new(),
            workflow_id,
            state: ExecutionState::Running,
            node_results: Vec::new(),
            started_at_ms: self.clock.epoch_ms(),
            ended_at_ms: None,
            awaiting_node: None,
        };
        self.store.upsert_execution(execution.clone())?;
        info!(execution_id = %execution.id, workflow = %def.name, "workflow execution started");

        let outcome = self.traverse(&def, &mut execution, &cancel).await;

        execution.state = match outcome {
            Ok(true) => ExecutionState::Succeeded,
            Ok(false) => ExecutionState::Failed,
            Err(_) if cancel.is_cancelled() => ExecutionState::Cancelled,
            Err(_) => ExecutionState::Failed,
        };
        execution.awaiting_node = None;
        execution.ended_at_ms = Some(self.clock.epoch_ms());
        self.store.upsert_execution(execution.clone())?;
        info!(execution_id = %execution.id, state = %execution.state, "workflow execution finished");
        outcome?;
        Ok(execution)
    }

    /// Bounded-parallel traversal. Returns whether every required node
    /// succeeded.
    async fn traverse(
        self: &Arc<Self>,
        def: &WorkflowDef,
        execution: &mut WorkflowExecution,
        cancel: &CancellationToken,
    ) -> Result<bool, EngineError> {
        let order = def.topological_order()?;
        let nodes: HashMap<&str, &WorkflowNode> =
            def.nodes.iter().map(|n| (n.name.as_str(), n)).collect();

        let mut outcomes: HashMap<String, NodeOutcome> = HashMap::new();
        let mut running: tokio::task::JoinSet<(String, NodeOutcome)> = tokio::task::JoinSet::new();
        let mut started: HashSet<String> = HashSet::new();
        let mut hard_failure = false;

        loop {
            // Launch every ready node up to the parallelism bound.
            for name in &order {
                if running.len() >= def.max_concurrent_nodes.max(1) {
                    break;
                }
                if started.contains(name) || outcomes.contains_key(name) {
                    continue;
                }
                let preds = def.predecessors(name);
                let preds_done = preds.iter().all(|p| outcomes.contains_key(*p));
                if !preds_done {
                    continue;
                }
                let node = match nodes.get(name.as_str()) {
                    Some(node) => (*node).clone(),
                    None => continue,
                };

                // Downstream of a hard failure: skip instead of running.
                let upstream_failed = preds.iter().any(|p| {
                    matches!(outcomes.get(*p), Some(NodeOutcome::Failed(_)))
                        && !nodes.get(*p).map(|n| n.continue_on_error).unwrap_or(false)
                });
                if hard_failure || upstream_failed {
                    outcomes.insert(name.clone(), NodeOutcome::Skipped);
                    execution.node_results.push((name.clone(), NodeOutcome::Skipped.label()));
                    continue;
                }

                started.insert(name.clone());
                let this = Arc::clone(self);
                let node_name = name.clone();
                let execution_id = execution.id;
                let node_cancel = cancel.clone();
                running.spawn(async move {
                    let outcome = this.run_node(&node, execution_id, &node_cancel).await;
                    (node_name, outcome)
                });
            }

            if running.is_empty() {
                break;
            }

            // Approval nodes flip the persisted state while they wait.
            let waiting_approval = started
                .iter()
                .filter(|n| !outcomes.contains_key(n.as_str()))
                .any(|n| matches!(nodes.get(n.as_str()).map(|node| &node.kind), Some(NodeKind::Approval { .. })));
            if waiting_approval && execution.state != ExecutionState::PendingApproval {
                execution.state = ExecutionState::PendingApproval;
                self.store.upsert_execution(execution.clone())?;
            }

            let joined = tokio::select! {
                () = cancel.cancelled() => {
                    running.abort_all();
                    return Err(EngineError::Internal("workflow cancelled".to_string()));
                }
                joined = running.join_next() => joined,
            };
            let Some(joined) = joined else { break };
            let (name, outcome) = joined
                .map_err(|e| EngineError::Internal(format!("workflow node panicked: {e}")))?;

            if let NodeOutcome::Failed(reason) = &outcome {
                let continue_on_error =
                    nodes.get(name.as_str()).map(|n| n.continue_on_error).unwrap_or(false);
                if !continue_on_error {
                    warn!(node = %name, reason = %reason, "workflow node failed");
                    hard_failure = true;
                }
            }
            execution.node_results.push((name.clone(), outcome.label()));
            outcomes.insert(name, outcome);

            if execution.state == ExecutionState::PendingApproval {
                execution.state = ExecutionState::Running;
            }
            self.store.upsert_execution(execution.clone())?;
        }

        Ok(!hard_failure)
    }

    async fn run_node(
        self: &Arc<Self>,
        node: &WorkflowNode,
        execution_id: ExecutionId,
        cancel: &CancellationToken,
    ) -> NodeOutcome {
        match &node.kind {
            NodeKind::ParallelFanOut | NodeKind::Join => NodeOutcome::Succeeded,

            NodeKind::Delay { seconds } => {
                tokio::select! {
                    () = cancel.cancelled() => NodeOutcome::Failed("cancelled".to_string()),
                    () = tokio::time::sleep(Duration::from_secs(*seconds)) => NodeOutcome::Succeeded,
                }
            }

            NodeKind::Approval { approver_role } => {
                let (sender, receiver) = oneshot::channel();
                self.approvals.lock().insert(execution_id.to_string(), sender);
                info!(%execution_id, approver_role = %approver_role, node = %node.name, "workflow awaiting approval");
                tokio::select! {
                    () = cancel.cancelled() => NodeOutcome::Failed("cancelled".to_string()),
                    decision = receiver => match decision {
                        Ok(true) => NodeOutcome::Succeeded,
                        Ok(false) => NodeOutcome::Failed("approval rejected".to_string()),
                        Err(_) => NodeOutcome::Failed("approval channel dropped".to_string()),
                    },
                }
            }

            NodeKind::Task { task_id } => {
                // Deferrals re-enqueue inside the dispatcher without a run
                // id, so the node retries the dispatch itself.
                let run_id = loop {
                    match self.dispatcher.dispatch(*task_id, None, 1).await {
                        Ok(DispatchOutcome::Started(run_id))
                        | Ok(DispatchOutcome::PendingApproval(run_id)) => break run_id,
                        Ok(DispatchOutcome::Deferred { .. }) => {
                            tokio::select! {
                                () = cancel.cancelled() => {
                                    return NodeOutcome::Failed("cancelled".to_string());
                                }
                                () = tokio::time::sleep(self.poll_interval) => {}
                            }
                        }
                        Err(e) => return NodeOutcome::Failed(e.to_string()),
                    }
                };
                self.wait_for_terminal(run_id, cancel).await
            }
        }
    }

    async fn wait_for_terminal(&self, run_id: RunId, cancel: &CancellationToken) -> NodeOutcome {
        let mut signals = self.dispatcher.signals().subscribe();
        loop {
            if let Some(run) = self.store.get_run(&run_id) {
                if run.is_terminal() {
                    return match run.state {
                        RunState::Succeeded => NodeOutcome::Succeeded,
                        RunState::Cancelled => NodeOutcome::Failed("run cancelled".to_string()),
                        _ => NodeOutcome::Failed(
                            run.error.or(run.reason).unwrap_or_else(|| "run failed".to_string()),
                        ),
                    };
                }
            }
            tokio::select! {
                () = cancel.cancelled() => return NodeOutcome::Failed("cancelled".to_string()),
                _ = signals.recv() => {}
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
