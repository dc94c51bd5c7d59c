// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow definitions: DAGs of task, delay, and approval nodes.

use crate::task::TaskId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

crate::define_id! {
    /// Unique identifier for a workflow definition.
    pub struct WorkflowId("wfl-");
}

crate::define_id! {
    /// Unique identifier for one execution of a workflow.
    pub struct ExecutionId("exc-");
}

/// What one node does when reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Dispatch a run for the referenced task and wait for its terminal state.
    Task { task_id: TaskId },
    /// Sleep for the given duration.
    Delay { seconds: u64 },
    /// Park the execution until an operator with the role resolves it.
    Approval { approver_role: String },
    /// Marker splitting into parallel branches (edges carry the fan-out).
    ParallelFanOut,
    /// Merge point for upstream branches.
    Join,
}

/// One node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub name: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Failure of this node does not fail the execution.
    #[serde(default)]
    pub continue_on_error: bool,
}

/// Directed edge between two named nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
}

/// Structural problems found during validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow has no nodes")]
    Empty,

    #[error("duplicate node name {0:?}")]
    DuplicateNode(String),

    #[error("edge references unknown node {0:?}")]
    UnknownNode(String),

    #[error("workflow contains a cycle through {0:?}")]
    Cycle(String),

    #[error("workflow must have exactly one root, found {0}")]
    RootCount(usize),

    #[error("node {0:?} is unreachable from the root")]
    Unreachable(String),

    #[error("approval node {0:?} has no approver role")]
    MissingApprover(String),
}

/// A DAG of nodes with bounded-parallelism execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub id: WorkflowId,
    pub name: String,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_nodes: usize,
    pub enabled: bool,
}

fn default_max_concurrent() -> usize {
    4
}

impl WorkflowDef {
    /// Every task id referenced by a task node.
    pub fn referenced_tasks(&self) -> Vec<TaskId> {
        self.nodes
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Task { task_id } => Some(*task_id),
                _ => None,
            })
            .collect()
    }

    /// Structural validation: unique names, known edge endpoints, exactly
    /// one root, acyclic, all nodes reachable, approval nodes staffed.
    ///
    /// Task-node existence is checked by the executor against the store,
    /// not here — the definition alone cannot know the task table.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.nodes.is_empty() {
            return Err(WorkflowError::Empty);
        }

        let mut names = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(WorkflowError::DuplicateNode(node.name.clone()));
            }
            if let NodeKind::Approval { approver_role } = &node.kind {
                if approver_role.trim().is_empty() {
                    return Err(WorkflowError::MissingApprover(node.name.clone()));
                }
            }
        }

        for edge in &self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !names.contains(endpoint.as_str()) {
                    return Err(WorkflowError::UnknownNode(endpoint.clone()));
                }
            }
        }

        // Exactly one root (no incoming edges).
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.to.as_str()).collect();
        let roots: Vec<&str> = self
            .nodes
            .iter()
            .map(|n| n.name.as_str())
            .filter(|n| !targets.contains(n))
            .collect();
        if roots.len() != 1 {
            return Err(WorkflowError::RootCount(roots.len()));
        }
        let root = roots[0];

        // Kahn's algorithm detects cycles and yields reachability for free.
        let order = self.topological_order()?;

        let mut reachable = HashSet::from([root]);
        for name in &order {
            if reachable.contains(name.as_str()) {
                for edge in self.edges.iter().filter(|e| e.from == *name) {
                    reachable.insert(edge.to.as_str());
                }
            }
        }
        for node in &self.nodes {
            if !reachable.contains(node.name.as_str()) {
                return Err(WorkflowError::Unreachable(node.name.clone()));
            }
        }

        Ok(())
    }

    /// Topological order over node names; errors on a cycle.
    pub fn topological_order(&self) -> Result<Vec<String>, WorkflowError> {
        let mut in_degree: IndexMap<&str, usize> =
            self.nodes.iter().map(|n| (n.name.as_str(), 0)).collect();
        let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
            successors.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
        }

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(name) = ready.pop() {
            order.push(name.to_string());
            for next in successors.get(name).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(next);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = in_degree
                .iter()
                .find(|(_, d)| **d > 0)
                .map(|(n, _)| n.to_string())
                .unwrap_or_default();
            return Err(WorkflowError::Cycle(stuck));
        }
        Ok(order)
    }

    /// Names of nodes with an edge into `name`.
    pub fn predecessors(&self, name: &str) -> Vec<&str> {
        self.edges.iter().filter(|e| e.to == name).map(|e| e.from.as_str()).collect()
    }
}

/// State of one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Running,
    PendingApproval,
    Succeeded,
    Failed,
    Cancelled,
}

crate::simple_display! {
    ExecutionState {
        Running => "running",
        PendingApproval => "pending_approval",
        Succeeded => "succeeded",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Succeeded | ExecutionState::Failed | ExecutionState::Cancelled)
    }
}

/// One traversal of a workflow DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub state: ExecutionState,
    /// Node name → outcome ("succeeded" / "failed: …" / "skipped").
    #[serde(default)]
    pub node_results: Vec<(String, String)>,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    /// Node currently awaiting an approver, when `state == PendingApproval`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting_node: Option<String>,
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
