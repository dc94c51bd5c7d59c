// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for workflow graph validation.

use crate::workflow::{
    NodeKind, WorkflowDef, WorkflowEdge, WorkflowError, WorkflowNode,
};

fn node(name: &str, kind: NodeKind) -> WorkflowNode {
    WorkflowNode { name: name.to_string(), kind, continue_on_error: false }
}

fn edge(from: &str, to: &str) -> WorkflowEdge {
    WorkflowEdge { from: from.to_string(), to: to.to_string() }
}

fn workflow(nodes: Vec<WorkflowNode>, edges: Vec<WorkflowEdge>) -> WorkflowDef {
    WorkflowDef {
        id: "wfl-test0001".into(),
        name: "test".to_string(),
        nodes,
        edges,
        max_concurrent_nodes: 4,
        enabled: true,
    }
}

fn task_node(name: &str) -> WorkflowNode {
    node(name, NodeKind::Task { task_id: "tsk-a".into() })
}

#[test]
fn linear_chain_validates() {
    let wf = workflow(
        vec![task_node("a"), node("wait", NodeKind::Delay { seconds: 5 }), task_node("b")],
        vec![edge("a", "wait"), edge("wait", "b")],
    );
    assert!(wf.validate().is_ok());
    assert_eq!(wf.topological_order().unwrap().len(), 3);
}

#[test]
fn diamond_with_join_validates() {
    let wf = workflow(
        vec![
            node("split", NodeKind::ParallelFanOut),
            task_node("left"),
            task_node("right"),
            node("merge", NodeKind::Join),
        ],
        vec![edge("split", "left"), edge("split", "right"), edge("left", "merge"), edge("right", "merge")],
    );
    assert!(wf.validate().is_ok());
    let order = wf.topological_order().unwrap();
    let pos = |n: &str| order.iter().position(|o| o == n).unwrap();
    assert!(pos("split") < pos("left"));
    assert!(pos("split") < pos("right"));
    assert!(pos("left") < pos("merge"));
    assert!(pos("right") < pos("merge"));
}

#[test]
fn empty_workflow_rejected() {
    assert_eq!(workflow(vec![], vec![]).validate(), Err(WorkflowError::Empty));
}

#[test]
fn duplicate_names_rejected() {
    let wf = workflow(vec![task_node("a"), task_node("a")], vec![]);
    assert_eq!(wf.validate(), Err(WorkflowError::DuplicateNode("a".to_string())));
}

#[test]
fn unknown_edge_endpoint_rejected() {
    let wf = workflow(vec![task_node("a")], vec![edge("a", "ghost")]);
    assert_eq!(wf.validate(), Err(WorkflowError::UnknownNode("ghost".to_string())));
}

#[test]
fn cycle_rejected() {
    let wf = workflow(
        vec![task_node("a"), task_node("b")],
        vec![edge("a", "b"), edge("b", "a")],
    );
    // A full cycle also means no root.
    assert!(matches!(wf.validate(), Err(WorkflowError::RootCount(0)) | Err(WorkflowError::Cycle(_))));

    let wf = workflow(
        vec![task_node("root"), task_node("a"), task_node("b")],
        vec![edge("root", "a"), edge("a", "b"), edge("b", "a")],
    );
    assert!(matches!(wf.validate(), Err(WorkflowError::Cycle(_))));
}

#[test]
fn multiple_roots_rejected() {
    let wf = workflow(vec![task_node("a"), task_node("b")], vec![]);
    assert_eq!(wf.validate(), Err(WorkflowError::RootCount(2)));
}

#[test]
fn approval_without_role_rejected() {
    let wf = workflow(
        vec![node("gate", NodeKind::Approval { approver_role: "  ".to_string() })],
        vec![],
    );
    assert_eq!(wf.validate(), Err(WorkflowError::MissingApprover("gate".to_string())));
}

#[test]
fn referenced_tasks_collects_task_nodes_only() {
    let wf = workflow(
        vec![task_node("a"), node("wait", NodeKind::Delay { seconds: 1 }), task_node("b")],
        vec![edge("a", "wait"), edge("wait", "b")],
    );
    assert_eq!(wf.referenced_tasks().len(), 2);
}

#[test]
fn predecessors_lists_incoming_edges() {
    let wf = workflow(
        vec![task_node("a"), task_node("b"), node("merge", NodeKind::Join)],
        vec![edge("a", "merge"), edge("b", "merge")],
    );
    let mut preds = wf.predecessors("merge");
    preds.sort();
    assert_eq!(preds, vec!["a", "b"]);
}
