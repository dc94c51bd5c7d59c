// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for request serialization.

use crate::request::{DispatchJob, Request};
use agd_core::SandboxProfile;
use std::collections::HashMap;

#[test]
fn requests_tag_with_snake_case_type() {
    let json = serde_json::to_value(&Request::ReconcileOrphanedContainers).unwrap();
    assert_eq!(json["type"], "reconcile_orphaned_containers");

    let json = serde_json::to_value(&Request::CancelJob { run_id: "run-x".into() }).unwrap();
    assert_eq!(json["type"], "cancel_job");
    assert_eq!(json["run_id"], "run-x");
}

#[test]
fn dispatch_job_roundtrips() {
    let request = Request::DispatchJob(DispatchJob {
        run_id: "run-a".into(),
        repo_id: "rep-a".into(),
        task_id: "tsk-a".into(),
        harness: "codex".to_string(),
        image_tag: "harness:codex".to_string(),
        clone_url: "https://example.test/r.git".to_string(),
        instruction: "fix the bug".to_string(),
        custom_args: vec!["--mode".to_string(), "plan".to_string()],
        timeout_seconds: 600,
        sandbox: SandboxProfile::default(),
        environment: HashMap::from([("RUN_MODE".to_string(), "plan".to_string())]),
        container_labels: HashMap::from([("agd.run-id".to_string(), "run-a".to_string())]),
    });
    let json = serde_json::to_string(&request).unwrap();
    let back: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(back, request);
}

#[test]
fn heartbeat_roundtrips() {
    let request = Request::Heartbeat {
        worker_id: "w1".into(),
        endpoint: "10.0.0.5:7070".to_string(),
        active_slots: 2,
        max_slots: 4,
    };
    let json = serde_json::to_string(&request).unwrap();
    let back: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(back, request);
}

#[test]
fn optional_fields_are_omitted() {
    let json = serde_json::to_value(&Request::TriggerTask { task_id: "tsk-a".into(), mode: None })
        .unwrap();
    assert!(json.get("mode").is_none());
}
