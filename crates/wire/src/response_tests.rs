// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for response serialization.

use crate::response::{ReconcileReport, Response, RunDetail, RunSummary};
use agd_core::{ExecutionMode, RunState};

fn run_summary() -> RunSummary {
    RunSummary {
        id: "run-a".into(),
        task_id: "tsk-a".into(),
        state: RunState::Succeeded,
        attempt: 1,
        mode: ExecutionMode::Default,
        created_at_ms: 1,
        ended_at_ms: Some(2),
        summary: Some("done".to_string()),
    }
}

#[test]
fn run_detail_flattens_summary() {
    let response = Response::Run {
        run: Box::new(RunDetail {
            summary: run_summary(),
            worker_id: None,
            error: None,
            reason: None,
            envelope: None,
            artifact_count: 3,
        }),
    };
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["type"], "run");
    // flattened: state sits beside artifact_count
    assert_eq!(json["run"]["state"], "succeeded");
    assert_eq!(json["run"]["artifact_count"], 3);
}

#[test]
fn error_response_roundtrips() {
    let response = Response::Error {
        class: "invalid_transition".to_string(),
        message: "illegal run transition succeeded -> running".to_string(),
    };
    let json = serde_json::to_string(&response).unwrap();
    let back: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(back, response);
}

#[test]
fn reconcile_report_defaults_to_zeroes() {
    let report: ReconcileReport = serde_json::from_str("{\"containers_seen\":0,\"orphans_removed\":0,\"runs_relinked\":0,\"runs_failed\":0}").unwrap();
    assert_eq!(report, ReconcileReport::default());
}
