// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Question requests raised by a harness mid-run.

use crate::run::RunId;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a question request.
    pub struct QuestionId("qst-");
}

/// One selectable answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One question within a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionEntry {
    pub id: String,
    pub header: String,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    #[default]
    Pending,
    Answered,
    Expired,
}

crate::simple_display! {
    QuestionStatus {
        Pending => "pending",
        Answered => "answered",
        Expired => "expired",
    }
}

/// A harness asking the operator for input.
///
/// Answering is a single pending → answered transition; a second answer is
/// rejected by the store. `answered_run_id` links the follow-up run created
/// from the operator's answers, when one is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub id: QuestionId,
    pub run_id: RunId,
    pub task_id: TaskId,
    pub questions: Vec<QuestionEntry>,
    pub status: QuestionStatus,
    /// question id → chosen option value (or free text).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_run_id: Option<RunId>,
    /// Tool that raised the request (e.g. "request_user_input").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tool_name: Option<String>,
    pub created_at_ms: u64,
}

crate::builder! {
    pub struct QuestionRequestBuilder => QuestionRequest {
        into {
            id: QuestionId = "qst-test0001",
            run_id: RunId = "run-test0001",
            task_id: TaskId = "tsk-test0001",
        }
        set {
            questions: Vec<QuestionEntry> = Vec::new(),
            status: QuestionStatus = QuestionStatus::Pending,
            answers: Vec<(String, String)> = Vec::new(),
            created_at_ms: u64 = 1_000_000,
        }
        option {
            answered_run_id: RunId = None,
            source_tool_name: String = None,
        }
    }
}
