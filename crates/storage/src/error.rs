// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error type.

use agd_core::{RunId, TransitionError};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("{kind} {id:?} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("structured sequence regression for {run_id}: have {have}, got {got}")]
    SequenceRegression { run_id: RunId, have: u64, got: u64 },

    #[error("question {0:?} is not pending")]
    QuestionNotPending(String),

    #[error("invalid task: {0}")]
    InvalidTask(String),
}

impl StorageError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }
}
