// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type.

use agd_core::ErrorClass;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] agd_storage::StorageError),

    #[error(transparent)]
    Container(#[from] agd_harness::container::ContainerError),

    #[error("{kind} {id:?} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("task {0:?} is disabled")]
    TaskDisabled(String),

    #[error("webhook token mismatch")]
    WebhookRejected,

    #[error(transparent)]
    Workflow(#[from] agd_core::WorkflowError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Operator-facing classification.
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::Storage(agd_storage::StorageError::InvalidTransition(_)) => {
                ErrorClass::InvalidTransition
            }
            EngineError::Storage(agd_storage::StorageError::NotFound { .. })
            | EngineError::NotFound { .. } => ErrorClass::NotFound,
            EngineError::TaskDisabled(_) => ErrorClass::InvalidInput,
            EngineError::WebhookRejected => ErrorClass::PermissionDenied,
            EngineError::Workflow(_) => ErrorClass::InvalidInput,
            EngineError::Storage(_) | EngineError::Container(_) | EngineError::Internal(_) => {
                ErrorClass::InternalError
            }
        }
    }
}
