// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harness runtime error type.

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("failed to spawn harness: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("harness handshake failed: {0}")]
    Handshake(String),

    #[error("harness stream error: {0}")]
    Stream(String),

    #[error("stage deadline exceeded")]
    Timeout,

    #[error("run cancelled")]
    Cancelled,
}

impl HarnessError {
    /// Map to the operator-facing failure class.
    pub fn class(&self) -> agd_core::ErrorClass {
        match self {
            HarnessError::Spawn(_) => agd_core::ErrorClass::ConfigurationError,
            HarnessError::Handshake(_) => agd_core::ErrorClass::InternalError,
            HarnessError::Stream(msg) => agd_core::classify_failure(msg, None),
            HarnessError::Timeout => agd_core::ErrorClass::Timeout,
            HarnessError::Cancelled => agd_core::ErrorClass::Unknown,
        }
    }
}
