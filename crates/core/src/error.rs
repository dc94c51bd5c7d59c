// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure taxonomy and envelope error classification.
//!
//! Every failure that reaches an operator is tagged with an [`ErrorClass`].
//! Retryable classes feed the retry policy; the rest terminate the run on
//! first occurrence.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operator-facing failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    InvalidInput,
    NotFound,
    PermissionDenied,
    ConcurrencyCapReached,
    InvalidTransition,
    Timeout,
    RateLimitExceeded,
    ResourceExhausted,
    NetworkError,
    ConfigurationError,
    AuthenticationError,
    InternalError,
    Unknown,
}

crate::simple_display! {
    ErrorClass {
        InvalidInput => "invalid_input",
        NotFound => "not_found",
        PermissionDenied => "permission_denied",
        ConcurrencyCapReached => "concurrency_cap_reached",
        InvalidTransition => "invalid_transition",
        Timeout => "timeout",
        RateLimitExceeded => "rate_limit_exceeded",
        ResourceExhausted => "resource_exhausted",
        NetworkError => "network_error",
        ConfigurationError => "configuration_error",
        AuthenticationError => "authentication_error",
        InternalError => "internal_error",
        Unknown => "unknown",
    }
}

impl ErrorClass {
    /// Whether the retry policy may re-dispatch after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClass::RateLimitExceeded
                | ErrorClass::Timeout
                | ErrorClass::ResourceExhausted
                | ErrorClass::NetworkError
                | ErrorClass::Unknown
        )
    }

    /// Minimum delay before a retry attempt, when retryable.
    pub fn backoff_hint(&self) -> Option<Duration> {
        match self {
            ErrorClass::RateLimitExceeded => Some(Duration::from_secs(60)),
            ErrorClass::Timeout => Some(Duration::from_secs(30)),
            ErrorClass::ResourceExhausted => Some(Duration::from_secs(60)),
            ErrorClass::NetworkError => Some(Duration::from_secs(30)),
            ErrorClass::Unknown => Some(Duration::from_secs(10)),
            _ => None,
        }
    }

    /// Soft errors defer the dispatch instead of failing the run.
    pub fn is_soft(&self) -> bool {
        matches!(self, ErrorClass::ConcurrencyCapReached)
    }
}

/// Keyword table scanned in order; the first matching row wins.
const CLASSIFICATION_TABLE: &[(&[&str], ErrorClass)] = &[
    (&["unauthorized", "invalid api key", "401"], ErrorClass::AuthenticationError),
    (&["rate limit", "429", "too many requests", "overloaded"], ErrorClass::RateLimitExceeded),
    (&["timeout", "deadline exceeded"], ErrorClass::Timeout),
    (&["out of memory", "oom"], ErrorClass::ResourceExhausted),
    (&["invalid", "malformed", "400", "content policy"], ErrorClass::InvalidInput),
    (&["not found", "404"], ErrorClass::NotFound),
    (&["permission denied", "forbidden", "403", "approval denied"], ErrorClass::PermissionDenied),
    (&["network", "connection", "dns", "socket", "unreachable"], ErrorClass::NetworkError),
    (&["config", "missing", "not configured"], ErrorClass::ConfigurationError),
];

/// Classify an envelope failure from its error text and exit code.
///
/// Matching is case-insensitive; exit code 137 (SIGKILL, typically the OOM
/// killer) classifies as resource exhaustion even with empty error text.
/// Text with no matching keyword classifies as [`ErrorClass::Unknown`],
/// which is retryable with a short backoff.
pub fn classify_failure(error_text: &str, exit_code: Option<i32>) -> ErrorClass {
    let lowered = error_text.to_lowercase();
    for (keywords, class) in CLASSIFICATION_TABLE {
        if *class == ErrorClass::ResourceExhausted && exit_code == Some(137) {
            return ErrorClass::ResourceExhausted;
        }
        if keywords.iter().any(|k| lowered.contains(k)) {
            return *class;
        }
    }
    ErrorClass::Unknown
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
