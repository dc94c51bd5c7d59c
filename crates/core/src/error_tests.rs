// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for failure classification.

use crate::error::{classify_failure, ErrorClass};
use std::time::Duration;
use yare::parameterized;

#[parameterized(
    unauthorized = { "Unauthorized request", ErrorClass::AuthenticationError },
    invalid_api_key = { "error: invalid API key provided", ErrorClass::AuthenticationError },
    http_401 = { "server returned 401", ErrorClass::AuthenticationError },
    rate_limit = { "rate limit hit, slow down", ErrorClass::RateLimitExceeded },
    http_429 = { "HTTP 429", ErrorClass::RateLimitExceeded },
    overloaded = { "upstream overloaded", ErrorClass::RateLimitExceeded },
    timeout = { "request timeout after 30s", ErrorClass::Timeout },
    deadline = { "context deadline exceeded", ErrorClass::Timeout },
    oom = { "process killed: OOM", ErrorClass::ResourceExhausted },
    out_of_memory = { "out of memory", ErrorClass::ResourceExhausted },
    malformed = { "malformed request body", ErrorClass::InvalidInput },
    content_policy = { "rejected by content policy", ErrorClass::InvalidInput },
    not_found = { "model not found", ErrorClass::NotFound },
    http_404 = { "404 page does not exist", ErrorClass::NotFound },
    forbidden = { "forbidden by org policy", ErrorClass::PermissionDenied },
    approval_denied = { "approval denied by operator", ErrorClass::PermissionDenied },
    dns = { "DNS resolution failed", ErrorClass::NetworkError },
    socket = { "socket closed unexpectedly", ErrorClass::NetworkError },
    config = { "config value absent", ErrorClass::ConfigurationError },
    not_configured = { "provider not configured", ErrorClass::ConfigurationError },
    empty = { "", ErrorClass::Unknown },
    gibberish = { "zorp blart", ErrorClass::Unknown },
)]
fn classifies_error_text(text: &str, expected: ErrorClass) {
    assert_eq!(classify_failure(text, None), expected);
}

#[test]
fn first_match_wins_over_later_rows() {
    // "unauthorized" (row 1) beats "timeout" (row 3)
    assert_eq!(
        classify_failure("unauthorized; also a timeout occurred", None),
        ErrorClass::AuthenticationError
    );
    // "rate limit" (row 2) beats "not found" (row 6)
    assert_eq!(
        classify_failure("rate limit while fetching a not found page", None),
        ErrorClass::RateLimitExceeded
    );
}

#[test]
fn exit_137_is_resource_exhausted() {
    assert_eq!(classify_failure("", Some(137)), ErrorClass::ResourceExhausted);
    assert_eq!(classify_failure("killed", Some(137)), ErrorClass::ResourceExhausted);
}

#[test]
fn exit_137_does_not_preempt_earlier_rows() {
    assert_eq!(
        classify_failure("invalid api key", Some(137)),
        ErrorClass::AuthenticationError
    );
}

#[test]
fn classification_is_case_insensitive() {
    assert_eq!(classify_failure("RATE LIMIT", None), ErrorClass::RateLimitExceeded);
    assert_eq!(classify_failure("Deadline Exceeded", None), ErrorClass::Timeout);
}

#[parameterized(
    rate_limit = { ErrorClass::RateLimitExceeded, true, Some(60) },
    timeout = { ErrorClass::Timeout, true, Some(30) },
    resource = { ErrorClass::ResourceExhausted, true, Some(60) },
    network = { ErrorClass::NetworkError, true, Some(30) },
    unknown = { ErrorClass::Unknown, true, Some(10) },
    auth = { ErrorClass::AuthenticationError, false, None },
    invalid = { ErrorClass::InvalidInput, false, None },
    not_found = { ErrorClass::NotFound, false, None },
    permission = { ErrorClass::PermissionDenied, false, None },
    config = { ErrorClass::ConfigurationError, false, None },
)]
fn retryability_and_backoff(class: ErrorClass, retryable: bool, backoff_secs: Option<u64>) {
    assert_eq!(class.is_retryable(), retryable);
    assert_eq!(class.backoff_hint(), backoff_secs.map(Duration::from_secs));
}

#[test]
fn display_uses_snake_case() {
    assert_eq!(ErrorClass::RateLimitExceeded.to_string(), "rate_limit_exceeded");
    assert_eq!(ErrorClass::InvalidTransition.to_string(), "invalid_transition");
}
