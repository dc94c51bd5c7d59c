// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry policy with capped exponential backoff.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Per-task retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub cap_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_backoff_secs: 10, multiplier: 2.0, cap_secs: 600 }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` completed ones.
    pub fn attempts_remaining(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the given attempt number (1-based): `base × multiplier^(attempt-1)`,
    /// capped. Attempt 1 has no delay — it is the initial dispatch.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 1).saturating_sub(1);
        let raw = self.base_backoff_secs as f64 * self.multiplier.powi(exp as i32);
        let capped = raw.min(self.cap_secs as f64);
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Delay for a retry honouring a classification backoff hint: the larger
    /// of the policy delay and the hint, still bounded by the policy cap.
    pub fn delay_with_hint(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let policy = self.delay_for_attempt(attempt);
        let raised = match hint {
            Some(h) if h > policy => h,
            _ => policy,
        };
        raised.min(Duration::from_secs(self.cap_secs))
    }
}

/// Deterministic jitter in `[0, spread_ms)` derived from a seed key.
///
/// Dispatch deferrals and retries add this to their base delay so a burst
/// of deferred runs does not thundering-herd the same tick. Hashing the run
/// id keeps it reproducible in tests without a RNG dependency.
pub fn backoff_jitter_ms(seed: &str, attempt: u32, spread_ms: u64) -> u64 {
    if spread_ms == 0 {
        return 0;
    }
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(&mut hasher);
    attempt.hash(&mut hasher);
    hasher.finish() % spread_ms
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
