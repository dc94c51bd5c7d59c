// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alert rules and alert events.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for an alert rule.
    pub struct RuleId("rul-");
}

/// What a rule watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRuleKind {
    /// Terminal failed / total terminal within the window.
    FailureRate,
    /// Runs sitting in `queued` above the threshold.
    QueueBacklog,
    /// Any worker silent for longer than the threshold (seconds).
    HeartbeatGap,
    /// Consecutive PR publish failures for one task.
    PrFailureStreak,
    /// Routes outliving their owner run.
    RouteLeak,
}

crate::simple_display! {
    AlertRuleKind {
        FailureRate => "failure_rate",
        QueueBacklog => "queue_backlog",
        HeartbeatGap => "heartbeat_gap",
        PrFailureStreak => "pr_failure_streak",
        RouteLeak => "route_leak",
    }
}

/// An operator-defined alerting rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: RuleId,
    pub kind: AlertRuleKind,
    pub name: String,
    /// Evaluation window in seconds (ignored by kinds with no window).
    pub window_secs: u64,
    /// Meaning depends on kind: a ratio for failure-rate, a count for
    /// queue-backlog and pr-failure-streak, seconds for heartbeat-gap and
    /// route-leak.
    pub threshold: f64,
    /// A fired rule stays quiet for this long.
    pub cooldown_secs: u64,
    pub enabled: bool,
}

/// Firing state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Firing,
    Resolved,
}

crate::simple_display! {
    AlertState {
        Firing => "firing",
        Resolved => "resolved",
    }
}

/// Emitted when a rule fires or resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub rule_id: RuleId,
    pub state: AlertState,
    pub message: String,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    /// Observed value that crossed (or re-crossed) the threshold.
    pub value: f64,
}

crate::builder! {
    pub struct AlertRuleBuilder => AlertRule {
        into {
            id: RuleId = "rul-test0001",
            name: String = "failure rate",
        }
        set {
            kind: AlertRuleKind = AlertRuleKind::FailureRate,
            window_secs: u64 = 3600,
            threshold: f64 = 0.5,
            cooldown_secs: u64 = 600,
            enabled: bool = true,
        }
    }
}
