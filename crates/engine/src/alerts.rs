// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alert rule evaluation over store metrics.
//!
//! Each enabled rule is measured on a tick; threshold breaches fire an
//! alert event, recoveries resolve it, and a per-rule cooldown suppresses
//! re-fires. Firing alerts can optionally surface as desktop
//! notifications on the daemon host.

use crate::error::EngineError;
use crate::proxy::ProxyRouteManager;
use agd_core::{
    AlertEvent, AlertRule, AlertRuleKind, AlertState, Clock, RuleId, RunState,
};
use agd_storage::Store;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default cadence between evaluation ticks.
pub const DEFAULT_CADENCE: Duration = Duration::from_secs(30);

/// Settings prefix under which external reporters record consecutive PR
/// publish failures per task.
pub const PR_STREAK_SETTING_PREFIX: &str = "pr-failure-streak/";

#[derive(Default)]
struct RuleRuntime {
    firing_since_ms: Option<u64>,
    last_fired_ms: Option<u64>,
}

pub struct AlertEvaluator<C: Clock> {
    store: Arc<Store>,
    clock: C,
    proxy: Option<Arc<ProxyRouteManager<C>>>,
    states: Mutex<HashMap<RuleId, RuleRuntime>>,
    desktop_notifications: bool,
}

impl<C: Clock> AlertEvaluator<C> {
    pub fn new(store: Arc<Store>, clock: C) -> Self {
        Self {
            store,
            clock,
            proxy: None,
            states: Mutex::new(HashMap::new()),
            desktop_notifications: false,
        }
    }

    pub fn with_proxy(mut self, proxy: Arc<ProxyRouteManager<C>>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_desktop_notifications(mut self, enabled: bool) -> Self {
        self.desktop_notifications = enabled;
        self
    }

    /// Evaluate every enabled rule once. Returns emitted events.
    pub fn tick(&self) -> Result<Vec<AlertEvent>, EngineError> {
        let now = self.clock.epoch_ms();
        let mut emitted = Vec::new();
        for rule in self.store.alert_rules() {
            if !rule.enabled {
                continue;
            }
            let value = self.measure(&rule, now);
            if let Some(event) = self.advance(&rule, value, now)? {
                if event.state == AlertState::Firing && self.desktop_notifications {
                    notify_desktop(&rule, &event);
                }
                emitted.push(event);
            }
        }
        Ok(emitted)
    }

    /// Measure the rule's observed value at `now`.
    fn measure(&self, rule: &AlertRule, now: u64) -> f64 {
        let window_ms = rule.window_secs.saturating_mul(1000);
        match rule.kind {
            AlertRuleKind::FailureRate => self.store.read(|s| {
                let in_window = s
                    .runs
                    .values()
                    .filter(|r| r.is_terminal())
                    .filter(|r| {
                        r.ended_at_ms
                            .map(|e| now.saturating_sub(e) <= window_ms)
                            .unwrap_or(false)
                    });
                let (mut failed, mut total) = (0usize, 0usize);
                for run in in_window {
                    total += 1;
                    if run.state == RunState::Failed {
                        failed += 1;
                    }
                }
                if total == 0 {
                    0.0
                } else {
                    failed as f64 / total as f64
                }
            }),
            AlertRuleKind::QueueBacklog => self.store.queued_run_count() as f64,
            AlertRuleKind::HeartbeatGap => self.store.read(|s| {
                s.workers
                    .values()
                    .map(|w| now.saturating_sub(w.last_heartbeat_ms) as f64 / 1000.0)
                    .fold(0.0, f64::max)
            }),
            AlertRuleKind::PrFailureStreak => self.store.read(|s| {
                s.settings
                    .iter()
                    .filter(|(k, _)| k.starts_with(PR_STREAK_SETTING_PREFIX))
                    .filter_map(|(_, v)| v.parse::<f64>().ok())
                    .fold(0.0, f64::max)
            }),
            AlertRuleKind::RouteLeak => {
                let Some(proxy) = &self.proxy else { return 0.0 };
                let (snapshot, _) = proxy.snapshot();
                self.store.read(|s| {
                    snapshot
                        .iter()
                        .filter(|route| {
                            route
                                .ownership
                                .run_id
                                .as_ref()
                                .and_then(|id| s.runs.get(id.as_str()))
                                .map(|run| run.is_terminal())
                                .unwrap_or(false)
                        })
                        .count() as f64
                })
            }
        }
    }

    /// Advance the rule's firing state; persist and return the emitted
    /// event, if any.
    fn advance(
        &self,
        rule: &AlertRule,
        value: f64,
        now: u64,
    ) -> Result<Option<AlertEvent>, EngineError> {
        // Failure rate breaches at-or-above its ratio threshold (but never
        // on an empty window); count and gap rules breach strictly above.
        let breach = match rule.kind {
            AlertRuleKind::FailureRate => value > 0.0 && value >= rule.threshold,
            _ => value > rule.threshold,
        };
        let mut states = self.states.lock();
        let runtime = states.entry(rule.id).or_default();

        let event = if breach && runtime.firing_since_ms.is_none() {
            let cooling = runtime
                .last_fired_ms
                .map(|t| now.saturating_sub(t) < rule.cooldown_secs.saturating_mul(1000))
                .unwrap_or(false);
            if cooling {
                None
            } else {
                runtime.firing_since_ms = Some(now);
                runtime.last_fired_ms = Some(now);
                Some(AlertEvent {
                    rule_id: rule.id,
                    state: AlertState::Firing,
                    message: format!("{} breached: {value:.2} >= {:.2}", rule.name, rule.threshold),
                    first_seen_ms: now,
                    last_seen_ms: now,
                    value,
                })
            }
        } else if !breach && runtime.firing_since_ms.is_some() {
            let first_seen = runtime.firing_since_ms.take().unwrap_or(now);
            Some(AlertEvent {
                rule_id: rule.id,
                state: AlertState::Resolved,
                message: format!("{} recovered: {value:.2}", rule.name),
                first_seen_ms: first_seen,
                last_seen_ms: now,
                value,
            })
        } else {
            None
        };

        if let Some(event) = &event {
            self.store.append_alert_event(event.clone())?;
            info!(rule = %rule.name, state = %event.state, value, "alert event");
        }
        Ok(event)
    }

    /// Background evaluation loop.
    pub async fn run_loop(self: Arc<Self>, cadence: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(cadence);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick() {
                        warn!(error = %e, "alert evaluation failed");
                    }
                }
            }
        }
    }
}

fn notify_desktop(rule: &AlertRule, event: &AlertEvent) {
    let result = notify_rust::Notification::new()
        .summary(&format!("agd alert: {}", rule.name))
        .body(&event.message)
        .show();
    if let Err(e) = result {
        warn!(rule = %rule.name, error = %e, "desktop notification failed");
    }
}

#[cfg(test)]
#[path = "alerts_tests.rs"]
mod tests;
