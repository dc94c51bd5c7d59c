// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for alert rule evaluation.

use crate::alerts::{AlertEvaluator, PR_STREAK_SETTING_PREFIX};
use crate::proxy::ProxyRouteManager;
use agd_core::{
    AlertRule, AlertRuleKind, AlertState, Clock, FakeClock, RouteOwnership, Run, RunState, Worker,
};
use agd_storage::Store;
use std::sync::Arc;
use std::time::Duration;

fn fixture() -> (AlertEvaluator<FakeClock>, Arc<Store>, FakeClock) {
    let store = Arc::new(Store::in_memory());
    let clock = FakeClock::new();
    clock.set_epoch_ms(10_000_000);
    (AlertEvaluator::new(store.clone(), clock.clone()), store, clock)
}

fn rule(kind: AlertRuleKind, threshold: f64, cooldown_secs: u64) -> AlertRule {
    AlertRule {
        id: agd_core::RuleId::new(),
        kind,
        name: format!("{kind}"),
        window_secs: 3_600,
        threshold,
        cooldown_secs,
        enabled: true,
    }
}

fn terminal_run(id: &str, state: RunState, ended_at: u64) -> Run {
    let mut run = Run::builder().id(id).build();
    run.transition(RunState::Running, ended_at.saturating_sub(5)).unwrap();
    run.transition(state, ended_at).unwrap();
    run
}

#[test]
fn failure_rate_fires_and_resolves() {
    let (evaluator, store, clock) = fixture();
    store.upsert_alert_rule(rule(AlertRuleKind::FailureRate, 0.5, 0)).unwrap();
    let now = clock.epoch_ms();

    store.create_run(terminal_run("run-f1", RunState::Failed, now - 1_000)).unwrap();
    store.create_run(terminal_run("run-f2", RunState::Failed, now - 1_000)).unwrap();
    store.create_run(terminal_run("run-ok", RunState::Succeeded, now - 1_000)).unwrap();

    let events = evaluator.tick().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].state, AlertState::Firing);
    assert!((events[0].value - 2.0 / 3.0).abs() < 1e-9);

    // Window slides past the failures: the alert resolves.
    clock.advance(Duration::from_secs(7_200));
    let events = evaluator.tick().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].state, AlertState::Resolved);
    assert_eq!(store.alert_events().len(), 2);
}

#[test]
fn empty_window_never_fires_failure_rate() {
    let (evaluator, store, _clock) = fixture();
    store.upsert_alert_rule(rule(AlertRuleKind::FailureRate, 0.0, 0)).unwrap();
    assert!(evaluator.tick().unwrap().is_empty());
}

#[test]
fn queue_backlog_fires_strictly_above_threshold() {
    let (evaluator, store, _clock) = fixture();
    store.upsert_alert_rule(rule(AlertRuleKind::QueueBacklog, 2.0, 0)).unwrap();

    store.create_run(Run::builder().id("run-q1").build()).unwrap();
    store.create_run(Run::builder().id("run-q2").build()).unwrap();
    assert!(evaluator.tick().unwrap().is_empty());

    store.create_run(Run::builder().id("run-q3").build()).unwrap();
    let events = evaluator.tick().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].state, AlertState::Firing);
}

#[test]
fn heartbeat_gap_fires_for_silent_workers() {
    let (evaluator, store, clock) = fixture();
    store.upsert_alert_rule(rule(AlertRuleKind::HeartbeatGap, 60.0, 0)).unwrap();
    let now = clock.epoch_ms();
    store
        .worker_heartbeat(Worker::builder().id("w-quiet").last_heartbeat_ms(now).build())
        .unwrap();

    assert!(evaluator.tick().unwrap().is_empty());
    clock.advance(Duration::from_secs(120));
    let events = evaluator.tick().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].value > 60.0);
}

#[test]
fn pr_failure_streak_reads_reported_setting() {
    let (evaluator, store, _clock) = fixture();
    store.upsert_alert_rule(rule(AlertRuleKind::PrFailureStreak, 3.0, 0)).unwrap();

    store.put_setting(&format!("{PR_STREAK_SETTING_PREFIX}tsk-a"), "2").unwrap();
    assert!(evaluator.tick().unwrap().is_empty());

    store.put_setting(&format!("{PR_STREAK_SETTING_PREFIX}tsk-a"), "4").unwrap();
    assert_eq!(evaluator.tick().unwrap().len(), 1);
}

#[test]
fn route_leak_counts_routes_of_terminal_runs() {
    let (_, store, clock) = fixture();
    let proxy = Arc::new(ProxyRouteManager::new(store.clone(), clock.clone()));
    let evaluator =
        AlertEvaluator::new(store.clone(), clock.clone()).with_proxy(proxy.clone());
    store.upsert_alert_rule(rule(AlertRuleKind::RouteLeak, 0.0, 0)).unwrap();

    let now = clock.epoch_ms();
    store.create_run(terminal_run("run-gone", RunState::Succeeded, now)).unwrap();
    proxy
        .upsert(
            "run-gone",
            "/g/*",
            "http://g",
            None,
            RouteOwnership::for_run("run-gone".into(), "tsk-t".into(), "rep-r".into()),
        )
        .unwrap();

    let events = evaluator.tick().unwrap();
    assert_eq!(events.len(), 1);
    assert!((events[0].value - 1.0).abs() < f64::EPSILON);
}

#[test]
fn cooldown_suppresses_refire() {
    let (evaluator, store, clock) = fixture();
    store.upsert_alert_rule(rule(AlertRuleKind::QueueBacklog, 0.0, 600)).unwrap();
    store.create_run(Run::builder().id("run-q").build()).unwrap();

    // Fire.
    assert_eq!(evaluator.tick().unwrap().len(), 1);
    // Still breaching: no duplicate event.
    assert!(evaluator.tick().unwrap().is_empty());

    // Resolve by draining the queue.
    store
        .transition_run(&"run-q".into(), RunState::Cancelled, clock.epoch_ms(), None)
        .unwrap();
    assert_eq!(evaluator.tick().unwrap()[0].state, AlertState::Resolved);

    // Breach again inside the cooldown: suppressed.
    store.create_run(Run::builder().id("run-q2").build()).unwrap();
    assert!(evaluator.tick().unwrap().is_empty());

    // After the cooldown it fires again.
    clock.advance(Duration::from_secs(700));
    assert_eq!(evaluator.tick().unwrap().len(), 1);
}

#[test]
fn disabled_rules_are_ignored() {
    let (evaluator, store, _clock) = fixture();
    let mut r = rule(AlertRuleKind::QueueBacklog, 0.0, 0);
    r.enabled = false;
    store.upsert_alert_rule(r).unwrap();
    store.create_run(Run::builder().id("run-q").build()).unwrap();
    assert!(evaluator.tick().unwrap().is_empty());
}
