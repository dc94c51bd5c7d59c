// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Due-task discovery and cron scheduling.
//!
//! The loop ticks on a fixed cadence and asks the store for due tasks. A
//! one-shot task's schedule is consumed exactly once; a cron task's next
//! fire is recomputed from the fire that just became due — never from
//! "now" — so a slow tick cannot accumulate drift. Event-driven tasks are
//! never due.

use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use agd_core::{Clock, CronSchedule, Task, TaskKind};
use agd_storage::Store;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default scheduler tick cadence.
pub const DEFAULT_TICK: Duration = Duration::from_secs(10);

pub struct Scheduler<C: Clock> {
    store: Arc<Store>,
    dispatcher: Arc<Dispatcher<C>>,
    clock: C,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(store: Arc<Store>, dispatcher: Arc<Dispatcher<C>>, clock: C) -> Self {
        Self { store, dispatcher, clock }
    }

    /// Arm enabled cron tasks that have no next fire yet (new tasks and
    /// restart rehydration). The first fire is computed from now; every
    /// subsequent fire chains from its predecessor.
    pub fn arm_cron_tasks(&self) -> Result<usize, EngineError> {
        let now = self.clock.utc_now();
        let mut armed = 0;
        for task in self.store.list_tasks(None) {
            if task.kind != TaskKind::Cron
                || !task.enabled
                || task.next_scheduled_at_ms.is_some()
            {
                continue;
            }
            let Some(next) = cron_next_ms(&task, now.timestamp_millis() as u64) else {
                warn!(task_id = %task.id, "cron task has no future fire, leaving unarmed");
                continue;
            };
            self.store.set_task_schedule(task.id, Some(next))?;
            armed += 1;
        }
        Ok(armed)
    }

    /// One scheduler pass: dispatch everything due. Returns dispatch count.
    pub async fn tick(&self) -> usize {
        let now_ms = self.clock.epoch_ms();
        let due = self.store.due_tasks(now_ms);
        let mut dispatched = 0;

        for task in due {
            match task.kind {
                TaskKind::OneShot => {
                    match self.store.consume_one_shot(&task.id) {
                        Ok(true) => {}
                        // Someone else consumed it between the query and
                        // now; exactly-once holds.
                        Ok(false) => continue,
                        Err(e) => {
                            warn!(task_id = %task.id, error = %e, "one-shot consume failed");
                            continue;
                        }
                    }
                }
                TaskKind::Cron => {
                    // Reschedule first, chained off the fire time that just
                    // became due, so a dispatch failure cannot stall the
                    // schedule.
                    let fired_at = task.next_scheduled_at_ms.unwrap_or(now_ms);
                    let next = cron_next_ms(&task, fired_at);
                    if let Err(e) = self.store.set_task_schedule(task.id, next) {
                        warn!(task_id = %task.id, error = %e, "cron reschedule failed");
                        continue;
                    }
                }
                TaskKind::EventDriven => continue,
            }

            match self.dispatcher.dispatch(task.id, None, 1).await {
                Ok(outcome) => {
                    dispatched += 1;
                    info!(task_id = %task.id, ?outcome, "scheduled dispatch");
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "scheduled dispatch failed");
                }
            }
        }
        dispatched
    }

    /// The scheduler loop. Ticks immediately, then on the cadence.
    pub async fn run_loop(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

/// Next fire of a cron task strictly after `after_ms`, in epoch ms UTC.
fn cron_next_ms(task: &Task, after_ms: u64) -> Option<u64> {
    let expr = task.cron_expr.as_deref()?;
    let schedule = CronSchedule::parse(expr).ok()?;
    let after = Utc.timestamp_millis_opt(after_ms as i64).single()?;
    schedule.next_after(after).map(|dt| dt.timestamp_millis() as u64)
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
