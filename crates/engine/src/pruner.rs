// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention pruning of structured rows.
//!
//! Deletes structured events, diff snapshots, and tool projections for
//! terminal runs older than the cutoff. Runs whose task is referenced by
//! any workflow, or whose task has open findings, are excluded; active
//! runs are never touched.

use crate::error::EngineError;
use agd_core::{Clock, TaskId};
use agd_storage::{PruneReport, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Default retention window for structured rows.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// Default cadence between pruner passes.
pub const DEFAULT_CADENCE: Duration = Duration::from_secs(60 * 60);

pub struct Pruner<C: Clock> {
    store: Arc<Store>,
    clock: C,
    retention: Duration,
    /// Upper bound on runs pruned per pass; keeps each pass short and the
    /// operation resumable.
    max_runs_per_pass: usize,
}

impl<C: Clock> Pruner<C> {
    pub fn new(store: Arc<Store>, clock: C) -> Self {
        Self { store, clock, retention: DEFAULT_RETENTION, max_runs_per_pass: 500 }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_max_runs_per_pass(mut self, max_runs: usize) -> Self {
        self.max_runs_per_pass = max_runs;
        self
    }

    /// Tasks exempt from pruning: referenced by any workflow (enabled or
    /// not) or carrying open findings.
    fn excluded_tasks(&self) -> Vec<TaskId> {
        let mut excluded = self.store.tasks_referenced_by_workflows();
        excluded.extend(self.store.tasks_with_open_findings());
        excluded.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));
        excluded.dedup();
        excluded
    }

    /// One pruning pass. Idempotent: a second pass over unchanged state
    /// deletes nothing.
    pub fn run_once(&self) -> Result<PruneReport, EngineError> {
        let cutoff_ms = self.clock.epoch_ms().saturating_sub(self.retention.as_millis() as u64);
        let excluded = self.excluded_tasks();
        let report = self.store.prune_structured(cutoff_ms, self.max_runs_per_pass, &excluded)?;
        if report.runs_pruned > 0 {
            info!(
                scanned = report.runs_scanned,
                pruned = report.runs_pruned,
                events = report.events_deleted,
                "retention pass complete"
            );
        }
        Ok(report)
    }

    /// Background pruning loop.
    pub async fn run_loop(self: Arc<Self>, cadence: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(cadence);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once() {
                        tracing::warn!(error = %e, "retention pass failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "pruner_tests.rs"]
mod tests;
