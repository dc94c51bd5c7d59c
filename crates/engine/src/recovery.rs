// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash recovery and orphan container reconciliation.
//!
//! On process start the store's view of the world is reconciled against
//! the container host: non-terminal runs with no live container fail with
//! reason `process-restart`; runs whose labelled container still exists
//! re-link to it; labelled containers backing no non-terminal run are
//! terminated.

use crate::error::EngineError;
use agd_core::{Clock, RunState};
use agd_harness::container::ContainerManager;
use agd_storage::Store;
use agd_wire::ReconcileReport;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const ORPHAN_GRACE: Duration = Duration::from_secs(5);

/// Reconcile persisted runs with actual container state after a restart.
pub async fn reconcile<C: Clock>(
    store: &Arc<Store>,
    containers: Option<&Arc<dyn ContainerManager>>,
    clock: &C,
) -> Result<ReconcileReport, EngineError> {
    let mut report = ReconcileReport::default();

    let live: HashMap<String, bool> = match containers {
        Some(manager) => {
            let listed = manager.list_platform_containers().await?;
            report.containers_seen = listed.len();
            listed
                .iter()
                .filter_map(|c| c.run_id().map(|id| (id.to_string(), c.running)))
                .collect()
        }
        None => HashMap::new(),
    };

    // Pass 1: runs. A live container re-links; anything else failed when
    // the previous process died.
    let active = store.active_runs();
    for run in &active {
        match live.get(run.id.as_str()).copied() {
            Some(true) if run.state == RunState::Running => {
                info!(run_id = %run.id, "re-linked run to its live container");
                report.runs_relinked += 1;
            }
            _ if run.state == RunState::Running || run.state == RunState::Queued => {
                // Queued runs lost their in-memory admission ticket too.
                let to = RunState::Failed;
                let result = if run.state == RunState::Queued {
                    store
                        .transition_run(
                            &run.id,
                            RunState::Cancelled,
                            clock.epoch_ms(),
                            Some("process-restart".to_string()),
                        )
                        .map(|_| ())
                } else {
                    store
                        .transition_run(
                            &run.id,
                            to,
                            clock.epoch_ms(),
                            Some("process-restart".to_string()),
                        )
                        .map(|_| ())
                };
                match result {
                    Ok(()) => report.runs_failed += 1,
                    Err(e) => warn!(run_id = %run.id, error = %e, "recovery transition failed"),
                }
            }
            // Pending-approval runs survive restarts untouched: they hold
            // no container and no slot.
            _ => {}
        }
    }

    // Pass 2: containers. Anything labelled but not backed by a
    // non-terminal run is an orphan.
    if let Some(manager) = containers {
        let still_active: std::collections::HashSet<String> =
            store.active_runs().iter().map(|r| r.id.to_string()).collect();
        for container in manager.list_platform_containers().await? {
            let owned = container
                .run_id()
                .map(|id| still_active.contains(id.as_str()))
                .unwrap_or(false);
            if !owned {
                info!(container = %container.name, "removing orphaned container");
                if let Err(e) = manager.stop_and_remove(&container.name, ORPHAN_GRACE).await {
                    warn!(container = %container.name, error = %e, "orphan removal failed");
                } else {
                    report.orphans_removed += 1;
                }
            }
        }
    }

    info!(
        seen = report.containers_seen,
        relinked = report.runs_relinked,
        failed = report.runs_failed,
        orphans = report.orphans_removed,
        "reconciliation complete"
    );
    Ok(report)
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
