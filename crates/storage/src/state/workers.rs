// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker record handlers.

use super::MaterializedState;
use crate::record::Record;

pub(crate) fn apply(state: &mut MaterializedState, record: &Record) {
    match record {
        Record::WorkerHeartbeat { worker } => {
            // Preserve the local assignment clock across heartbeats.
            let last_assigned_ms = state
                .workers
                .get(worker.id.as_str())
                .map(|w| w.last_assigned_ms)
                .unwrap_or(0);
            let mut updated = worker.clone();
            updated.last_assigned_ms = updated.last_assigned_ms.max(last_assigned_ms);
            state.workers.insert(worker.id.to_string(), updated);
        }

        Record::WorkerAssigned { worker_id, at_ms } => {
            if let Some(worker) = state.workers.get_mut(worker_id.as_str()) {
                worker.last_assigned_ms = worker.last_assigned_ms.max(*at_ms);
            }
        }

        _ => {}
    }
}
