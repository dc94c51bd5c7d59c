// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run record handlers.

use super::MaterializedState;
use crate::record::Record;

pub(crate) fn apply(state: &mut MaterializedState, record: &Record) {
    match record {
        Record::RunCreated { run } => {
            // Guarded insert: a replayed creation must not reset a run that
            // has already advanced.
            state.runs.entry(run.id.to_string()).or_insert_with(|| run.clone());
        }

        Record::RunTransitioned { run_id, to, at_ms, reason } => {
            if let Some(run) = state.runs.get_mut(run_id.as_str()) {
                // Replay idempotency: an already-applied transition fails the
                // legality check and is skipped.
                if run.transition(*to, *at_ms).is_ok() {
                    if let Some(reason) = reason {
                        run.reason = Some(reason.clone());
                    }
                }
            }
        }

        Record::RunWorkerAssigned { run_id, worker_id, .. } => {
            if let Some(run) = state.runs.get_mut(run_id.as_str()) {
                run.worker_id = Some(worker_id.clone());
            }
        }

        Record::RunFinalized { run_id, summary, error, failure_class, envelope } => {
            if let Some(run) = state.runs.get_mut(run_id.as_str()) {
                if summary.is_some() {
                    run.summary.clone_from(summary);
                }
                if error.is_some() {
                    run.error.clone_from(error);
                }
                if failure_class.is_some() {
                    run.failure_class = *failure_class;
                }
                if envelope.is_some() {
                    run.envelope.clone_from(envelope);
                }
            }
        }

        _ => {}
    }
}
