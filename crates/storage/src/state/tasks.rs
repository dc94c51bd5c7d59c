// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record handlers.

use super::MaterializedState;
use crate::record::Record;

pub(crate) fn apply(state: &mut MaterializedState, record: &Record) {
    match record {
        Record::TaskUpserted { task } => {
            state.tasks.insert(task.id.to_string(), task.clone());
        }

        Record::TaskDeleted { task_id } => {
            state.tasks.remove(task_id.as_str());
        }

        Record::TaskScheduled { task_id, next_at_ms } => {
            if let Some(task) = state.tasks.get_mut(task_id.as_str()) {
                task.next_scheduled_at_ms = *next_at_ms;
            }
        }

        _ => {}
    }
}
