// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Finding record handlers.

use super::MaterializedState;
use crate::record::Record;

pub(crate) fn apply(state: &mut MaterializedState, record: &Record) {
    match record {
        Record::FindingCreated { finding } => {
            state.findings.entry(finding.id.to_string()).or_insert_with(|| finding.clone());
        }

        Record::FindingStateChanged { finding_id, state: new_state } => {
            if let Some(finding) = state.findings.get_mut(finding_id.as_str()) {
                finding.state = *new_state;
            }
        }

        _ => {}
    }
}
