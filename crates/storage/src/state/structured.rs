// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured row handlers: events, diff snapshots, tool projections,
//! question requests.

use super::MaterializedState;
use crate::record::Record;
use agd_core::QuestionStatus;

pub(crate) fn apply(state: &mut MaterializedState, record: &Record) {
    match record {
        Record::StructuredAppended { event } => {
            let rows = state.structured_events.entry(event.run_id.to_string()).or_default();
            // Idempotency: sequences are strictly increasing, so a replayed
            // row with sequence ≤ tail is a duplicate.
            let is_new = rows.last().map(|last| event.sequence > last.sequence).unwrap_or(true);
            if is_new {
                rows.push(event.clone());
            }
        }

        Record::DiffUpserted { snapshot } => {
            let entry = state.diff_snapshots.entry(snapshot.run_id.to_string());
            let current = entry.or_insert_with(|| snapshot.clone());
            // Latest-wins by sequence.
            if snapshot.sequence >= current.sequence {
                *current = snapshot.clone();
            }
        }

        Record::ToolUpserted { projection } => {
            state
                .tool_projections
                .entry(projection.run_id.to_string())
                .or_default()
                .insert(projection.tool_call_id.clone(), projection.clone());
        }

        Record::StructuredPruned { run_id } => {
            state.structured_events.remove(run_id.as_str());
            state.diff_snapshots.remove(run_id.as_str());
            state.tool_projections.remove(run_id.as_str());
        }

        Record::QuestionCreated { question } => {
            state
                .question_requests
                .entry(question.id.to_string())
                .or_insert_with(|| question.clone());
        }

        Record::QuestionAnswered { question_id, answers, answered_run_id, .. } => {
            if let Some(q) = state.question_requests.get_mut(question_id.as_str()) {
                if q.status == QuestionStatus::Pending {
                    q.status = QuestionStatus::Answered;
                    q.answers = answers.clone();
                    q.answered_run_id = *answered_run_id;
                }
            }
        }

        Record::QuestionExpired { question_id } => {
            if let Some(q) = state.question_requests.get_mut(question_id.as_str()) {
                if q.status == QuestionStatus::Pending {
                    q.status = QuestionStatus::Expired;
                }
            }
        }

        _ => {}
    }
}
