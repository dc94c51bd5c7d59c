// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Webhook ingestion: signed trigger fan-out to event-driven tasks.

use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use agd_core::{Clock, ProviderSecret, RepoId, TaskId};
use agd_storage::{Store, WebhookDelivery};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FanOutReport {
    pub matched: usize,
    pub dispatched: Vec<TaskId>,
    pub failed: Vec<TaskId>,
}

pub struct WebhookDispatcher<C: Clock> {
    store: Arc<Store>,
    dispatcher: Arc<Dispatcher<C>>,
    clock: C,
}

impl<C: Clock> WebhookDispatcher<C> {
    pub fn new(store: Arc<Store>, dispatcher: Arc<Dispatcher<C>>, clock: C) -> Self {
        Self { store, dispatcher, clock }
    }

    /// Handle `POST /api/webhooks/{repository-id}/{token}`.
    ///
    /// The token is checked in constant time against the repository's
    /// `webhook-token` provider secret. On a match, every enabled
    /// event-driven task on the repository is dispatched; one task's
    /// failure never stops its siblings.
    pub async fn handle(&self, repo_id: RepoId, token: &str) -> Result<FanOutReport, EngineError> {
        let secret = self
            .store
            .get_secret(&repo_id, ProviderSecret::WEBHOOK_TOKEN_PROVIDER)
            .ok_or(EngineError::WebhookRejected)?;
        if !constant_time_eq(token.as_bytes(), secret.encrypted_value.as_bytes()) {
            let _ = self.store.record_webhook(WebhookDelivery {
                repo_id,
                at_ms: self.clock.epoch_ms(),
                matched_tasks: Vec::new(),
                accepted: false,
            });
            return Err(EngineError::WebhookRejected);
        }

        let tasks = self.store.event_driven_tasks(&repo_id);
        let mut report = FanOutReport { matched: tasks.len(), ..FanOutReport::default() };
        for task in &tasks {
            match self.dispatcher.dispatch(task.id, None, 1).await {
                Ok(_) => report.dispatched.push(task.id),
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "webhook dispatch failed");
                    report.failed.push(task.id);
                }
            }
        }

        self.store.record_webhook(WebhookDelivery {
            repo_id,
            at_ms: self.clock.epoch_ms(),
            matched_tasks: report.dispatched.clone(),
            accepted: true,
        })?;
        info!(%repo_id, matched = report.matched, dispatched = report.dispatched.len(), "webhook fan-out");
        Ok(report)
    }
}

/// Length-leaking, content-constant-time equality: every byte is compared
/// regardless of where the first mismatch sits.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b) {
        acc |= x ^ y;
    }
    acc == 0
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
