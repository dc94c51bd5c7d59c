// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run state change fan-out.
//!
//! Subscribers (the workflow executor, live CLI views, tests) receive every
//! run transition the engine performs. Lossy by design: a slow subscriber
//! misses intermediate states, never the store's truth.

use agd_core::{RunId, RunState};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct RunSignals {
    tx: broadcast::Sender<(RunId, RunState)>,
}

impl Default for RunSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSignals {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, run_id: RunId, state: RunState) {
        let _ = self.tx.send((run_id, state));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(RunId, RunState)> {
        self.tx.subscribe()
    }
}
