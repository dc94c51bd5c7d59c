// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identifier and registration record.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// A worker silent for longer than this is unhealthy.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 30_000;

/// Unique identifier for a worker instance. Operator-assigned, free-form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    /// Create a new WorkerId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for WorkerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for WorkerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for WorkerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A registered runtime host, kept alive by heartbeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub endpoint: String,
    pub active_slots: u32,
    pub max_slots: u32,
    pub last_heartbeat_ms: u64,
    /// Epoch ms of the most recent dispatch assignment; breaks selection
    /// ties toward the least-recently-used worker.
    #[serde(default)]
    pub last_assigned_ms: u64,
}

impl Worker {
    pub fn is_healthy(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) < timeout_ms
    }

    pub fn has_capacity(&self) -> bool {
        self.active_slots < self.max_slots
    }
}

crate::builder! {
    pub struct WorkerBuilder => Worker {
        into {
            id: WorkerId = "worker-1",
            endpoint: String = "127.0.0.1:7070",
        }
        set {
            active_slots: u32 = 0,
            max_slots: u32 = 4,
            last_heartbeat_ms: u64 = 1_000_000,
            last_assigned_ms: u64 = 0,
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
