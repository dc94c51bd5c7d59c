// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proxy route records and ownership tags.

use crate::repo::RepoId;
use crate::run::RunId;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};

/// Who a route belongs to. Drives the route-id prefix rule and cleanup
/// when the owner terminates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RouteOwnership {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<RepoId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
}

impl RouteOwnership {
    pub fn for_run(run_id: RunId, task_id: TaskId, repo_id: RepoId) -> Self {
        Self { repo_id: Some(repo_id), task_id: Some(task_id), run_id: Some(run_id) }
    }

    /// Run-owned routes must have ids starting with the run id (which
    /// itself carries the `run-` prefix).
    pub fn required_id_prefix(&self) -> Option<&str> {
        self.run_id.as_ref().map(|id| id.as_str())
    }
}

/// A managed reverse-proxy route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRoute {
    pub route_id: String,
    pub path_pattern: String,
    pub destination: String,
    /// Epoch ms after which the sweeper evicts the route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_deadline_ms: Option<u64>,
    #[serde(default)]
    pub ownership: RouteOwnership,
}

impl ProxyRoute {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.ttl_deadline_ms, Some(deadline) if now_ms >= deadline)
    }
}

/// Structured audit record for one proxied request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAudit {
    pub route_id: String,
    #[serde(default)]
    pub ownership: RouteOwnership,
    pub path: String,
    pub upstream_latency_ms: u64,
    pub at_ms: u64,
}

#[cfg(test)]
#[path = "route_tests.rs"]
mod tests;
