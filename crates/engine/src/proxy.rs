// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dynamic reverse-proxy route management.
//!
//! The manager owns only the route table; the HTTP proxy itself is an
//! external collaborator that reads immutable snapshots. Single writer,
//! many readers: every change swaps in a fresh snapshot and trips a
//! cancellable change token so readers can re-fetch.

use crate::error::EngineError;
use agd_core::{Clock, ProxyAudit, ProxyRoute, RouteOwnership};
use agd_storage::Store;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default sweep cadence for TTL eviction.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// An immutable view of the route table.
#[derive(Debug, Clone, Default)]
pub struct RouteTableSnapshot {
    routes: Arc<HashMap<String, ProxyRoute>>,
}

impl RouteTableSnapshot {
    pub fn get(&self, route_id: &str) -> Option<&ProxyRoute> {
        self.routes.get(route_id)
    }

    /// The route whose path pattern matches the request path. Longest
    /// pattern wins so `/runs/abc/*` beats `/runs/*`.
    pub fn match_path(&self, path: &str) -> Option<&ProxyRoute> {
        self.routes
            .values()
            .filter(|route| pattern_matches(&route.path_pattern, path))
            .max_by_key(|route| route.path_pattern.len())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProxyRoute> {
        self.routes.values()
    }
}

/// Trailing-`*` prefix patterns plus exact matches.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => path == pattern,
    }
}

struct TableState {
    snapshot: RouteTableSnapshot,
    change_token: CancellationToken,
}

pub struct ProxyRouteManager<C: Clock> {
    state: RwLock<TableState>,
    store: Arc<Store>,
    clock: C,
}

impl<C: Clock> ProxyRouteManager<C> {
    pub fn new(store: Arc<Store>, clock: C) -> Self {
        Self {
            state: RwLock::new(TableState {
                snapshot: RouteTableSnapshot::default(),
                change_token: CancellationToken::new(),
            }),
            store,
            clock,
        }
    }

    /// Insert or replace a route.
    ///
    /// Routes owned by a run must have ids starting with the run id (which
    /// carries the `run-` prefix); anything else is rejected before the
    /// table changes.
    pub fn upsert(
        &self,
        route_id: &str,
        path_pattern: &str,
        destination: &str,
        ttl: Option<Duration>,
        ownership: RouteOwnership,
    ) -> Result<(), EngineError> {
        if let Some(required) = ownership.required_id_prefix() {
            if !route_id.starts_with(required) {
                return Err(EngineError::Internal(format!(
                    "route id {route_id:?} must start with {required:?} for its owning run"
                )));
            }
        }
        let route = ProxyRoute {
            route_id: route_id.to_string(),
            path_pattern: path_pattern.to_string(),
            destination: destination.to_string(),
            ttl_deadline_ms: ttl.map(|t| self.clock.epoch_ms() + t.as_millis() as u64),
            ownership,
        };
        self.mutate(|routes| {
            routes.insert(route.route_id.clone(), route);
        });
        Ok(())
    }

    pub fn remove(&self, route_id: &str) -> bool {
        let mut removed = false;
        self.mutate(|routes| {
            removed = routes.remove(route_id).is_some();
        });
        removed
    }

    /// Drop every route owned by (or id-prefixed with) a run.
    pub fn remove_run_routes(&self, run_id: &agd_core::RunId) -> usize {
        let mut removed = 0;
        self.mutate(|routes| {
            let before = routes.len();
            routes.retain(|id, route| {
                let owned = route.ownership.run_id.as_ref() == Some(run_id)
                    || id.starts_with(run_id.as_str());
                !owned
            });
            removed = before - routes.len();
        });
        if removed > 0 {
            debug!(%run_id, removed, "run routes removed");
        }
        removed
    }

    /// Current snapshot plus the token that trips on the next change.
    pub fn snapshot(&self) -> (RouteTableSnapshot, CancellationToken) {
        let state = self.state.read();
        (state.snapshot.clone(), state.change_token.clone())
    }

    /// Evict routes whose TTL deadline has passed. Returns evicted count.
    pub fn sweep(&self) -> usize {
        let now = self.clock.epoch_ms();
        let mut evicted = 0;
        self.mutate(|routes| {
            let before = routes.len();
            routes.retain(|_, route| !route.is_expired(now));
            evicted = before - routes.len();
        });
        if evicted > 0 {
            info!(evicted, "expired proxy routes swept");
        }
        evicted
    }

    /// Background TTL sweeper.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }
    }

    /// Audit hook: a request hit a managed route.
    pub fn record_hit(&self, route_id: &str, path: &str, upstream_latency: Duration) {
        let ownership = {
            let state = self.state.read();
            state.snapshot.get(route_id).map(|r| r.ownership.clone()).unwrap_or_default()
        };
        let audit = ProxyAudit {
            route_id: route_id.to_string(),
            ownership,
            path: path.to_string(),
            upstream_latency_ms: upstream_latency.as_millis() as u64,
            at_ms: self.clock.epoch_ms(),
        };
        if let Err(e) = self.store.append_proxy_audit(audit) {
            warn!(route_id, error = %e, "proxy audit append failed");
        }
    }

    /// Single-writer mutation: clone-on-write, swap the snapshot, trip the
    /// change token. Multiple rapid mutations may collapse into one
    /// visible snapshot for late readers, which is fine — readers always
    /// see a consistent table.
    fn mutate(&self, f: impl FnOnce(&mut HashMap<String, ProxyRoute>)) {
        let mut state = self.state.write();
        let mut routes = (*state.snapshot.routes).clone();
        f(&mut routes);
        state.snapshot = RouteTableSnapshot { routes: Arc::new(routes) };
        let previous = std::mem::replace(&mut state.change_token, CancellationToken::new());
        previous.cancel();
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
