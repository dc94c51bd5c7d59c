// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Webhook HTTP listener.
//!
//! One route: `POST /api/webhooks/{repository_id}/{token}`. Token
//! verification and fan-out live in the engine; this is just the axum
//! shim in front of them.

use crate::lifecycle::{Daemon, DaemonError};
use agd_core::{RepoId, SystemClock};
use agd_engine::webhook::WebhookDispatcher;
use agd_engine::EngineError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Clone)]
struct WebhookState {
    webhooks: Arc<WebhookDispatcher<SystemClock>>,
}

/// Bind and spawn the webhook server; `None` when the listener is
/// disabled by configuration.
pub async fn spawn(daemon: &Daemon) -> Result<Option<JoinHandle<()>>, DaemonError> {
    if daemon.config.webhook_bind.is_empty() {
        return Ok(None);
    }
    let state = WebhookState { webhooks: daemon.webhooks.clone() };
    let app = Router::new()
        .route("/api/webhooks/{repository_id}/{token}", post(handle_webhook))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&daemon.config.webhook_bind).await?;
    info!(bind = %daemon.config.webhook_bind, "webhook listener ready");

    let shutdown = daemon.shutdown_token();
    Ok(Some(tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "webhook server exited");
        }
    })))
}

async fn handle_webhook(
    State(state): State<WebhookState>,
    Path((repository_id, token)): Path<(String, String)>,
) -> (StatusCode, Json<serde_json::Value>) {
    let repo_id = RepoId::from_string(&repository_id);
    match state.webhooks.handle(repo_id, &token).await {
        Ok(report) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "matched": report.matched,
                "dispatched": report.dispatched,
                "failed": report.failed,
            })),
        ),
        Err(EngineError::WebhookRejected) => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "invalid token" })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}
