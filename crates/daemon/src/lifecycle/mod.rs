// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon bootstrap, background loops, and shutdown.

mod startup;

pub use startup::{Daemon, DaemonError};

use crate::config::DaemonConfig;
use std::time::Duration;
use tracing::info;

/// Run the daemon to completion: bootstrap, serve, shut down on signal.
pub async fn run_daemon(config: DaemonConfig) -> Result<(), DaemonError> {
    let daemon = Daemon::bootstrap(config).await?;
    let grace = Duration::from_secs(daemon.config.grace_secs);

    let mut handles = daemon.spawn_loops();
    handles.push(crate::listener::spawn(&daemon)?);
    if let Some(webhook) = crate::webhook_http::spawn(&daemon).await? {
        handles.push(webhook);
    }

    let shutdown = daemon.shutdown_token();
    tokio::select! {
        () = wait_for_signal() => info!("shutdown signal received"),
        () = shutdown.cancelled() => info!("shutdown requested over IPC"),
    }

    // Cancel every scope token, then give in-flight handlers a bounded
    // grace window before the process exits.
    daemon.shutdown();
    let drain = async {
        for handle in handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(grace, drain).await.is_err() {
        tracing::warn!(grace_secs = grace.as_secs(), "grace window expired with loops still draining");
    }
    daemon.finalize()?;
    info!("daemon stopped");
    Ok(())
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::error!(error = %e, "cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}
