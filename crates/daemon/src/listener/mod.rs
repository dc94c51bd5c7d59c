// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-socket IPC listener for the CLI and worker heartbeats.
//!
//! Wire format: 4-byte length prefix + JSON (`agd-wire` framing). Each
//! connection handles requests sequentially; `subscribe_events` switches
//! the connection into a one-way event stream.

mod handlers;

use crate::lifecycle::{Daemon, DaemonError};
use agd_core::SystemClock;
use agd_engine::workflow::WorkflowExecutor;
use agd_engine::{Dispatcher, EventPipeline};
use agd_storage::Store;
use agd_wire::{read_message, write_message, FramingError, Request, Response};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared handles the listener needs from the daemon.
#[derive(Clone)]
pub(crate) struct Ctx {
    pub store: Arc<Store>,
    pub dispatcher: Arc<Dispatcher<SystemClock>>,
    pub pipeline: Arc<EventPipeline<SystemClock>>,
    pub workflows: Arc<WorkflowExecutor<SystemClock>>,
    pub containers: Option<Arc<dyn agd_harness::container::ContainerManager>>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
    pub heartbeat_timeout_ms: u64,
}

/// Bind the socket and spawn the accept loop.
pub fn spawn(daemon: &Daemon) -> Result<JoinHandle<()>, DaemonError> {
    let socket_path = daemon.config.socket_path();
    // A previous unclean exit leaves a stale socket file behind; the lock
    // file already guarantees we are the only daemon.
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)?;
    info!(socket = %socket_path.display(), "IPC listener ready");

    let ctx = Ctx {
        store: daemon.store.clone(),
        dispatcher: daemon.dispatcher.clone(),
        pipeline: daemon.pipeline.clone(),
        workflows: daemon.workflows.clone(),
        containers: daemon.containers.clone(),
        shutdown: daemon.shutdown_token(),
        started_at: daemon.started_at,
        heartbeat_timeout_ms: agd_core::DEFAULT_HEARTBEAT_TIMEOUT_MS,
    };

    Ok(tokio::spawn(accept_loop(listener, ctx)))
}

async fn accept_loop(listener: UnixListener, ctx: Ctx) {
    loop {
        let stream = tokio::select! {
            () = ctx.shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            },
        };
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, ctx).await {
                match e {
                    FramingError::Closed => {}
                    other => debug!(error = %other, "connection ended"),
                }
            }
        });
    }
}

async fn serve_connection(mut stream: UnixStream, ctx: Ctx) -> Result<(), FramingError> {
    loop {
        let request: Request = tokio::select! {
            () = ctx.shutdown.cancelled() => return Ok(()),
            request = read_message(&mut stream) => request?,
        };

        match request {
            Request::SubscribeEvents { run_id } => {
                // One-way stream from here on.
                return handlers::stream_events(&mut stream, &ctx, run_id).await;
            }
            Request::Shutdown => {
                write_message(&mut stream, &Response::Ok).await?;
                ctx.shutdown.cancel();
                return Ok(());
            }
            other => {
                let response = handlers::handle(&ctx, other).await;
                write_message(&mut stream, &response).await?;
            }
        }
    }
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
