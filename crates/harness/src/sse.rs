// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSE runtime for the OpenCode harness.
//!
//! OpenCode runs an embedded HTTP server inside its container; the runtime
//! opens a `text/event-stream` connection to it and forwards each `data:`
//! payload as a chunk. The stream terminates on a `run.completed` event.
//!
//! The request goes out as HTTP/1.0 so the server answers with a plain
//! close-delimited body instead of chunked transfer framing.

use crate::error::HarnessError;
use crate::runtime::{HarnessOutcome, HarnessRuntime, RunRequest};
use agd_wire::{Envelope, WireEvent};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Event-stream path on the harness's embedded server.
const EVENT_PATH: &str = "/event";

/// Event types that end the stream.
const TERMINAL_TYPES: [&str; 3] = ["run.completed", "run_completed", "completion"];

#[derive(Default)]
pub struct SseRuntime;

#[async_trait]
impl HarnessRuntime for SseRuntime {
    fn name(&self) -> &'static str {
        "sse"
    }

    async fn run(
        &self,
        request: RunRequest,
        chunk_tx: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<HarnessOutcome, HarnessError> {
        let deadline = Instant::now() + request.timeout;
        let endpoint = request
            .endpoint
            .clone()
            .ok_or_else(|| HarnessError::Handshake("SSE runtime requires an endpoint".to_string()))?;

        let mut stream = tokio::select! {
            () = tokio::time::sleep_until(deadline) => return Err(HarnessError::Timeout),
            conn = TcpStream::connect(&endpoint) => {
                conn.map_err(|e| HarnessError::Stream(format!("connect {endpoint} failed: {e}")))?
            }
        };

        let http_request = format!(
            "GET {EVENT_PATH} HTTP/1.0\r\nHost: {endpoint}\r\nAccept: text/event-stream\r\n\r\n"
        );
        stream
            .write_all(http_request.as_bytes())
            .await
            .map_err(|e| HarnessError::Stream(format!("request write failed: {e}")))?;

        let mut lines = BufReader::new(stream).lines();

        // Status line + headers.
        let status_line = next_line(&mut lines, deadline, &cancel).await?.unwrap_or_default();
        if !status_line.contains(" 200") {
            return Err(HarnessError::Stream(format!("SSE endpoint returned {status_line:?}")));
        }
        while let Some(header) = next_line(&mut lines, deadline, &cancel).await? {
            if header.is_empty() {
                break;
            }
        }

        // Event frames: data lines accumulate until a blank separator.
        let mut envelope: Option<Envelope> = None;
        let mut completed = false;
        let mut data = String::new();
        while let Some(line) = next_line(&mut lines, deadline, &cancel).await? {
            if let Some(payload) = line.strip_prefix("data:") {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(payload.trim_start());
                continue;
            }
            if !line.is_empty() {
                // `event:`/`id:` fields are carried inside the data payload
                // by OpenCode; anything else is ignored.
                continue;
            }
            if data.is_empty() {
                continue;
            }
            let payload = std::mem::take(&mut data);
            if chunk_tx.send(payload.clone()).await.is_err() {
                debug!(run_id = %request.run_id, "chunk receiver dropped");
            }
            if let Some(found) = Envelope::parse(&payload) {
                envelope = Some(found);
            }
            if is_terminal(&payload) {
                completed = true;
                break;
            }
        }

        if !completed && envelope.is_none() {
            return Err(HarnessError::Stream(
                "SSE stream ended before run.completed".to_string(),
            ));
        }

        let envelope = envelope.unwrap_or_else(|| Envelope::synthesize("run completed", "", 0));
        let exit_code = Some(i32::from(!envelope.is_success()));
        Ok(HarnessOutcome { envelope, exit_code })
    }
}

fn is_terminal(payload: &str) -> bool {
    if let Some(event) = WireEvent::parse(payload) {
        return TERMINAL_TYPES.contains(&event.event_type.as_str());
    }
    // Some streams wrap the event type in a bare JSON object.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) {
        if let Some(kind) = value.get("type").and_then(|v| v.as_str()) {
            return TERMINAL_TYPES.contains(&kind);
        }
    }
    false
}

async fn next_line<R>(
    lines: &mut tokio::io::Lines<R>,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<Option<String>, HarnessError>
where
    R: AsyncBufReadExt + Unpin,
{
    tokio::select! {
        () = cancel.cancelled() => Err(HarnessError::Cancelled),
        () = tokio::time::sleep_until(deadline) => Err(HarnessError::Timeout),
        line = lines.next_line() => {
            line.map_err(|e| HarnessError::Stream(format!("stream read failed: {e}")))
        }
    }
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
