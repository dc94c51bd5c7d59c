// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stdio runtime for the Codex harness family.
//!
//! Opens a long-lived child process, performs a JSON-RPC-style handshake
//! (`initialize` → `initialized`), sends exactly one `prompt` submission,
//! then forwards line-delimited events until the child exits. The terminal
//! envelope is parsed from the trailing stdout lines.

use crate::error::HarnessError;
use crate::mode::ModePolicy;
use crate::runtime::{HarnessOutcome, HarnessRuntime, RunRequest};
use agd_wire::Envelope;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lines retained for terminal envelope parsing.
const TAIL_LINES: usize = 200;
/// Lines the handshake may scan before giving up on a response.
const HANDSHAKE_SCAN_LIMIT: usize = 64;

#[derive(Default)]
pub struct StdioRuntime;

#[async_trait]
impl HarnessRuntime for StdioRuntime {
    fn name(&self) -> &'static str {
        "stdio"
    }

    async fn run(
        &self,
        request: RunRequest,
        chunk_tx: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<HarnessOutcome, HarnessError> {
        let policy = self.select(&request);
        let deadline = Instant::now() + request.timeout;
        let (program, args) = request.argv()?;

        let mut child = Command::new(&program)
            .args(&args)
            .envs(&request.env)
            .current_dir(&request.workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::Handshake("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Handshake("child stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();

        // Collect stderr off to the side for the synthetic envelope path.
        let stderr_task = tokio::spawn(async move {
            let mut collected = String::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if collected.len() < 64 * 1024 {
                        collected.push_str(&line);
                        collected.push('\n');
                    }
                }
            }
            collected
        });

        let mut lines = BufReader::new(stdout).lines();

        // Handshake: initialize → response → initialized.
        let initialize = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "clientInfo": { "name": "agents-dashboard", "version": env!("CARGO_PKG_VERSION") },
                "protocolVersion": 1,
            },
        });
        write_line(&mut stdin, &initialize).await?;
        read_handshake_response(&mut lines, deadline, &cancel, &mut child).await?;
        write_line(&mut stdin, &serde_json::json!({ "jsonrpc": "2.0", "method": "initialized" }))
            .await?;

        // One prompt submission carrying the resolved policy.
        let submission = prompt_submission(&request, &policy);
        write_line(&mut stdin, &submission).await?;
        drop(stdin);

        // Stream events until EOF, the deadline, or cancellation.
        let mut tail: Vec<String> = Vec::new();
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = child.start_kill();
                    return Err(HarnessError::Cancelled);
                }
                () = tokio::time::sleep_until(deadline) => {
                    let _ = child.start_kill();
                    return Err(HarnessError::Timeout);
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            push_tail(&mut tail, line.clone());
                            if chunk_tx.send(line).await.is_err() {
                                debug!(run_id = %request.run_id, "chunk receiver dropped");
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(run_id = %request.run_id, error = %e, "stdout read failed");
                            break;
                        }
                    }
                }
            }
        }

        let status = tokio::select! {
            () = tokio::time::sleep_until(deadline) => {
                let _ = child.start_kill();
                return Err(HarnessError::Timeout);
            }
            status = child.wait() => status?,
        };
        let exit_code = status.code();
        let stderr_text = stderr_task.await.unwrap_or_default();

        let stdout_tail = tail.join("\n");
        let envelope =
            Envelope::parse_or_synthesize(&stdout_tail, &stderr_text, exit_code.unwrap_or(-1));
        Ok(HarnessOutcome { envelope, exit_code })
    }
}

fn prompt_submission(request: &RunRequest, policy: &ModePolicy) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "prompt",
        "params": {
            "prompt": request.prompt,
            "agent": policy.agent,
            "mode": policy.mode.to_string(),
            "approvalPolicy": policy.approval.to_string(),
            "deniedTools": policy.deny_tools,
        },
    })
}

async fn write_line(
    stdin: &mut tokio::process::ChildStdin,
    message: &serde_json::Value,
) -> Result<(), HarnessError> {
    let mut line = serde_json::to_vec(message)
        .map_err(|e| HarnessError::Handshake(format!("encode failed: {e}")))?;
    line.push(b'\n');
    stdin.write_all(&line).await?;
    stdin.flush().await?;
    Ok(())
}

/// Scan stdout for the response to the `initialize` request (id 1).
///
/// Harnesses may interleave notifications before responding; anything that
/// is not the response is skipped. A bounded number of lines keeps a
/// babbling child from wedging the handshake.
async fn read_handshake_response(
    lines: &mut Lines<BufReader<ChildStdout>>,
    deadline: Instant,
    cancel: &CancellationToken,
    child: &mut Child,
) -> Result<(), HarnessError> {
    for _ in 0..HANDSHAKE_SCAN_LIMIT {
        let line = tokio::select! {
            () = cancel.cancelled() => {
                let _ = child.start_kill();
                return Err(HarnessError::Cancelled);
            }
            () = tokio::time::sleep_until(deadline) => {
                let _ = child.start_kill();
                return Err(HarnessError::Timeout);
            }
            line = lines.next_line() => line,
        };
        let Some(line) = line.map_err(|e| HarnessError::Handshake(format!("read failed: {e}")))?
        else {
            return Err(HarnessError::Handshake("child exited during handshake".to_string()));
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
            continue;
        };
        if value.get("id").and_then(|v| v.as_i64()) == Some(1) {
            if let Some(error) = value.get("error") {
                return Err(HarnessError::Handshake(format!("initialize rejected: {error}")));
            }
            return Ok(());
        }
    }
    Err(HarnessError::Handshake("no initialize response".to_string()))
}

fn push_tail(tail: &mut Vec<String>, line: String) {
    if tail.len() == TAIL_LINES {
        tail.remove(0);
    }
    tail.push(line);
}

#[cfg(test)]
#[path = "stdio_tests.rs"]
mod tests;
