// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess runtime for harnesses without a dedicated protocol
//! (Claude-Code, Zai, and anything unrecognised).
//!
//! The harness runs as a plain child process with the prompt passed as the
//! final argument. Stdout lines become chunks; the envelope is parsed from
//! the trailing output or synthesised from the exit code.

use crate::error::HarnessError;
use crate::runtime::{HarnessOutcome, HarnessRuntime, RunRequest};
use agd_wire::Envelope;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const TAIL_LINES: usize = 200;

#[derive(Default)]
pub struct SubprocessRuntime;

#[async_trait]
impl HarnessRuntime for SubprocessRuntime {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    async fn run(
        &self,
        request: RunRequest,
        chunk_tx: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<HarnessOutcome, HarnessError> {
        let policy = self.select(&request);
        let deadline = Instant::now() + request.timeout;
        let (program, mut args) = request.argv()?;
        args.push(crate::prompt::decorate_prompt(&policy, &request.prompt, None));

        let mut child = Command::new(&program)
            .args(&args)
            .envs(&request.env)
            .current_dir(&request.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Handshake("child stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();
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
                            if tail.len() == TAIL_LINES {
                                tail.remove(0);
                            }
                            tail.push(line.clone());
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

        let envelope = Envelope::parse_or_synthesize(
            &tail.join("\n"),
            &stderr_text,
            exit_code.unwrap_or(-1),
        );
        Ok(HarnessOutcome { envelope, exit_code })
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
