// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The runtime capability set and per-harness selection.

use crate::error::HarnessError;
use crate::mode::{policy_for, resolve_mode, ModePolicy, Transport};
use crate::sse::SseRuntime;
use crate::stdio::StdioRuntime;
use crate::subprocess::SubprocessRuntime;
use agd_core::{ExecutionMode, RunId};
use agd_wire::Envelope;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything a runtime needs to drive one harness invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: RunId,
    /// Harness tag ("codex", "opencode", "claude-code", "zai", …).
    pub harness: String,
    /// Decorated prompt.
    pub prompt: String,
    /// Harness invocation: program plus leading arguments.
    pub command: String,
    pub custom_args: Vec<String>,
    /// Requested mode, before policy resolution.
    pub mode: ExecutionMode,
    pub env: HashMap<String, String>,
    pub workspace: PathBuf,
    /// Stage deadline enforced inside the runtime.
    pub timeout: Duration,
    /// `host:port` of the harness's embedded HTTP server (SSE runtimes).
    pub endpoint: Option<String>,
}

impl RunRequest {
    /// Split the command string into program and arguments, appending the
    /// request's custom args.
    pub(crate) fn argv(&self) -> Result<(String, Vec<String>), HarnessError> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| HarnessError::Handshake("empty harness command".to_string()))?
            .to_string();
        let mut args: Vec<String> = parts.map(str::to_string).collect();
        args.extend(self.custom_args.iter().cloned());
        Ok((program, args))
    }
}

/// Terminal result of one harness invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessOutcome {
    pub envelope: Envelope,
    pub exit_code: Option<i32>,
}

/// A per-harness execution strategy.
///
/// `select` resolves the mode policy for a request; `run` drives the
/// harness to completion, streaming raw chunk lines into `chunk_tx`. The
/// chunks are unredacted — the event pipeline owns redaction.
#[async_trait]
pub trait HarnessRuntime: Send + Sync {
    fn name(&self) -> &'static str;

    fn select(&self, request: &RunRequest) -> ModePolicy {
        let mode = resolve_mode(request.mode, &request.harness, &request.env, &request.custom_args);
        policy_for(mode, &request.harness, &request.env)
    }

    async fn run(
        &self,
        request: RunRequest,
        chunk_tx: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<HarnessOutcome, HarnessError>;
}

/// The runtime for a harness tag. Selection is total: every harness maps to
/// exactly one runtime, with the subprocess strategy serving the harnesses
/// that have no dedicated protocol.
pub fn runtime_for(harness: &str) -> Arc<dyn HarnessRuntime> {
    match Transport::for_harness(harness) {
        Transport::Stdio => Arc::new(StdioRuntime::default()),
        Transport::Sse => Arc::new(SseRuntime::default()),
        Transport::Subprocess => Arc::new(SubprocessRuntime::default()),
    }
}

/// Scripted runtime for tests: plays back canned chunk lines, then returns
/// a canned outcome. Honours cancellation between chunks.
#[cfg(any(test, feature = "test-support"))]
pub struct ScriptedRuntime {
    pub chunks: Vec<String>,
    pub outcome: HarnessOutcome,
    /// Delay between chunks, to let tests exercise cancellation.
    pub chunk_delay: Duration,
}

#[cfg(any(test, feature = "test-support"))]
impl ScriptedRuntime {
    pub fn succeeding(chunks: Vec<String>, summary: &str) -> Self {
        let stdout = format!("{{\"status\":\"succeeded\",\"summary\":{}}}", serde_json::json!(summary));
        Self {
            chunks,
            outcome: HarnessOutcome {
                envelope: Envelope::parse_or_synthesize(&stdout, "", 0),
                exit_code: Some(0),
            },
            chunk_delay: Duration::ZERO,
        }
    }

    pub fn failing(error: &str, exit_code: i32) -> Self {
        Self {
            chunks: Vec::new(),
            outcome: HarnessOutcome {
                envelope: Envelope::synthesize("", error, exit_code),
                exit_code: Some(exit_code),
            },
            chunk_delay: Duration::ZERO,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl HarnessRuntime for ScriptedRuntime {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(
        &self,
        _request: RunRequest,
        chunk_tx: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<HarnessOutcome, HarnessError> {
        for chunk in &self.chunks {
            if cancel.is_cancelled() {
                return Err(HarnessError::Cancelled);
            }
            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            let _ = chunk_tx.send(chunk.clone()).await;
        }
        if cancel.is_cancelled() {
            return Err(HarnessError::Cancelled);
        }
        Ok(self.outcome.clone())
    }
}
