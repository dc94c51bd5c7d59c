// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harness runtime strategies and the container lifecycle manager.
//!
//! Each harness maps to exactly one runtime: Codex speaks line-delimited
//! JSON-RPC over stdio, OpenCode streams server-sent events from its
//! embedded HTTP server, and everything else runs as a plain subprocess.
//! There is no fallback runtime.
//!
//! The container half talks to the Docker Engine API over its Unix socket
//! and owns sandbox limits, ownership labels, and the
//! SIGTERM → grace → SIGKILL teardown path.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod container;
mod error;
mod mode;
mod prompt;
mod runtime;
mod sse;
mod stdio;
mod subprocess;

pub use error::HarnessError;
pub use mode::{policy_for, resolve_mode, ApprovalPolicy, ModePolicy, Transport, READ_ONLY_DIRECTIVE};
pub use prompt::decorate_prompt;
pub use runtime::{runtime_for, HarnessOutcome, HarnessRuntime, RunRequest};
pub use sse::SseRuntime;
pub use stdio::StdioRuntime;
pub use subprocess::SubprocessRuntime;

#[cfg(any(test, feature = "test-support"))]
pub use runtime::ScriptedRuntime;
