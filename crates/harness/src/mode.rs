// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution-mode policy resolution.
//!
//! The resolver turns a requested mode, the harness name, the run
//! environment, and the explicit command-line mode flag into a
//! [`ModePolicy`]: agent persona, prompt directive, tool deny rules,
//! approval policy, and the fixed transport for the harness.

use agd_core::ExecutionMode;
use std::collections::HashMap;

/// Directive prepended to the system prompt in read-only modes.
pub const READ_ONLY_DIRECTIVE: &str =
    "Do not modify files. You are running in a read-only mode: inspect, reason, and report, but never edit the workspace or execute mutating commands.";

/// How the harness process is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Stdio,
    Sse,
    Subprocess,
}

agd_core::simple_display! {
    Transport {
        Stdio => "stdio",
        Sse => "sse",
        Subprocess => "subprocess",
    }
}

impl Transport {
    /// Per-harness transport invariant: Codex is always stdio and OpenCode
    /// always SSE, regardless of any requested transport.
    pub fn for_harness(harness: &str) -> Self {
        let lowered = harness.to_ascii_lowercase();
        if lowered.starts_with("codex") {
            Transport::Stdio
        } else if lowered.starts_with("opencode") {
            Transport::Sse
        } else {
            Transport::Subprocess
        }
    }
}

/// When the harness pauses for human approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalPolicy {
    Never,
    OnFailure,
}

agd_core::simple_display! {
    ApprovalPolicy {
        Never => "never",
        OnFailure => "on-failure",
    }
}

/// Resolved permission policy for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModePolicy {
    pub mode: ExecutionMode,
    /// Agent persona handed to the harness.
    pub agent: String,
    /// Prepended to the system prompt in read-only modes.
    pub system_prompt_prefix: Option<String>,
    /// Tools the permission layer denies outright.
    pub deny_tools: Vec<String>,
    pub approval: ApprovalPolicy,
    pub transport: Transport,
}

impl ModePolicy {
    pub fn denies(&self, tool: &str) -> bool {
        self.deny_tools.iter().any(|t| t == tool)
    }
}

/// Env vars consulted for a mode override, highest precedence first. The
/// harness-specific slot is filled per call.
const ENV_PRECEDENCE_HEAD: &str = "HARNESS_RUNTIME_MODE";
const ENV_PRECEDENCE_TAIL: [&str; 3] = ["HARNESS_MODE", "RUN_MODE", "TASK_MODE"];

/// Resolve the effective execution mode.
///
/// Precedence, highest first: an explicit whitelisted `--mode` flag on the
/// command line, then the env chain (`HARNESS_RUNTIME_MODE`, the
/// harness-specific variable such as `CODEX_MODE`, `HARNESS_MODE`,
/// `RUN_MODE`, `TASK_MODE`), then the requested mode from the task or its
/// override. Free-form words in the prompt never change the mode.
pub fn resolve_mode(
    requested: ExecutionMode,
    harness: &str,
    env: &HashMap<String, String>,
    custom_args: &[String],
) -> ExecutionMode {
    if let Some(mode) = mode_from_args(custom_args) {
        return mode;
    }

    let harness_var = format!("{}_MODE", harness.to_ascii_uppercase().replace('-', "_"));
    let chain = std::iter::once(ENV_PRECEDENCE_HEAD)
        .chain(std::iter::once(harness_var.as_str()))
        .chain(ENV_PRECEDENCE_TAIL);
    for name in chain {
        if let Some(mode) = env.get(name).and_then(|v| ExecutionMode::parse_alias(v)) {
            return mode;
        }
    }

    requested
}

/// Whitelisted explicit mode flags: `--mode readonly|plan|review`, in both
/// split and `--mode=x` spellings. Any other `--mode` value is ignored so a
/// typo cannot silently flip a run read-only (or worse, writable).
fn mode_from_args(args: &[String]) -> Option<ExecutionMode> {
    const WHITELIST: [(&str, ExecutionMode); 3] = [
        ("readonly", ExecutionMode::Review),
        ("plan", ExecutionMode::Plan),
        ("review", ExecutionMode::Review),
    ];
    let lookup = |value: &str| {
        let lowered = value.to_ascii_lowercase();
        WHITELIST.iter().find(|(alias, _)| *alias == lowered).map(|(_, m)| *m)
    };

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "--mode" {
            if let Some(value) = iter.peek() {
                if let Some(mode) = lookup(value) {
                    return Some(mode);
                }
            }
        } else if let Some(value) = arg.strip_prefix("--mode=") {
            if let Some(mode) = lookup(value) {
                return Some(mode);
            }
        }
    }
    None
}

/// Build the full policy for a resolved mode.
///
/// - Plan: agent `plan`, read-only directive, deny `edit` + `bash`, never
///   ask for approval (there is nothing to approve).
/// - Review: agent `reviewer` (overridable via `REVIEW_AGENT`), same
///   read-only stance.
/// - Default: agent `build`, no deny rules, approval `on-failure` unless
///   the environment explicitly sets `HARNESS_APPROVAL=never`.
pub fn policy_for(
    mode: ExecutionMode,
    harness: &str,
    env: &HashMap<String, String>,
) -> ModePolicy {
    let transport = Transport::for_harness(harness);
    match mode {
        ExecutionMode::Plan => ModePolicy {
            mode,
            agent: "plan".to_string(),
            system_prompt_prefix: Some(READ_ONLY_DIRECTIVE.to_string()),
            deny_tools: vec!["edit".to_string(), "bash".to_string()],
            approval: ApprovalPolicy::Never,
            transport,
        },
        ExecutionMode::Review => ModePolicy {
            mode,
            agent: env.get("REVIEW_AGENT").cloned().unwrap_or_else(|| "reviewer".to_string()),
            system_prompt_prefix: Some(READ_ONLY_DIRECTIVE.to_string()),
            deny_tools: vec!["edit".to_string(), "bash".to_string()],
            approval: ApprovalPolicy::Never,
            transport,
        },
        ExecutionMode::Default => {
            let approval = match env.get("HARNESS_APPROVAL").map(String::as_str) {
                Some("never") => ApprovalPolicy::Never,
                _ => ApprovalPolicy::OnFailure,
            };
            ModePolicy {
                mode,
                agent: "build".to_string(),
                system_prompt_prefix: None,
                deny_tools: Vec::new(),
                approval,
                transport,
            }
        }
    }
}

#[cfg(test)]
#[path = "mode_tests.rs"]
mod tests;
