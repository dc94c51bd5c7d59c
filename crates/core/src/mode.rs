// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution modes for harness runs.

use serde::{Deserialize, Serialize};

/// How much a run is allowed to do.
///
/// `Default` may mutate the workspace; `Plan` and `Review` are read-only and
/// differ only in the agent persona and the shape of the expected output
/// (a plan vs. a critique).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Default,
    Plan,
    Review,
}

crate::simple_display! {
    ExecutionMode {
        Default => "default",
        Plan => "plan",
        Review => "review",
    }
}

impl ExecutionMode {
    /// Parse a mode alias, case-insensitively.
    ///
    /// Recognised spellings: `default|normal|run`, `plan|planning|preview`,
    /// `review|readonly|audit`. Anything else is `None` — callers fall back
    /// to the task default rather than guessing.
    pub fn parse_alias(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "normal" | "run" => Some(ExecutionMode::Default),
            "plan" | "planning" | "preview" => Some(ExecutionMode::Plan),
            "review" | "readonly" | "audit" => Some(ExecutionMode::Review),
            _ => None,
        }
    }

    /// Read-only modes forbid workspace mutation.
    pub fn is_read_only(&self) -> bool {
        matches!(self, ExecutionMode::Plan | ExecutionMode::Review)
    }
}

#[cfg(test)]
#[path = "mode_tests.rs"]
mod tests;
